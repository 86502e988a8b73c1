use crate::object::NativeIdentity;
use thiserror::Error;

/// Boundary-contract violations reported to the immediate caller of a crossing.
///
/// Allocation failure is deliberately absent: it aborts instead of returning.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MarshalError {
    #[error("expected a text value, received {found}")]
    NonText { found: &'static str },

    #[error("buffer length {length} is not a multiple of the element size {element_size}")]
    MisalignedLength { length: u32, element_size: usize },

    #[error("string buffer has no room for its zero terminator")]
    MissingTerminator,

    #[error("string buffer is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("no managed instance capability registered for {type_name}")]
    MissingCapability { type_name: String },

    #[error("native instance {identity:?} is wrapped as {found}, which is not a {expected}")]
    ClassMismatch {
        identity: NativeIdentity,
        expected: String,
        found: String,
    },

    #[error("registry could not produce a wrapper for native instance {identity:?}")]
    UnresolvedInstance { identity: NativeIdentity },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NativeLibraryError {
    #[error("Unable to find library '{0}'")]
    LibraryNotFound(String),

    #[error("Unable to find entry point '{1}' in library '{0}'")]
    SymbolNotFound(String, String),

    #[error("Failed to load library '{0}': {1}")]
    LoadError(String, String),
}
