//! Where the native allocator entry points come from.
//!
//! # Environment Variables
//!
//! - `INTEROP_RS_LIBRARY`: Name or path of the native runtime library (required by [`AllocatorConfig::from_env`])
//! - `INTEROP_RS_SEARCH_ROOT`: Directory searched for the library (default: current directory)
//! - `INTEROP_RS_ALLOC_SYMBOL`: Allocation entry point (default: `InteropAlloc`)
//! - `INTEROP_RS_FREE_SYMBOL`: Release entry point (default: `InteropFree`)

use std::{env, path::PathBuf};

pub const DEFAULT_ALLOC_SYMBOL: &str = "InteropAlloc";
pub const DEFAULT_FREE_SYMBOL: &str = "InteropFree";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocatorConfig {
    pub library: String,
    pub search_root: PathBuf,
    pub alloc_symbol: String,
    pub free_symbol: String,
}

impl AllocatorConfig {
    pub fn new(library: impl Into<String>) -> Self {
        Self {
            library: library.into(),
            search_root: PathBuf::from("."),
            alloc_symbol: DEFAULT_ALLOC_SYMBOL.to_string(),
            free_symbol: DEFAULT_FREE_SYMBOL.to_string(),
        }
    }

    /// `None` when `INTEROP_RS_LIBRARY` is unset.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let mut config = Self::new(lookup("INTEROP_RS_LIBRARY")?);
        if let Some(root) = lookup("INTEROP_RS_SEARCH_ROOT") {
            config.search_root = PathBuf::from(root);
        }
        if let Some(symbol) = lookup("INTEROP_RS_ALLOC_SYMBOL") {
            config.alloc_symbol = symbol;
        }
        if let Some(symbol) = lookup("INTEROP_RS_FREE_SYMBOL") {
            config.free_symbol = symbol;
        }
        Some(config)
    }

    pub fn with_search_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_root = root.into();
        self
    }

    pub fn with_symbols(mut self, alloc: impl Into<String>, free: impl Into<String>) -> Self {
        self.alloc_symbol = alloc.into();
        self.free_symbol = free.into();
        self
    }
}
