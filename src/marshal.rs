//! Per-parameter custom marshalers over dynamically typed managed values.
//!
//! Each boundary-crossing parameter carries a [`MarshalAs`] annotation that picks
//! one [`Marshaler`]. A value of the wrong kind is answered with a null buffer so
//! the call site can escalate.

use crate::{
    array::{encode_bytes, Scalar, ValueArray},
    buffer::{NativeAllocator, NativeBuffer},
    error::MarshalError,
    object::{NativeIdentity, ObjArrayMarshaler, ObjectRef},
    registry::ManagedInstances,
    string::{CLRString, StringUtf8, StringUtf8Copy},
    types::TypeDescription,
    GCHandle,
};
use enum_dispatch::enum_dispatch;
use tracing::warn;

#[derive(Clone, Debug, PartialEq)]
pub enum ManagedValue<'gc> {
    Null,
    Int32(i32),
    Int64(i64),
    NativeFloat(f64),
    String(CLRString),
    ValueArray(ValueArray),
    ObjectArray(Vec<ObjectRef<'gc>>),
}

impl ManagedValue<'_> {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ManagedValue::Null => "null",
            ManagedValue::Int32(_) => "int32",
            ManagedValue::Int64(_) => "int64",
            ManagedValue::NativeFloat(_) => "native float",
            ManagedValue::String(_) => "string",
            ManagedValue::ValueArray(_) => "value array",
            ManagedValue::ObjectArray(_) => "object array",
        }
    }
}

/// Everything one crossing on one thread needs.
pub struct MarshalEnv<'a, 'gc> {
    pub gc: GCHandle<'gc>,
    pub allocator: &'a dyn NativeAllocator,
    pub instances: &'a dyn ManagedInstances<'gc>,
}

/// Calling-convention annotation of a boundary parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarshalAs {
    Utf8String,
    Utf8StringCopy,
    PodArray(Scalar),
    ObjArray(TypeDescription),
}

#[enum_dispatch]
pub trait CustomMarshaler {
    /// Size of the native representation, or `None` when it varies per value.
    fn native_data_size(&self) -> Option<usize>;

    fn marshal_managed_to_native<'gc>(
        &self,
        env: &MarshalEnv<'_, 'gc>,
        value: &ManagedValue<'gc>,
    ) -> Option<NativeBuffer>;

    fn marshal_native_to_managed<'gc>(
        &self,
        env: &MarshalEnv<'_, 'gc>,
        buffer: Option<NativeBuffer>,
    ) -> Result<ManagedValue<'gc>, MarshalError>;

    /// Releases native data produced for an in-parameter once the call returned.
    fn clean_up_native_data<'gc>(&self, env: &MarshalEnv<'_, 'gc>, buffer: NativeBuffer) {
        env.allocator.release(buffer);
    }
}

/// Dynamically typed counterpart of [`crate::array::PodArrayMarshaler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueArrayMarshaler {
    element: Scalar,
}

impl ValueArrayMarshaler {
    pub fn new(element: Scalar) -> Self {
        Self { element }
    }
}

/// Not `Send`: holds the thread-bound release-after-read decoder.
#[enum_dispatch(CustomMarshaler)]
#[derive(Debug)]
pub enum Marshaler {
    StringUtf8,
    StringUtf8Copy,
    ValueArrayMarshaler,
    ObjArrayMarshaler,
}

impl Marshaler {
    pub fn for_parameter(marshal_as: MarshalAs) -> Self {
        match marshal_as {
            MarshalAs::Utf8String => StringUtf8.into(),
            MarshalAs::Utf8StringCopy => StringUtf8Copy::new().into(),
            MarshalAs::PodArray(element) => ValueArrayMarshaler::new(element).into(),
            MarshalAs::ObjArray(class) => ObjArrayMarshaler::new(class).into(),
        }
    }
}

fn wrong_kind(expected: &'static str, value: &ManagedValue<'_>) -> Option<NativeBuffer> {
    if !matches!(value, ManagedValue::Null) {
        warn!(expected, found = value.kind_name(), "value kind does not fit the marshaler");
    }
    None
}

impl CustomMarshaler for StringUtf8 {
    fn native_data_size(&self) -> Option<usize> {
        Some(NativeIdentity::SIZE)
    }

    fn marshal_managed_to_native<'gc>(
        &self,
        env: &MarshalEnv<'_, 'gc>,
        value: &ManagedValue<'gc>,
    ) -> Option<NativeBuffer> {
        match value {
            ManagedValue::String(s) => Some(self.encode(env.allocator, s)),
            ManagedValue::Null => None,
            other => {
                let error = MarshalError::NonText {
                    found: other.kind_name(),
                };
                warn!(%error, "returning a null buffer");
                None
            }
        }
    }

    fn marshal_native_to_managed<'gc>(
        &self,
        _env: &MarshalEnv<'_, 'gc>,
        buffer: Option<NativeBuffer>,
    ) -> Result<ManagedValue<'gc>, MarshalError> {
        match buffer {
            None => Ok(ManagedValue::Null),
            Some(b) => self.decode(&b).map(ManagedValue::String),
        }
    }
}

impl CustomMarshaler for StringUtf8Copy {
    fn native_data_size(&self) -> Option<usize> {
        Some(NativeIdentity::SIZE)
    }

    fn marshal_managed_to_native<'gc>(
        &self,
        env: &MarshalEnv<'_, 'gc>,
        value: &ManagedValue<'gc>,
    ) -> Option<NativeBuffer> {
        StringUtf8.marshal_managed_to_native(env, value)
    }

    fn marshal_native_to_managed<'gc>(
        &self,
        env: &MarshalEnv<'_, 'gc>,
        buffer: Option<NativeBuffer>,
    ) -> Result<ManagedValue<'gc>, MarshalError> {
        match buffer {
            None => Ok(ManagedValue::Null),
            Some(b) => self.decode(env.allocator, b).map(ManagedValue::String),
        }
    }
}

impl CustomMarshaler for ValueArrayMarshaler {
    fn native_data_size(&self) -> Option<usize> {
        None
    }

    fn marshal_managed_to_native<'gc>(
        &self,
        env: &MarshalEnv<'_, 'gc>,
        value: &ManagedValue<'gc>,
    ) -> Option<NativeBuffer> {
        match value {
            ManagedValue::ValueArray(a) if a.element() == self.element => {
                Some(encode_bytes(env.allocator, a.as_bytes()))
            }
            other => wrong_kind(self.element.type_tag(), other),
        }
    }

    fn marshal_native_to_managed<'gc>(
        &self,
        _env: &MarshalEnv<'_, 'gc>,
        buffer: Option<NativeBuffer>,
    ) -> Result<ManagedValue<'gc>, MarshalError> {
        match buffer {
            None => Ok(ManagedValue::Null),
            Some(b) => ValueArray::from_buffer(self.element, &b).map(ManagedValue::ValueArray),
        }
    }
}

impl CustomMarshaler for ObjArrayMarshaler {
    fn native_data_size(&self) -> Option<usize> {
        None
    }

    fn marshal_managed_to_native<'gc>(
        &self,
        env: &MarshalEnv<'_, 'gc>,
        value: &ManagedValue<'gc>,
    ) -> Option<NativeBuffer> {
        match value {
            ManagedValue::ObjectArray(values) => Some(self.encode(env.allocator, values)),
            other => wrong_kind("object array", other),
        }
    }

    fn marshal_native_to_managed<'gc>(
        &self,
        env: &MarshalEnv<'_, 'gc>,
        buffer: Option<NativeBuffer>,
    ) -> Result<ManagedValue<'gc>, MarshalError> {
        match buffer {
            None => Ok(ManagedValue::Null),
            Some(b) => self
                .decode(env.gc, env.instances, &b)
                .map(ManagedValue::ObjectArray),
        }
    }
}
