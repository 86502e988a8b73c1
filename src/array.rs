use crate::{
    buffer::{NativeAllocator, NativeBuffer},
    error::MarshalError,
};
use std::{
    marker::PhantomData,
    mem::{size_of, size_of_val},
    ptr, slice,
};
use tracing::{trace, warn};

/// Element types that may cross the boundary as a raw byte copy.
///
/// # Safety
/// Implementors must be plain value layouts: no padding bytes, no references or
/// owned heap data, every bit pattern a valid value, and a non-zero size.
pub unsafe trait Blittable: Copy + 'static {}

/// Marks plain value types as [`Blittable`]. The caller takes on the trait's
/// safety contract for every listed type.
#[macro_export]
macro_rules! unsafe_blittable {
    ($($t:ty),* $(,)?) => {
        $(unsafe impl $crate::array::Blittable for $t {})*
    };
}

unsafe_blittable!(u8, i8, u16, i16, u32, i32, u64, i64, usize, isize, f32, f64);
unsafe impl<T: Blittable, const N: usize> Blittable for [T; N] {}

/// Element count for a buffer of `length` bytes, or a contract violation if the
/// length does not divide evenly.
pub(crate) fn element_count(length: u32, element_size: usize) -> Result<usize, MarshalError> {
    let length_bytes = length as usize;
    if length_bytes % element_size != 0 {
        warn!(length, element_size, "array buffer length is not a whole number of elements");
        return Err(MarshalError::MisalignedLength {
            length,
            element_size,
        });
    }
    Ok(length_bytes / element_size)
}

pub(crate) fn encode_bytes<A: NativeAllocator + ?Sized>(allocator: &A, bytes: &[u8]) -> NativeBuffer {
    let mut buffer = allocator.allocate(bytes.len());
    buffer.payload_mut().copy_from_slice(bytes);
    buffer
}

/// Bulk copy of fixed-size value arrays.
pub struct PodArrayMarshaler<T>(PhantomData<fn() -> T>);

impl<T: Blittable> PodArrayMarshaler<T> {
    const ELEMENT_SIZE: usize = {
        assert!(size_of::<T>() != 0, "zero-sized elements cannot cross the boundary");
        size_of::<T>()
    };

    pub const fn new() -> Self {
        Self(PhantomData)
    }

    /// Copies `values` verbatim into a fresh buffer. The receiver owns the result.
    pub fn encode<A: NativeAllocator + ?Sized>(&self, allocator: &A, values: &[T]) -> NativeBuffer {
        // SAFETY: Blittable rules out padding, so every byte of the slice is initialized
        let bytes =
            unsafe { slice::from_raw_parts(values.as_ptr().cast::<u8>(), size_of_val(values)) };
        trace!(elements = values.len(), element_size = Self::ELEMENT_SIZE, "encoding value array");
        encode_bytes(allocator, bytes)
    }

    /// Copies the buffer into a new managed array. The buffer is not released.
    pub fn decode(&self, buffer: &NativeBuffer) -> Result<Vec<T>, MarshalError> {
        let count = element_count(buffer.length(), Self::ELEMENT_SIZE)?;
        let mut values = Vec::<T>::with_capacity(count);
        // SAFETY: the destination has room for `count` elements, which is exactly
        // the payload length, and Blittable accepts any bit pattern
        unsafe {
            ptr::copy_nonoverlapping(
                buffer.as_ptr(),
                values.as_mut_ptr().cast::<u8>(),
                count * Self::ELEMENT_SIZE,
            );
            values.set_len(count);
        }
        trace!(elements = count, "decoded value array");
        Ok(values)
    }
}

impl<T: Blittable> Default for PodArrayMarshaler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for PodArrayMarshaler<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for PodArrayMarshaler<T> {}

/// Element kinds of a dynamically typed value array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scalar {
    Int8,
    Int16,
    Int32,
    Int64,
    NativeInt,
    Float32,
    Float64,
}

impl Scalar {
    pub const fn size(self) -> usize {
        match self {
            Scalar::Int8 => 1,
            Scalar::Int16 => 2,
            Scalar::Int32 | Scalar::Float32 => 4,
            Scalar::Int64 | Scalar::Float64 => 8,
            Scalar::NativeInt => size_of::<usize>(),
        }
    }

    pub fn type_tag(self) -> &'static str {
        match self {
            Scalar::Int8 => "i8",
            Scalar::Int16 => "i16",
            Scalar::Int32 => "i32",
            Scalar::Int64 => "i64",
            Scalar::NativeInt => "ptr",
            Scalar::Float32 => "f32",
            Scalar::Float64 => "f64",
        }
    }
}

/// Blittable types with a matching [`Scalar`] kind.
pub trait ScalarElement: Blittable {
    const SCALAR: Scalar;
}

macro_rules! scalar_element {
    ($($t:ty => $s:ident),* $(,)?) => {
        $(impl ScalarElement for $t {
            const SCALAR: Scalar = Scalar::$s;
        })*
    };
}

scalar_element! {
    i8 => Int8, u8 => Int8,
    i16 => Int16, u16 => Int16,
    i32 => Int32, u32 => Int32,
    i64 => Int64, u64 => Int64,
    isize => NativeInt, usize => NativeInt,
    f32 => Float32,
    f64 => Float64,
}

/// A managed value array whose element type is only known at run time.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueArray {
    element: Scalar,
    data: Vec<u8>,
}

impl ValueArray {
    pub fn from_slice<T: ScalarElement>(values: &[T]) -> Self {
        // SAFETY: see PodArrayMarshaler::encode
        let bytes =
            unsafe { slice::from_raw_parts(values.as_ptr().cast::<u8>(), size_of_val(values)) };
        Self {
            element: T::SCALAR,
            data: bytes.to_vec(),
        }
    }

    pub(crate) fn from_buffer(element: Scalar, buffer: &NativeBuffer) -> Result<Self, MarshalError> {
        element_count(buffer.length(), element.size())?;
        Ok(Self {
            element,
            data: buffer.payload().to_vec(),
        })
    }

    /// `None` if `T` is not of this array's element kind.
    pub fn to_vec<T: ScalarElement>(&self) -> Option<Vec<T>> {
        if T::SCALAR != self.element || size_of::<T>() != self.element.size() {
            return None;
        }
        let count = self.len();
        let mut values = Vec::<T>::with_capacity(count);
        // SAFETY: data holds exactly `count` elements of T's size
        unsafe {
            ptr::copy_nonoverlapping(self.data.as_ptr(), values.as_mut_ptr().cast::<u8>(), self.data.len());
            values.set_len(count);
        }
        Some(values)
    }

    pub fn element(&self) -> Scalar {
        self.element
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.element.size()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}
