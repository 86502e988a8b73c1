use crate::{
    buffer::{NativeAllocator, NativeBuffer},
    error::MarshalError,
};
use gc_arena::{unsafe_empty_collect, Collect};
use std::{
    fmt::{Debug, Formatter},
    marker::PhantomData,
    ops::Deref,
};
use tracing::{trace, warn};

/// Managed text: UTF-16 code units, as the managed runtime stores strings.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct CLRString(Vec<u16>);
unsafe_empty_collect!(CLRString);

impl CLRString {
    pub fn new(chars: Vec<u16>) -> Self {
        Self(chars)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unpaired surrogates become U+FFFD, matching the managed UTF-8 encoder.
    pub fn as_string(&self) -> String {
        char::decode_utf16(self.0.iter().copied())
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }
}

impl Deref for CLRString {
    type Target = [u16];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Debug for CLRString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_string())
    }
}

impl<T: AsRef<str>> From<T> for CLRString {
    fn from(s: T) -> Self {
        Self::new(s.as_ref().encode_utf16().collect())
    }
}

/// Which side releases a text buffer after it crosses the boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnershipMode {
    /// Native code keeps the buffer; managed code copies the text out and never frees it.
    NativeOwned,
    /// Native code returned the buffer by value; managed code frees it after one read.
    ManagedReleasesAfterRead,
}

/// Shared read step of both text variants: the payload minus its zero terminator.
fn read_utf8(buffer: &NativeBuffer) -> Result<&str, MarshalError> {
    let Some((_terminator, text)) = buffer.payload().split_last() else {
        warn!("string buffer with a zero length header");
        return Err(MarshalError::MissingTerminator);
    };
    std::str::from_utf8(text).map_err(|e| {
        warn!(length = buffer.length(), "string buffer is not valid UTF-8");
        MarshalError::from(e)
    })
}

/// UTF-8 text whose native buffer stays owned by native code.
#[derive(Clone, Copy, Debug, Default)]
pub struct StringUtf8;

impl StringUtf8 {
    pub const OWNERSHIP: OwnershipMode = OwnershipMode::NativeOwned;

    /// Encodes managed text into a fresh zero-terminated buffer. The receiver owns
    /// the result.
    pub fn encode<A: NativeAllocator + ?Sized>(&self, allocator: &A, value: &CLRString) -> NativeBuffer {
        self.encode_str(allocator, &value.as_string())
    }

    pub fn encode_str<A: NativeAllocator + ?Sized>(&self, allocator: &A, value: &str) -> NativeBuffer {
        let bytes = value.as_bytes();
        let mut buffer = allocator.allocate(bytes.len() + 1);
        let (text, terminator) = buffer.payload_mut().split_at_mut(bytes.len());
        text.copy_from_slice(bytes);
        terminator[0] = 0;
        trace!(bytes = bytes.len(), "encoded utf-8 string");
        buffer
    }

    /// Copies the text out of a native-owned buffer. The buffer is not released.
    pub fn decode(&self, buffer: &NativeBuffer) -> Result<CLRString, MarshalError> {
        read_utf8(buffer).map(CLRString::from)
    }
}

/// UTF-8 text returned by value from native code: the buffer is released right
/// after it has been read, on every exit path.
///
/// Neither `Send` nor `Sync`; each thread holds its own decoder.
#[derive(Debug, Default)]
pub struct StringUtf8Copy {
    _thread_bound: PhantomData<*const ()>,
}

impl StringUtf8Copy {
    pub const OWNERSHIP: OwnershipMode = OwnershipMode::ManagedReleasesAfterRead;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode<A: NativeAllocator + ?Sized>(
        &self,
        allocator: &A,
        buffer: NativeBuffer,
    ) -> Result<CLRString, MarshalError> {
        self.read_then_release(allocator, buffer, |b| StringUtf8.decode(b))
    }

    /// Runs `read` on the buffer, then releases it, whether `read` returns or unwinds.
    pub(crate) fn read_then_release<A, R>(
        &self,
        allocator: &A,
        buffer: NativeBuffer,
        read: impl FnOnce(&NativeBuffer) -> R,
    ) -> R
    where
        A: NativeAllocator + ?Sized,
    {
        let guard = ReleaseOnDrop {
            allocator,
            buffer: Some(buffer),
        };
        read(guard.buffer())
    }
}

/// Releases the held buffer when dropped, so early returns and unwinding both free it.
struct ReleaseOnDrop<'a, A: NativeAllocator + ?Sized> {
    allocator: &'a A,
    buffer: Option<NativeBuffer>,
}

impl<A: NativeAllocator + ?Sized> ReleaseOnDrop<'_, A> {
    fn buffer(&self) -> &NativeBuffer {
        self.buffer.as_ref().expect("buffer is only taken on drop")
    }
}

impl<A: NativeAllocator + ?Sized> Drop for ReleaseOnDrop<'_, A> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.allocator.release(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::tests::TrackingAllocator;
    use std::panic::AssertUnwindSafe;

    fn raw_buffer(alloc: &TrackingAllocator, bytes: &[u8]) -> NativeBuffer {
        let mut buffer = alloc.allocate(bytes.len());
        buffer.payload_mut().copy_from_slice(bytes);
        buffer
    }

    #[test]
    fn test_encode_appends_terminator() {
        let alloc = TrackingAllocator::default();
        let buffer = StringUtf8.encode(&alloc, &CLRString::from("héllo"));

        assert_eq!(buffer.length() as usize, "héllo".len() + 1);
        assert_eq!(buffer.payload(), b"h\xc3\xa9llo\0");
        alloc.release(buffer);
    }

    #[test]
    fn test_border_owned_decode_keeps_buffer() {
        let alloc = TrackingAllocator::default();
        let buffer = StringUtf8.encode_str(&alloc, "Node名");

        let text = StringUtf8.decode(&buffer).unwrap();
        assert_eq!(text.as_string(), "Node名");
        assert_eq!(alloc.live_count(), 1);
        alloc.release(buffer);
    }

    #[test]
    fn test_empty_string_is_just_a_terminator() {
        let alloc = TrackingAllocator::default();
        let buffer = StringUtf8.encode(&alloc, &CLRString::default());
        assert_eq!(buffer.payload(), b"\0");
        assert!(StringUtf8.decode(&buffer).unwrap().is_empty());
        alloc.release(buffer);
    }

    #[test]
    fn test_copy_decode_releases_once() {
        let alloc = TrackingAllocator::default();
        let buffer = StringUtf8.encode_str(&alloc, "returned by value");

        let text = StringUtf8Copy::new().decode(&alloc, buffer).unwrap();
        assert_eq!(text, CLRString::from("returned by value"));
        assert_eq!(alloc.live_count(), 0);
        assert_eq!(alloc.released_count(), 1);
    }

    #[test]
    fn test_copy_decode_releases_on_invalid_utf8() {
        let alloc = TrackingAllocator::default();
        let buffer = raw_buffer(&alloc, &[0x66, 0xff, 0xfe, 0]);

        let result = StringUtf8Copy::new().decode(&alloc, buffer);
        assert!(matches!(result, Err(MarshalError::InvalidUtf8(_))));
        assert_eq!(alloc.live_count(), 0);
    }

    #[test]
    fn test_zero_length_header_is_missing_terminator() {
        let alloc = TrackingAllocator::default();
        let buffer = raw_buffer(&alloc, &[]);

        assert_eq!(StringUtf8.decode(&buffer), Err(MarshalError::MissingTerminator));
        let result = StringUtf8Copy::new().decode(&alloc, buffer);
        assert_eq!(result, Err(MarshalError::MissingTerminator));
        assert_eq!(alloc.live_count(), 0);
    }

    #[test]
    fn test_unpaired_surrogate_encodes_as_replacement() {
        let alloc = TrackingAllocator::default();
        let buffer = StringUtf8.encode(&alloc, &CLRString::new(vec![0x41, 0xD800, 0x42]));
        assert_eq!(StringUtf8.decode(&buffer).unwrap().as_string(), "A\u{FFFD}B");
        alloc.release(buffer);
    }

    #[test]
    fn test_release_survives_unwinding() {
        let alloc = TrackingAllocator::default();
        let buffer = StringUtf8.encode_str(&alloc, "never read");

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            StringUtf8Copy::new().read_then_release(&alloc, buffer, |_| panic!("reader failed"))
        }));
        assert!(result.is_err());
        assert_eq!(alloc.live_count(), 0);
        assert_eq!(alloc.released_count(), 1);
    }
}
