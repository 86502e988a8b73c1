//! Length-prefixed native buffers and the allocator contract that produces them.
//!
//! Wire layout of every buffer handed across the boundary:
//!
//! ```text
//! [u32 length][payload: length bytes]
//!             ^ address seen by native code
//! ```
//!
//! The header and payload live in one native allocation. [`NativeBuffer`] keeps the
//! address of the header, so the only place that converts between the two
//! addresses is the raw wire conversion ([`NativeBuffer::from_raw`] /
//! [`NativeBuffer::into_raw`]).

use std::{
    alloc::{handle_alloc_error, Layout},
    fmt::{Debug, Formatter},
    mem::size_of,
    ptr::NonNull,
    slice,
};
use tracing::{error, trace};

pub const HEADER_SIZE: usize = size_of::<u32>();

/// Allocation entry points exported by the native runtime.
///
/// There is no default implementation: the native side owns the allocator, and
/// every buffer must be released by the same allocator that produced it.
pub trait NativeAllocator {
    /// Returns the payload address of a fresh block of `byte_count` bytes whose
    /// length header has already been written, or null if allocation failed.
    ///
    /// A zero-byte request still gets a block holding the header. Null is only
    /// ever a failure here, since an empty array or string must stay distinguishable
    /// from a null one.
    fn alloc_raw(&self, byte_count: u32) -> *mut u8;

    /// # Safety
    /// `payload` must have been returned by [`NativeAllocator::alloc_raw`] on this
    /// allocator and must not have been released yet.
    unsafe fn free_raw(&self, payload: *mut u8);

    /// Allocates a buffer with a `byte_count` byte payload.
    ///
    /// Failure is fatal: once the native calling convention expects a buffer there
    /// is nothing safe to hand back, so the process aborts.
    fn allocate(&self, byte_count: usize) -> NativeBuffer {
        let Ok(header_value) = u32::try_from(byte_count) else {
            error!(byte_count, "native buffer request exceeds the 4-byte length header");
            handle_alloc_error(block_layout(byte_count));
        };

        let payload = self.alloc_raw(header_value);
        // SAFETY: a non-null result of alloc_raw is a live payload with a header
        match unsafe { NativeBuffer::from_raw(payload) } {
            Some(buffer) => {
                trace!(byte_count, "allocated native buffer");
                buffer
            }
            None => {
                error!(byte_count, "native allocator returned null");
                handle_alloc_error(block_layout(byte_count))
            }
        }
    }

    /// Releases a buffer. Consuming the handle makes a second release through the
    /// same handle impossible.
    fn release(&self, buffer: NativeBuffer) {
        trace!(byte_count = buffer.length(), "releasing native buffer");
        // SAFETY: NativeBuffer handles only come from alloc_raw or from an unsafe
        // from_raw whose caller vouched for the origin
        unsafe { self.free_raw(buffer.into_raw()) }
    }
}

impl<A: NativeAllocator + ?Sized> NativeAllocator for &A {
    fn alloc_raw(&self, byte_count: u32) -> *mut u8 {
        (**self).alloc_raw(byte_count)
    }

    unsafe fn free_raw(&self, payload: *mut u8) {
        (**self).free_raw(payload)
    }
}

fn block_layout(byte_count: usize) -> Layout {
    Layout::from_size_align(byte_count.saturating_add(HEADER_SIZE), HEADER_SIZE)
        .unwrap_or_else(|_| Layout::new::<u32>())
}

/// Handle to a length-prefixed block on the native heap.
///
/// Not `Copy` or `Clone`: the handle is the ownership token. Dropping it does not
/// free anything, since a native-owned buffer is only ever borrowed here.
#[repr(transparent)]
pub struct NativeBuffer {
    header: NonNull<u32>,
}

impl NativeBuffer {
    /// Wraps a payload address received from native code. Null becomes `None`.
    ///
    /// # Safety
    /// A non-null `payload` must point just past a readable 4-byte length header,
    /// followed by at least that many readable and writable payload bytes, and
    /// must stay valid for as long as the handle is used.
    pub unsafe fn from_raw(payload: *mut u8) -> Option<Self> {
        NonNull::new(payload).map(|p| Self {
            header: NonNull::new_unchecked(p.as_ptr().sub(HEADER_SIZE).cast::<u32>()),
        })
    }

    /// Gives up the handle and returns the payload address native code expects.
    pub fn into_raw(self) -> *mut u8 {
        self.payload_ptr()
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.payload_ptr()
    }

    fn payload_ptr(&self) -> *mut u8 {
        // SAFETY: the payload immediately follows the header inside one allocation
        unsafe { self.header.as_ptr().cast::<u8>().add(HEADER_SIZE) }
    }

    /// Logical payload length in bytes, as recorded in the header.
    pub fn length(&self) -> u32 {
        // SAFETY: from_raw's contract guarantees a readable header; native
        // allocators are not required to align it
        unsafe { self.header.as_ptr().read_unaligned() }
    }

    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    pub fn payload(&self) -> &[u8] {
        // SAFETY: from_raw's contract guarantees `length()` readable bytes
        unsafe { slice::from_raw_parts(self.payload_ptr(), self.length() as usize) }
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` makes this the only live view
        unsafe { slice::from_raw_parts_mut(self.payload_ptr(), self.length() as usize) }
    }
}

impl Debug for NativeBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "NativeBuffer({:#?}, {} bytes)", self.as_ptr(), self.length())
    }
}
