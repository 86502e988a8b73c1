use interop_rs::buffer::{NativeAllocator, HEADER_SIZE};
use parking_lot::Mutex;
use std::{alloc::Layout, collections::HashMap};

/// Stands in for the native runtime's allocator: writes the length header in
/// front of every payload and tracks which blocks are still live.
#[derive(Default)]
pub struct HeapAllocator {
    live: Mutex<HashMap<usize, Layout>>,
    releases: Mutex<usize>,
}

#[allow(dead_code)]
impl HeapAllocator {
    pub fn live(&self) -> usize {
        self.live.lock().len()
    }

    pub fn releases(&self) -> usize {
        *self.releases.lock()
    }
}

impl NativeAllocator for HeapAllocator {
    fn alloc_raw(&self, byte_count: u32) -> *mut u8 {
        let layout = Layout::from_size_align(HEADER_SIZE + byte_count as usize, 8).unwrap();
        unsafe {
            let block = std::alloc::alloc(layout);
            assert!(!block.is_null());
            block.cast::<u32>().write(byte_count);
            let payload = block.add(HEADER_SIZE);
            self.live.lock().insert(payload as usize, layout);
            payload
        }
    }

    unsafe fn free_raw(&self, payload: *mut u8) {
        let layout = self
            .live
            .lock()
            .remove(&(payload as usize))
            .expect("double release or foreign buffer");
        *self.releases.lock() += 1;
        std::alloc::dealloc(payload.sub(HEADER_SIZE), layout);
    }
}
