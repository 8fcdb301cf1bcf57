//! High-zone stack pool.
//!
//! The provided [`StackPool`] implementation: a first-fit heap over one
//! caller-supplied region of high memory. Every context stack block is
//! carved from this region, which is what lets the registry decide
//! main-vs-worker by a single range check.

use core::alloc::Layout;
use core::ops::Range;
use core::ptr::NonNull;

use linked_list_allocator::Heap;
use spin::Mutex;

use crate::platform::StackPool;

pub struct HighZone {
    heap: Mutex<Heap>,
    range: Range<usize>,
}

impl HighZone {
    /// Manage `base..base + size` as the stack zone.
    ///
    /// # Safety
    /// The region must be valid, unused and exclusively owned by the pool
    /// for the life of the process.
    pub unsafe fn new(base: *mut u8, size: usize) -> Self {
        let mut heap = Heap::empty();
        heap.init(base, size);
        Self {
            heap: Mutex::new(heap),
            range: base as usize..base as usize + size,
        }
    }
}

impl StackPool for HighZone {
    fn alloc_aligned_high(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let layout = Layout::from_size_align(size, align).ok()?;
        self.heap.lock().allocate_first_fit(layout).ok()
    }

    fn release_high(&self, block: NonNull<u8>, size: usize) {
        // Stack blocks are self-aligned by contract, so the original layout
        // can be reconstructed from the size alone.
        if let Ok(layout) = Layout::from_size_align(size, size) {
            unsafe { self.heap.lock().deallocate(block, layout) };
        }
    }

    fn zone(&self) -> Range<usize> {
        self.range.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::STACK_SIZE;

    fn leaked_zone(blocks: usize) -> HighZone {
        let size = blocks * STACK_SIZE;
        let layout = Layout::from_size_align(size, STACK_SIZE).unwrap();
        let base = unsafe { std::alloc::alloc(layout) };
        assert!(!base.is_null());
        unsafe { HighZone::new(base, size) }
    }

    #[test]
    fn blocks_are_self_aligned_and_inside_zone() {
        let pool = leaked_zone(4);
        let a = pool.alloc_aligned_high(STACK_SIZE, STACK_SIZE).unwrap();
        let b = pool.alloc_aligned_high(STACK_SIZE, STACK_SIZE).unwrap();
        for block in [a, b] {
            let addr = block.as_ptr() as usize;
            assert_eq!(addr % STACK_SIZE, 0);
            assert!(pool.zone().contains(&addr));
        }
        assert_ne!(a, b);
    }

    #[test]
    fn released_blocks_are_reused() {
        let pool = leaked_zone(2);
        let a = pool.alloc_aligned_high(STACK_SIZE, STACK_SIZE).unwrap();
        let b = pool.alloc_aligned_high(STACK_SIZE, STACK_SIZE).unwrap();
        // Zone exhausted except for allocator bookkeeping slack.
        pool.release_high(a, STACK_SIZE);
        let c = pool
            .alloc_aligned_high(STACK_SIZE, STACK_SIZE)
            .expect("released block should be reusable");
        assert_eq!(c.as_ptr() as usize % STACK_SIZE, 0);
        pool.release_high(b, STACK_SIZE);
        pool.release_high(c, STACK_SIZE);
    }

    #[test]
    fn exhaustion_reports_none() {
        let pool = leaked_zone(1);
        let a = pool.alloc_aligned_high(STACK_SIZE, STACK_SIZE).unwrap();
        assert!(pool.alloc_aligned_high(STACK_SIZE, STACK_SIZE).is_none());
        pool.release_high(a, STACK_SIZE);
    }
}
