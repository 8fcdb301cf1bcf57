//! Execution context registry: the circular ring of runnable contexts.
//!
//! The ring is always circular and non-empty; the main context is a
//! permanent member embedded here. "Current" is never stored anywhere: it is
//! derived from the live stack pointer, which keeps identification O(1) and
//! valid even in the middle of a forced switch.

use core::cell::UnsafeCell;
use core::ops::Range;
use core::ptr;

use crate::arch::read_stack_ptr;

use super::context::{ExecutionContext, STACK_SIZE};

pub(super) struct ContextRing {
    main: UnsafeCell<ExecutionContext>,
    /// Address range all worker stack blocks are carved from. The main
    /// context's stack lies outside it by construction.
    zone: Range<usize>,
}

// Ring structure is only ever mutated from the single logical thread of
// control, at cooperative points outside the raw switch primitive; see the
// concurrency notes in the crate's scheduler module.
unsafe impl Sync for ContextRing {}

impl ContextRing {
    pub(super) fn new(zone: Range<usize>) -> Self {
        Self {
            main: UnsafeCell::new(ExecutionContext {
                next: ptr::null_mut(),
                saved_stack_top: ptr::null_mut(),
            }),
            zone,
        }
    }

    pub(super) fn main_ptr(&self) -> *mut ExecutionContext {
        self.main.get()
    }

    /// Close the ring over the main context alone. Called once at install
    /// time, after the registry has its final address.
    pub(super) unsafe fn link_main(&self) {
        (*self.main_ptr()).next = self.main_ptr();
    }

    /// Identify the currently running context from the live stack pointer.
    ///
    /// Worker stacks are self-aligned blocks inside the zone, so rounding
    /// the stack pointer down to the block size recovers the header without
    /// any traversal. A stack pointer outside the zone is the main context.
    pub(super) fn identify_current(&self) -> *mut ExecutionContext {
        let sp = read_stack_ptr();
        if !self.zone.contains(&sp) {
            return self.main_ptr();
        }
        x86_64::align_down(sp as u64, STACK_SIZE as u64) as usize as *mut ExecutionContext
    }

    /// Whether the main context is the only ring member.
    pub(super) fn is_solo(&self) -> bool {
        unsafe { (*self.main_ptr()).next == self.main_ptr() }
    }

    /// Splice `new` in immediately after `cur`: new work runs next, not
    /// last.
    pub(super) unsafe fn insert_after(&self, cur: *mut ExecutionContext, new: *mut ExecutionContext) {
        (*new).next = (*cur).next;
        (*cur).next = new;
    }

    /// Remove `ctx` by scanning for its predecessor. A context that is not
    /// in the ring means the ring is corrupt; that is a bug, not a runtime
    /// condition, and is treated as fatal.
    pub(super) unsafe fn unlink(&self, ctx: *mut ExecutionContext) {
        let mut pos = self.main_ptr();
        while (*pos).next != ctx {
            pos = (*pos).next;
            if pos == self.main_ptr() {
                panic!("context {:#x} not found in ring", ctx as usize);
            }
        }
        (*pos).next = (*ctx).next;
    }
}
