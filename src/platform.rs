//! Collaborator seams between the scheduler core and the surrounding
//! firmware.
//!
//! The core never talks to hardware directly: stack memory, the periodic
//! timer notification, inline interrupt servicing and the privilege-mode
//! plumbing all arrive through these traits. Bare-metal implementations for
//! the pieces the firmware usually wires up the same way live in
//! [`x86`]; host tests substitute recording mocks.

use core::ops::Range;
use core::ptr::NonNull;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub mod x86;

/// Allocator for context stack blocks in the high memory zone.
///
/// Blocks handed out for context stacks are self-aligned (`align == size`),
/// which is what makes O(1) current-context identification possible.
pub trait StackPool: Sync {
    /// Allocate a block of `size` bytes aligned to `align`, or `None` on
    /// exhaustion. Exhaustion is non-fatal to callers of `spawn`.
    fn alloc_aligned_high(&self, size: usize, align: usize) -> Option<NonNull<u8>>;

    /// Return a block previously handed out by `alloc_aligned_high`.
    fn release_high(&self, block: NonNull<u8>, size: usize);

    /// The contiguous address range every block is carved from. A live stack
    /// pointer outside this range belongs to the main context.
    fn zone(&self) -> Range<usize>;
}

/// Timer and interrupt plumbing used by `yield_now` and the preemption
/// controller.
pub trait IrqPort: Sync {
    /// Poll and dispatch any pending hardware interrupts in place, without
    /// switching contexts. Called from the main context only.
    fn service_interrupts_inline(&self);

    /// Start the periodic hardware notification that drives forced
    /// preemption.
    fn enable_periodic_notification(&self);

    /// Stop the periodic hardware notification.
    fn disable_periodic_notification(&self);
}

/// Segment and descriptor-table state preserved around a mode transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentSnapshot {
    pub fs: u16,
    pub gs: u16,
    pub gdt_limit: u16,
    pub gdt_base: u64,
}

/// CPU-mode queries and the raw transition machinery the bridge drives.
///
/// `transition_call` is the one genuinely mode-crossing operation; the
/// save/restore protocol around it is owned by the bridge itself so its
/// ordering cannot drift between implementations.
pub trait ModePort: Sync {
    /// Whether the protection-enable status bit is set. The bridge refuses
    /// to run when it is: a transition only makes sense from the restricted
    /// mode.
    fn protection_enabled(&self) -> bool;

    /// Whether the caller currently runs with restricted addressing. Used by
    /// `yield_now` to degrade to inline interrupt servicing.
    fn addressing_restricted(&self) -> bool;

    /// Save the CMOS index register and disable the non-maskable
    /// notification source for the duration of a transition. Returns the
    /// saved index value.
    fn nmi_save_disable(&self) -> u8;

    /// Restore the CMOS index register (re-enabling the notification source
    /// if it was enabled before).
    fn nmi_restore(&self, index: u8);

    /// Snapshot the scratch segment selectors and the active
    /// descriptor-table location.
    fn segments_save(&self) -> SegmentSnapshot;

    /// Restore a snapshot taken by `segments_save`; the descriptor table is
    /// reloaded before the selectors.
    fn segments_restore(&self, snapshot: SegmentSnapshot);

    /// Switch to the extended mode, invoke `target` with no arguments, and
    /// switch back.
    ///
    /// # Safety
    /// Only the bridge may call this, after its precondition check and
    /// save/disable steps; `target` must be sound to run in extended mode.
    unsafe fn transition_call(&self, target: unsafe extern "C" fn());

    /// Top of the reserved scratch stack used by `hop_stack`. Must be
    /// 16-byte aligned.
    fn scratch_stack_top(&self) -> usize;
}
