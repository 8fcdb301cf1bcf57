//! Minimal architecture helpers shared by the registry and the bridge.

use core::arch::asm;

/// Read the live stack pointer.
///
/// The caller's frame is somewhere inside the current context's stack block
/// (or the main stack), which is all the registry needs for identification;
/// the exact depth within the frame does not matter.
#[inline(always)]
pub fn read_stack_ptr() -> usize {
    let sp: usize;
    unsafe {
        asm!("mov {}, rsp", out(reg) sp, options(nomem, nostack, preserves_flags));
    }
    sp
}
