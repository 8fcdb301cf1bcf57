//! Context switch implementation
//!
//! This module contains the low-level stack-switch assembly code, the
//! per-context header, and the trampolines that bound a context's life: one
//! that enters the task function on first resume and one that retires the
//! context once the task returns.

use core::ffi::c_void;
use core::mem::offset_of;

use super::core::Scheduler;

/// Size of one context stack block. Blocks are allocated aligned to their
/// own size so the owning header can be recovered from any stack pointer
/// inside the block by rounding down.
pub const STACK_SIZE: usize = 16 * 1024;

/// Entry point of a spawned task.
pub type TaskFn = extern "C" fn(*mut c_void);

/// Header of one schedulable context, stored at the base of its stack block.
/// The stack grows down from the top of the block toward the header.
#[repr(C)]
pub struct ExecutionContext {
    /// Next context in the circular ring. Owned by the ring as a whole.
    pub(super) next: *mut ExecutionContext,
    /// Stack pointer to resume at; valid only while the context is
    /// suspended.
    pub(super) saved_stack_top: *mut u8,
}

const SAVED_SP: usize = offset_of!(ExecutionContext, saved_stack_top);

/// Words in the initial frame seeded onto a fresh stack: six callee-saved
/// registers plus the resume address.
const INITIAL_FRAME_WORDS: usize = 7;

/// Switch from `from` to `to`.
///
/// Saves the SysV callee-saved registers and the stack pointer into `from`,
/// adopts `to`'s saved stack pointer and resumes where `to` last suspended
/// (or at its entry trampoline if it never ran). Everything else is left as
/// the resumed context last saw it, which is safe because switches only
/// happen at cooperative points. A self-switch (`from == to`) saves and
/// immediately restores the same frame.
#[unsafe(naked)]
pub(super) unsafe extern "C" fn stack_switch(
    _from: *mut ExecutionContext,
    _to: *mut ExecutionContext,
) {
    core::arch::naked_asm!(
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov [rdi + {sp}], rsp", // from.saved_stack_top = rsp
        "mov rsp, [rsi + {sp}]", // rsp = to.saved_stack_top
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
        sp = const SAVED_SP,
    )
}

/// Seed a fresh stack block so the first `stack_switch` into it lands in
/// `context_entry` with the task function in r12 and its argument in r13.
pub(super) unsafe fn seed_initial_frame(
    ctx: *mut ExecutionContext,
    func: TaskFn,
    arg: *mut c_void,
) {
    let top = (ctx as usize + STACK_SIZE) as *mut u64;
    let frame = top.sub(INITIAL_FRAME_WORDS);
    frame.add(6).write(context_entry as *const () as usize as u64); // resume pc
    frame.add(5).write(0); // rbp
    frame.add(4).write(0); // rbx
    frame.add(3).write(func as *const () as usize as u64); // r12
    frame.add(2).write(arg as u64); // r13
    frame.add(1).write(0); // r14
    frame.add(0).write(0); // r15
    (*ctx).saved_stack_top = frame as *mut u8;
}

/// First code a new context executes. Calls the task function and, once it
/// returns, hands off to the termination path; this frame is never returned
/// to.
#[unsafe(naked)]
unsafe extern "C" fn context_entry() {
    core::arch::naked_asm!(
        "mov rdi, r13",
        "call r12",
        "call {finish}",
        "ud2",
        finish = sym finish_context,
    )
}

/// Runs on the dying context's stack after its task returned: picks the
/// successor and jumps to the reaping switch. Never returns.
unsafe extern "C" fn finish_context() -> ! {
    let sched = Scheduler::active();
    let dying = sched.ring().identify_current();
    let next = (*dying).next;
    switch_and_reap(dying, next)
}

/// Adopt the successor's saved stack, retire the dying context from there,
/// then resume the successor.
///
/// The dying context's block cannot be released while code still runs on
/// it, so the unlink and release happen on the successor's free stack space,
/// just below its saved frame.
#[unsafe(naked)]
unsafe extern "C" fn switch_and_reap(
    _dying: *mut ExecutionContext,
    _next: *mut ExecutionContext,
) -> ! {
    core::arch::naked_asm!(
        "mov rsp, [rsi + {sp}]", // run below next's saved frame
        "sub rsp, 8",
        "call {reap}", // reap(dying); rdi still holds it
        "add rsp, 8",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
        sp = const SAVED_SP,
        reap = sym reap,
    )
}

/// Unlink the dying context from the ring and give its stack block back to
/// the pool. Must not yield or switch.
unsafe extern "C" fn reap(dying: *mut ExecutionContext) {
    let sched = Scheduler::active();
    sched.ring().unlink(dying);
    sched.release_stack(dying as *mut u8);
    crate::kdebug!("\\{:08x}/ context retired", dying as usize);
}
