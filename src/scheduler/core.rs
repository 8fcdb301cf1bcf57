//! `spawn` / `yield_now` / `join_all` and the process-wide scheduler
//! instance.
//!
//! Concurrency model: one logical thread of control at all times. The ring
//! is mutated only by the context performing a spawn, by a terminating
//! context removing itself, or (pointer-only, no structural change) by the
//! forced-preemption switch. None of those overlap, so there is no locking;
//! the one genuine race — a forced switch against a cooperative switch in
//! flight — is excluded by arming preemption only while executing on the
//! main context's stack.
//!
//! `spawn` degrades to synchronous execution when threading is disabled or
//! stack allocation fails. Callers cannot tell the difference and must not
//! depend on true overlap for correctness, only for responsiveness.

use core::ffi::c_void;
use core::ptr;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicPtr, Ordering};

use alloc::boxed::Box;

use crate::bridge::ModeBridge;
use crate::platform::{IrqPort, StackPool};
use crate::{kdebug, kinfo};

use super::context::{seed_initial_frame, stack_switch, ExecutionContext, TaskFn, STACK_SIZE};
use super::preempt::Preemption;
use super::ring::ContextRing;

/// Process-wide scheduler instance, published at install time for the
/// trampoline and preemption paths that cannot carry a reference.
static ACTIVE: AtomicPtr<Scheduler> = AtomicPtr::new(ptr::null_mut());

pub struct Scheduler {
    ring: ContextRing,
    pool: &'static dyn StackPool,
    irq: &'static dyn IrqPort,
    bridge: &'static ModeBridge,
    pub(super) preempt: Preemption,
}

impl Scheduler {
    /// Construct the scheduler singleton: main context linked to itself,
    /// preemption disarmed. The instance never goes away; there is no
    /// teardown before process exit.
    pub fn install(
        pool: &'static dyn StackPool,
        irq: &'static dyn IrqPort,
        bridge: &'static ModeBridge,
    ) -> &'static Scheduler {
        let sched: &'static mut Scheduler = Box::leak(Box::new(Scheduler {
            ring: ContextRing::new(pool.zone()),
            pool,
            irq,
            bridge,
            preempt: Preemption::new(),
        }));
        unsafe { sched.ring.link_main() };
        let ptr: *mut Scheduler = sched;
        ACTIVE.store(ptr, Ordering::Release);
        kinfo!(
            "scheduler installed ({} KiB self-aligned context stacks)",
            STACK_SIZE / 1024
        );
        unsafe { &*ptr }
    }

    /// The installed scheduler instance.
    ///
    /// # Panics
    /// If no scheduler has been installed yet.
    pub fn active() -> &'static Scheduler {
        let ptr = ACTIVE.load(Ordering::Acquire);
        assert!(!ptr.is_null(), "scheduler not installed");
        unsafe { &*ptr }
    }

    pub(super) fn ring(&self) -> &ContextRing {
        &self.ring
    }

    pub(super) fn bridge(&self) -> &'static ModeBridge {
        self.bridge
    }

    pub(super) fn irq(&self) -> &'static dyn IrqPort {
        self.irq
    }

    pub(super) unsafe fn release_stack(&self, block: *mut u8) {
        self.pool
            .release_high(NonNull::new_unchecked(block), STACK_SIZE);
    }

    /// Whether any spawned context is still live.
    pub fn has_live_contexts(&self) -> bool {
        !self.ring.is_solo()
    }

    /// Briefly permit pending interrupts, then pass control to the next
    /// context in the ring.
    ///
    /// With threading disabled, or under restricted addressing, this only
    /// services pending interrupts in place. Interrupts are serviced inline
    /// only from the main context; that is the one stack they are safe to
    /// fire on.
    pub fn yield_now(&'static self) {
        if !cfg!(feature = "threads") || self.bridge.port().addressing_restricted() {
            self.irq.service_interrupts_inline();
            return;
        }
        let cur = self.ring.identify_current();
        if cur == self.ring.main_ptr() {
            self.irq.service_interrupts_inline();
        }
        unsafe { stack_switch(cur, (*cur).next) };
    }

    /// Start executing `func(arg)` in a new context, spliced in right after
    /// the current one and switched to immediately.
    ///
    /// If threading is disabled or no stack block is available, `func(arg)`
    /// runs synchronously in the caller's context instead. That degrade is
    /// deliberately silent: tasks always eventually run, and callers must
    /// not assume they ran concurrently.
    pub fn spawn(&'static self, func: TaskFn, arg: *mut c_void) {
        if !cfg!(feature = "threads") {
            return func(arg);
        }
        debug_assert!(
            !self.bridge.port().addressing_restricted(),
            "spawn requires extended addressing"
        );
        let Some(block) = self.pool.alloc_aligned_high(STACK_SIZE, STACK_SIZE) else {
            return func(arg);
        };

        let ctx = block.as_ptr() as *mut ExecutionContext;
        unsafe {
            ctx.write(ExecutionContext {
                next: ptr::null_mut(),
                saved_stack_top: ptr::null_mut(),
            });
            seed_initial_frame(ctx, func, arg);
            let cur = self.ring.identify_current();
            self.ring.insert_after(cur, ctx);
            kdebug!("/{:08x}\\ context started", ctx as usize);
            stack_switch(cur, ctx);
        }
    }

    /// Yield until every spawned context has run to completion.
    ///
    /// Blocking and cooperative: this can wait forever if a spawned context
    /// never terminates. No-op with threading disabled.
    pub fn join_all(&'static self) {
        if !cfg!(feature = "threads") {
            return;
        }
        while !self.ring.is_solo() {
            self.yield_now();
        }
    }
}
