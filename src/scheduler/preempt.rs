//! Preemption controller.
//!
//! Third-party extension code is not trusted to yield. While armed, a
//! periodic hardware notification calls [`Scheduler::check_preemption`]
//! from restricted mode; the handler bridges into extended mode and forces
//! a switch away from the main context. The notification is only serviced
//! while executing on the main context's stack, so a forced switch is
//! always "suspend main, resume the next pending worker" and can never
//! interleave with a cooperative switch in flight.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::kinfo;

use super::context::stack_switch;
use super::core::Scheduler;

pub(super) struct Preemption {
    armed: AtomicBool,
    attempts: AtomicU32,
}

impl Preemption {
    pub(super) const fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
        }
    }
}

impl Scheduler {
    /// Arm forced preemption: reset the attempt counter and enable the
    /// periodic notification. No-op when preemption support is configured
    /// out.
    pub fn arm_preemption(&'static self) {
        if !cfg!(feature = "preempt") {
            return;
        }
        self.preempt.attempts.store(0, Ordering::Relaxed);
        self.preempt.armed.store(true, Ordering::SeqCst);
        self.irq().enable_periodic_notification();
        kinfo!("preemption armed");
    }

    /// Disarm forced preemption and report how many forced-switch attempts
    /// were made while armed. No-op (returning 0) when preemption support
    /// is configured out.
    pub fn disarm_preemption(&'static self) -> u32 {
        if !cfg!(feature = "preempt") {
            return 0;
        }
        self.irq().disable_periodic_notification();
        self.preempt.armed.store(false, Ordering::SeqCst);
        let attempts = self.preempt.attempts.load(Ordering::Relaxed);
        kinfo!("preemption disarmed - {} attempts", attempts);
        attempts
    }

    /// Diagnostic count of forced-switch attempts since the last arm.
    pub fn preemption_attempts(&self) -> u32 {
        self.preempt.attempts.load(Ordering::Relaxed)
    }

    /// Timer-notification entry, invoked from restricted mode.
    ///
    /// Does nothing unless preemption is configured, armed, and some worker
    /// context is pending. The bridge result is deliberately discarded: the
    /// notification re-fires, and there is nobody above an interrupt
    /// handler to report to.
    pub fn check_preemption(&'static self) {
        if !cfg!(feature = "preempt")
            || !self.preempt.armed.load(Ordering::SeqCst)
            || !self.has_live_contexts()
        {
            return;
        }
        self.preempt.attempts.fetch_add(1, Ordering::Relaxed);
        let _ = self.bridge().call_extended(force_preempt);
    }
}

/// Extended-mode target of the forced switch: suspend the main context and
/// resume its successor. Runs only while the CPU is on the main context's
/// stack.
unsafe extern "C" fn force_preempt() {
    let sched = Scheduler::active();
    let main = sched.ring().main_ptr();
    stack_switch(main, (*main).next);
}
