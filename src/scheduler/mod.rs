//! Cooperative execution-context scheduler.
//!
//! One logical thread of control multiplexed over a ring of stackful
//! contexts, round-robin, cooperative-first, with an optional forced
//! preemption path driven by a periodic hardware notification.
//!
//! ## Module Organization
//!
//! - `context`: the raw stack-switch primitive, context headers and the
//!   entry/termination trampolines
//! - `ring`: the circular registry of live contexts and O(1) identification
//!   of the current one
//! - `core`: `spawn` / `yield_now` / `join_all` and the process-wide
//!   scheduler instance
//! - `preempt`: the armed/disarmed preemption controller and its
//!   timer-notification entry

mod context;
mod core;
mod preempt;
mod ring;

pub use context::{TaskFn, STACK_SIZE};
pub use core::Scheduler;
