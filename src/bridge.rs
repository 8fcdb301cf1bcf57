//! Privilege/addressing-mode transition bridge.
//!
//! Restricted-mode code uses [`ModeBridge::call_extended`] to run a routine
//! that only works in the extended mode, and [`ModeBridge::hop_stack`] to
//! borrow the reserved scratch stack when the current stack budget is too
//! tight. Both are synchronous low-level boundary calls; nothing here
//! suspends or schedules.

use crate::platform::ModePort;

/// Errors reported by the bridge. These are programmer errors, not transient
/// failures; no state is changed when one is returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeError {
    /// `call_extended` was invoked while the protection-enable bit was
    /// already set.
    ProtectionEnabled,
}

pub struct ModeBridge {
    port: &'static dyn ModePort,
}

impl ModeBridge {
    pub const fn new(port: &'static dyn ModePort) -> Self {
        Self { port }
    }

    pub(crate) fn port(&self) -> &'static dyn ModePort {
        self.port
    }

    /// Call `target` in the extended mode and return.
    ///
    /// The non-maskable notification source is disabled and the scratch
    /// segment selectors plus the descriptor-table location are preserved
    /// around the transition, restored in reverse order. Beyond the callee's
    /// own effects the call is side-effect free and never suspends.
    pub fn call_extended(&self, target: unsafe extern "C" fn()) -> Result<(), BridgeError> {
        if self.port.protection_enabled() {
            // Called with protected addressing already active; there is no
            // transition to perform and doing one anyway would corrupt state.
            return Err(BridgeError::ProtectionEnabled);
        }

        let nmi_index = self.port.nmi_save_disable();
        let segments = self.port.segments_save();

        unsafe { self.port.transition_call(target) };

        self.port.segments_restore(segments);
        self.port.nmi_restore(nmi_index);
        Ok(())
    }

    /// Invoke `target(a, b, c)` on the reserved scratch stack and pass its
    /// return value through. Caller and callee stay in the same addressing
    /// mode.
    pub fn hop_stack(
        &self,
        a: u64,
        b: u64,
        c: u64,
        target: unsafe extern "C" fn(u64, u64, u64) -> u64,
    ) -> u64 {
        let top = self.port.scratch_stack_top();
        debug_assert_eq!(top % 16, 0, "scratch stack top must be 16-byte aligned");
        unsafe { hop_stack_raw(a, b, c, target, top as u64) }
    }
}

/// Switch to the scratch stack, call `target`, switch back.
///
/// The original stack pointer is kept at the top of the scratch region while
/// `target` runs. Arguments already sit in their argument registers and are
/// not touched; the return value passes through untouched as well.
#[unsafe(naked)]
unsafe extern "C" fn hop_stack_raw(
    _a: u64,
    _b: u64,
    _c: u64,
    _target: unsafe extern "C" fn(u64, u64, u64) -> u64,
    _scratch_top: u64,
) -> u64 {
    core::arch::naked_asm!(
        // Park the caller's stack pointer on the scratch stack.
        "mov r9, rsp",
        "mov rsp, r8",
        "push r9",
        // Keep the stack 16-byte aligned at the call.
        "sub rsp, 8",
        "call rcx",
        "add rsp, 8",
        // Reload the parked stack pointer and return on the original stack.
        "mov rsp, [rsp]",
        "ret",
    )
}
