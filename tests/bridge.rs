//! Mode-bridge behavior: call ordering around the transition, the precondition
//! check, and real scratch-stack hops.

mod common;

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use emberfw::{BridgeError, ModeBridge, ModePort};

use common::MockModePort;

#[test]
fn call_extended_wraps_the_target_in_save_restore_order() {
    static HIT: AtomicU32 = AtomicU32::new(0);
    unsafe extern "C" fn target() {
        HIT.fetch_add(1, Ordering::SeqCst);
    }

    let port: &'static MockModePort = Box::leak(Box::new(MockModePort::new()));
    let bridge = ModeBridge::new(port);

    assert_eq!(bridge.call_extended(target), Ok(()));
    assert_eq!(HIT.load(Ordering::SeqCst), 1);
    assert_eq!(
        port.take_calls(),
        vec![
            "nmi-save",
            "segments-save",
            "transition",
            "segments-restore:0x9f000",
            "nmi-restore:0x2a",
        ]
    );
}

#[test]
fn call_extended_refuses_under_enabled_protection() {
    static HIT: AtomicU32 = AtomicU32::new(0);
    unsafe extern "C" fn target() {
        HIT.fetch_add(1, Ordering::SeqCst);
    }

    let port: &'static MockModePort = Box::leak(Box::new(MockModePort::new()));
    port.set_protection_enabled(true);
    let bridge = ModeBridge::new(port);

    assert_eq!(
        bridge.call_extended(target),
        Err(BridgeError::ProtectionEnabled)
    );
    assert_eq!(HIT.load(Ordering::SeqCst), 0);
    // Refusal happens before any state is saved or touched.
    assert!(port.take_calls().is_empty());
}

#[test]
fn hop_stack_runs_the_target_on_the_scratch_stack() {
    static HOP_SP: AtomicUsize = AtomicUsize::new(0);
    unsafe extern "C" fn target(a: u64, b: u64, c: u64) -> u64 {
        HOP_SP.store(emberfw::arch::read_stack_ptr(), Ordering::SeqCst);
        a + 2 * b + 3 * c
    }

    let port: &'static MockModePort = Box::leak(Box::new(MockModePort::new()));
    let bridge = ModeBridge::new(port);

    assert_eq!(bridge.hop_stack(1, 10, 100, target), 321);

    let sp = HOP_SP.load(Ordering::SeqCst);
    assert!(
        port.scratch_range().contains(&sp),
        "target ran at {sp:#x}, outside the scratch stack {:x?}",
        port.scratch_range()
    );
    assert!(sp <= port.scratch_stack_top());
}

#[test]
fn hop_stack_passes_arguments_and_return_value_through() {
    unsafe extern "C" fn target(a: u64, b: u64, c: u64) -> u64 {
        a.wrapping_mul(b) ^ c
    }

    let port: &'static MockModePort = Box::leak(Box::new(MockModePort::new()));
    let bridge = ModeBridge::new(port);

    assert_eq!(bridge.hop_stack(7, 6, 0xFF, target), 42 ^ 0xFF);
    assert_eq!(bridge.hop_stack(0, 0, u64::MAX, target), u64::MAX);
}
