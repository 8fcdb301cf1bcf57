//! Shared hardware mocks and fixtures for the host-side tests.
//!
//! Scheduler state is process-global (the installed instance plus the event
//! log), so every test that installs a fixture must be `#[serial]`.

#![allow(dead_code)]

use std::alloc::Layout;
use std::ffi::c_void;
use std::ops::Range;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use emberfw::{HighZone, IrqPort, ModeBridge, ModePort, Scheduler, SegmentSnapshot, StackPool};
use emberfw::STACK_SIZE;

/// Worker stack blocks available per fixture.
pub const ZONE_BLOCKS: usize = 8;
const SCRATCH_SIZE: usize = 4096;

/// Global event log the tasks and the test body both append to; execution
/// order of side effects is the observable everything here asserts on.
pub static EVENTS: Mutex<Vec<String>> = Mutex::new(Vec::new());

pub fn push_event(event: impl Into<String>) {
    EVENTS.lock().unwrap().push(event.into());
}

pub fn take_events() -> Vec<String> {
    std::mem::take(&mut *EVENTS.lock().unwrap())
}

/// Mode port that records the bridge's save/restore calls and runs
/// transition targets directly (the mock "transition" is mode bookkeeping
/// only).
pub struct MockModePort {
    protection_enabled: AtomicBool,
    addressing_restricted: AtomicBool,
    pub calls: Mutex<Vec<String>>,
    scratch_top: usize,
}

impl MockModePort {
    pub fn new() -> Self {
        let layout = Layout::from_size_align(SCRATCH_SIZE, 16).unwrap();
        let base = unsafe { std::alloc::alloc(layout) };
        assert!(!base.is_null());
        Self {
            protection_enabled: AtomicBool::new(false),
            addressing_restricted: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            scratch_top: base as usize + SCRATCH_SIZE,
        }
    }

    pub fn set_protection_enabled(&self, enabled: bool) {
        self.protection_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_addressing_restricted(&self, restricted: bool) {
        self.addressing_restricted.store(restricted, Ordering::SeqCst);
    }

    pub fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    pub fn scratch_range(&self) -> Range<usize> {
        self.scratch_top - SCRATCH_SIZE..self.scratch_top
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

impl ModePort for MockModePort {
    fn protection_enabled(&self) -> bool {
        self.protection_enabled.load(Ordering::SeqCst)
    }

    fn addressing_restricted(&self) -> bool {
        self.addressing_restricted.load(Ordering::SeqCst)
    }

    fn nmi_save_disable(&self) -> u8 {
        self.record("nmi-save");
        0x2A
    }

    fn nmi_restore(&self, index: u8) {
        self.record(format!("nmi-restore:{index:#04x}"));
    }

    fn segments_save(&self) -> SegmentSnapshot {
        self.record("segments-save");
        SegmentSnapshot {
            fs: 0x30,
            gs: 0x38,
            gdt_limit: 0x7F,
            gdt_base: 0x0009_F000,
        }
    }

    fn segments_restore(&self, snapshot: SegmentSnapshot) {
        self.record(format!("segments-restore:{:#x}", snapshot.gdt_base));
    }

    unsafe fn transition_call(&self, target: unsafe extern "C" fn()) {
        self.record("transition");
        target();
    }

    fn scratch_stack_top(&self) -> usize {
        self.scratch_top
    }
}

/// Irq port that counts its invocations.
pub struct CountingIrqPort {
    pub serviced: AtomicU32,
    pub enabled: AtomicU32,
    pub disabled: AtomicU32,
}

impl CountingIrqPort {
    pub fn new() -> Self {
        Self {
            serviced: AtomicU32::new(0),
            enabled: AtomicU32::new(0),
            disabled: AtomicU32::new(0),
        }
    }
}

impl IrqPort for CountingIrqPort {
    fn service_interrupts_inline(&self) {
        self.serviced.fetch_add(1, Ordering::SeqCst);
    }

    fn enable_periodic_notification(&self) {
        self.enabled.fetch_add(1, Ordering::SeqCst);
    }

    fn disable_periodic_notification(&self) {
        self.disabled.fetch_add(1, Ordering::SeqCst);
    }
}

/// `HighZone` wrapper whose allocations can be made to fail on demand, for
/// the spawn-degrade tests.
pub struct TogglePool {
    inner: HighZone,
    fail: AtomicBool,
}

impl TogglePool {
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl StackPool for TogglePool {
    fn alloc_aligned_high(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        if self.fail.load(Ordering::SeqCst) {
            return None;
        }
        self.inner.alloc_aligned_high(size, align)
    }

    fn release_high(&self, block: NonNull<u8>, size: usize) {
        self.inner.release_high(block, size)
    }

    fn zone(&self) -> Range<usize> {
        self.inner.zone()
    }
}

pub struct Fixture {
    pub sched: &'static Scheduler,
    pub port: &'static MockModePort,
    pub irq: &'static CountingIrqPort,
    pub pool: &'static TogglePool,
}

/// Install a fresh scheduler over leaked mocks. One fixture per test; the
/// few kilobytes leaked per install are irrelevant to the test process.
pub fn install_fixture() -> Fixture {
    take_events();

    let zone_size = ZONE_BLOCKS * STACK_SIZE;
    let layout = Layout::from_size_align(zone_size, STACK_SIZE).unwrap();
    let base = unsafe { std::alloc::alloc(layout) };
    assert!(!base.is_null());

    let pool: &'static TogglePool = Box::leak(Box::new(TogglePool {
        inner: unsafe { HighZone::new(base, zone_size) },
        fail: AtomicBool::new(false),
    }));
    let port: &'static MockModePort = Box::leak(Box::new(MockModePort::new()));
    let irq: &'static CountingIrqPort = Box::leak(Box::new(CountingIrqPort::new()));
    let bridge: &'static ModeBridge = Box::leak(Box::new(ModeBridge::new(port)));

    let sched = Scheduler::install(pool, irq, bridge);
    Fixture {
        sched,
        port,
        irq,
        pool,
    }
}

/// Per-task context handed to the extern "C" task entry points.
pub struct TaskCtx {
    pub sched: &'static Scheduler,
    pub id: &'static str,
    pub park: &'static AtomicBool,
}

pub fn leak_park_flag(parked: bool) -> &'static AtomicBool {
    Box::leak(Box::new(AtomicBool::new(parked)))
}

pub fn leak_task_ctx(
    sched: &'static Scheduler,
    id: &'static str,
    park: &'static AtomicBool,
) -> *mut c_void {
    Box::leak(Box::new(TaskCtx { sched, id, park })) as *mut TaskCtx as *mut c_void
}

pub unsafe fn task_ctx<'a>(arg: *mut c_void) -> &'a TaskCtx {
    &*(arg as *const TaskCtx)
}
