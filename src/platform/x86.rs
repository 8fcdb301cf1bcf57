//! Bare-metal implementations of the collaborator traits.
//!
//! These cover the pieces the firmware wires up the same way on every x86
//! board: the RTC periodic notification behind the slave interrupt
//! controller, and the CMOS/descriptor-table handling of the mode port. They
//! touch privileged registers and I/O ports, so they only build for
//! `target_os = "none"`.

use spin::Mutex;
use x86_64::instructions::interrupts;
use x86_64::instructions::port::Port;
use x86_64::instructions::tables::{lgdt, sgdt};
use x86_64::registers::control::{Cr0, Cr0Flags};
use x86_64::registers::segmentation::{Segment, FS, GS};
use x86_64::structures::gdt::SegmentSelector;
use x86_64::structures::DescriptorTablePointer;
use x86_64::VirtAddr;

use pic8259::ChainedPics;

use super::{IrqPort, ModePort, SegmentSnapshot};

const CMOS_INDEX_PORT: u16 = 0x70;
const CMOS_DATA_PORT: u16 = 0x71;
const NMI_DISABLE_BIT: u8 = 0x80;

const RTC_REG_A: u8 = 0x0A;
const RTC_REG_B: u8 = 0x0B;
/// Register A divider for a ~1 kHz periodic rate.
const RTC_RATE_1KHZ: u8 = 0x26;
/// Periodic-interrupt-enable bit in register B.
const RTC_PIE: u8 = 0x40;

fn cmos_read(reg: u8) -> u8 {
    let mut index = Port::<u8>::new(CMOS_INDEX_PORT);
    let mut data = Port::<u8>::new(CMOS_DATA_PORT);
    unsafe {
        index.write(reg | NMI_DISABLE_BIT);
        data.read()
    }
}

fn cmos_write(reg: u8, value: u8) {
    let mut index = Port::<u8>::new(CMOS_INDEX_PORT);
    let mut data = Port::<u8>::new(CMOS_DATA_PORT);
    unsafe {
        index.write(reg | NMI_DISABLE_BIT);
        data.write(value);
    }
}

/// Periodic notification source: the RTC interrupt, IRQ 8 on the slave
/// controller.
pub struct RtcTimerPort {
    pics: Mutex<ChainedPics>,
}

impl RtcTimerPort {
    /// # Safety
    /// The given vector offsets must match the interrupt controller setup of
    /// the surrounding firmware.
    pub const unsafe fn new(offset1: u8, offset2: u8) -> Self {
        Self {
            pics: Mutex::new(ChainedPics::new(offset1, offset2)),
        }
    }
}

impl IrqPort for RtcTimerPort {
    fn service_interrupts_inline(&self) {
        // Open the interrupt window for a single instruction so anything
        // pending gets delivered, then close it again.
        interrupts::enable();
        x86_64::instructions::nop();
        interrupts::disable();
    }

    fn enable_periodic_notification(&self) {
        cmos_write(RTC_REG_A, RTC_RATE_1KHZ);
        let reg_b = cmos_read(RTC_REG_B);
        cmos_write(RTC_REG_B, reg_b | RTC_PIE);
        // Clear any latched periodic interrupt so the first notification is
        // a fresh one, then unmask IRQ 8.
        let _ = cmos_read(0x0C);
        unsafe {
            let mut pics = self.pics.lock();
            let [master, slave] = pics.read_masks();
            pics.write_masks(master, slave & !0x01);
        }
    }

    fn disable_periodic_notification(&self) {
        unsafe {
            let mut pics = self.pics.lock();
            let [master, slave] = pics.read_masks();
            pics.write_masks(master, slave | 0x01);
        }
        let reg_b = cmos_read(RTC_REG_B);
        cmos_write(RTC_REG_B, reg_b & !RTC_PIE);
    }
}

/// Mode port over the real CPU state.
///
/// On a long-mode build the protection-enable bit is always set, so
/// `call_extended` always reports its precondition sentinel and
/// `transition_call` is unreachable; the restricted-mode build of the
/// surrounding firmware supplies the actual transition routine.
pub struct X86ModePort {
    scratch_top: usize,
}

impl X86ModePort {
    /// `scratch_top` is the 16-byte-aligned top of the reserved scratch
    /// stack region.
    pub const fn new(scratch_top: usize) -> Self {
        Self { scratch_top }
    }
}

impl ModePort for X86ModePort {
    fn protection_enabled(&self) -> bool {
        Cr0::read().contains(Cr0Flags::PROTECTED_MODE_ENABLE)
    }

    fn addressing_restricted(&self) -> bool {
        !self.protection_enabled()
    }

    fn nmi_save_disable(&self) -> u8 {
        let mut index = Port::<u8>::new(CMOS_INDEX_PORT);
        let mut data = Port::<u8>::new(CMOS_DATA_PORT);
        unsafe {
            let saved = index.read();
            index.write(saved | NMI_DISABLE_BIT);
            let _ = data.read();
            saved
        }
    }

    fn nmi_restore(&self, saved: u8) {
        let mut index = Port::<u8>::new(CMOS_INDEX_PORT);
        let mut data = Port::<u8>::new(CMOS_DATA_PORT);
        unsafe {
            index.write(saved);
            let _ = data.read();
        }
    }

    fn segments_save(&self) -> SegmentSnapshot {
        let gdt = sgdt();
        SegmentSnapshot {
            fs: FS::get_reg().0,
            gs: GS::get_reg().0,
            gdt_limit: gdt.limit,
            gdt_base: gdt.base.as_u64(),
        }
    }

    fn segments_restore(&self, snapshot: SegmentSnapshot) {
        unsafe {
            lgdt(&DescriptorTablePointer {
                limit: snapshot.gdt_limit,
                base: VirtAddr::new(snapshot.gdt_base),
            });
            FS::set_reg(SegmentSelector(snapshot.fs));
            GS::set_reg(SegmentSelector(snapshot.gs));
        }
    }

    unsafe fn transition_call(&self, _target: unsafe extern "C" fn()) {
        // Statically unreachable here: protection_enabled() is always true
        // in long mode, so call_extended bails out with its sentinel first.
        unreachable!("mode transition routine is supplied by the restricted-mode firmware build");
    }

    fn scratch_stack_top(&self) -> usize {
        self.scratch_top
    }
}
