//! Simulated hardware for tests.
//!
//! `SimGpio` stands in for the GPIO block with a 4K ROM cartridge attached
//! to the data lines. `RecordingHandshake` stands in for the coordinator.
//! Both append to one shared `EventLog` so tests can check the exact order
//! of what the dispatcher did to the lines.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::coordinator::{CycleHandshake, Stall};
use crate::lines::{
    CART_OFFSET_MASK, CART_SELECT, DATA_MASK, DATA_SHIFT, DIRECTION_BIT, FSEL_BANKS, LOCK_BIT,
    decode_address, decode_data, function_select,
};
use crate::registers::{FreeRunningCounter, GpioLines};

/// Something the dispatcher did to the simulated hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    Set(u32),
    Clear(u32),
    /// A multi-line update via `GpioLines::drive`.
    Latch { mask: u32, value: u32, locked: bool },
    FunctionSelect { bank: usize, word: u32 },
    /// A level read, with the word returned.
    Sample(u32),
    CycleBegin,
    /// A wait for cycle end; `pending` if a cycle was still in flight.
    CycleWait { pending: bool },
}

/// Shared, ordered record of bus events.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<BusEvent>>>);

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: BusEvent) {
        self.0.borrow_mut().push(event);
    }

    #[must_use]
    pub fn events(&self) -> Vec<BusEvent> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    #[must_use]
    pub fn count(&self, pred: impl Fn(&BusEvent) -> bool) -> usize {
        self.0.borrow().iter().filter(|e| pred(e)).count()
    }

    #[must_use]
    pub fn latches(&self) -> usize {
        self.count(|e| matches!(e, BusEvent::Latch { .. }))
    }

    #[must_use]
    pub fn cycles(&self) -> usize {
        self.count(|e| matches!(e, BusEvent::CycleBegin))
    }

    /// Waits that actually had a cycle to wait for.
    #[must_use]
    pub fn pending_waits(&self) -> usize {
        self.count(|e| matches!(e, BusEvent::CycleWait { pending: true }))
    }

    /// Position of the first event matching `pred`.
    #[must_use]
    pub fn position(&self, pred: impl Fn(&BusEvent) -> bool) -> Option<usize> {
        self.0.borrow().iter().position(pred)
    }
}

/// GPIO block with a ROM cartridge on the far side of the level shifter.
pub struct SimGpio {
    levels: u32,
    fsel: [u32; FSEL_BANKS],
    rom: Vec<u8>,
    log: EventLog,
}

impl SimGpio {
    /// `rom` is indexed by the 12-bit cartridge offset and mirrored.
    #[must_use]
    pub fn new(rom: Vec<u8>, log: EventLog) -> Self {
        Self {
            levels: 0,
            fsel: [0; FSEL_BANKS],
            rom,
            log,
        }
    }

    /// A cartridge whose every byte is `value`.
    #[must_use]
    pub fn filled(value: u8, log: EventLog) -> Self {
        Self::new(vec![value; 4096], log)
    }

    /// Output latch as last written.
    #[must_use]
    pub fn levels(&self) -> u32 {
        self.levels
    }

    #[must_use]
    pub fn function_select_word(&self, bank: usize) -> u32 {
        self.fsel[bank]
    }

    /// A0-A12 as currently driven.
    #[must_use]
    pub fn address_lines(&self) -> u16 {
        decode_address(self.levels)
    }

    /// Offset the cartridge decodes from the address lines.
    #[must_use]
    pub fn cartridge_offset(&self) -> u16 {
        self.address_lines() & CART_OFFSET_MASK
    }

    /// D0-D7 as the cartridge would see them.
    #[must_use]
    pub fn data_lines(&self) -> u8 {
        decode_data(self.read_levels())
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.levels & LOCK_BIT != 0
    }

    /// True when the Pi has the data lines as outputs and the level shifter
    /// pointed at the cartridge.
    #[must_use]
    pub fn pi_drives_data(&self) -> bool {
        let pins_out = (13..=20).all(|pin| {
            let bank = pin / 10;
            let slot = pin % 10;
            (self.fsel[bank] >> (slot * 3)) & 0b111 == 0b001
        });
        pins_out && self.levels & DIRECTION_BIT != 0
    }

    fn cartridge_drives_data(&self) -> bool {
        let data_inputs = (0..FSEL_BANKS)
            .all(|bank| self.fsel[bank] & function_select(DATA_MASK, bank) == 0);
        data_inputs && self.levels & DIRECTION_BIT == 0
    }

    fn read_levels(&self) -> u32 {
        if !self.cartridge_drives_data() {
            return self.levels;
        }
        let address = self.address_lines();
        let byte = if address & CART_SELECT != 0 && !self.rom.is_empty() {
            self.rom[usize::from(address & CART_OFFSET_MASK) % self.rom.len()]
        } else {
            0xFF
        };
        (self.levels & !DATA_MASK) | (u32::from(byte) << DATA_SHIFT)
    }
}

impl GpioLines for SimGpio {
    fn set_bits(&mut self, mask: u32) {
        self.levels |= mask;
        self.log.push(BusEvent::Set(mask));
    }

    fn clear_bits(&mut self, mask: u32) {
        self.levels &= !mask;
        self.log.push(BusEvent::Clear(mask));
    }

    fn read(&self) -> u32 {
        let word = self.read_levels();
        self.log.push(BusEvent::Sample(word));
        word
    }

    fn set_function_select(&mut self, bank: usize, word: u32) {
        self.fsel[bank] = word;
        self.log.push(BusEvent::FunctionSelect { bank, word });
    }

    fn drive(&mut self, mask: u32, value: u32) {
        let locked = self.is_locked();
        self.levels = (self.levels & !mask) | (value & mask);
        self.log.push(BusEvent::Latch {
            mask,
            value: value & mask,
            locked,
        });
    }
}

/// Counter that advances by one per read.
#[derive(Debug, Default)]
pub struct SimCounter(AtomicU32);

impl FreeRunningCounter for SimCounter {
    fn counter_low(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Handshake that completes instantly and records what was asked of it.
#[derive(Debug)]
pub struct RecordingHandshake {
    log: EventLog,
    active: Cell<bool>,
    stall: Cell<Option<Stall>>,
}

impl RecordingHandshake {
    #[must_use]
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            active: Cell::new(false),
            stall: Cell::new(None),
        }
    }

    /// Make every wait on a pending cycle fail with `stall`.
    pub fn stall_with(&self, stall: Option<Stall>) {
        self.stall.set(stall);
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

impl CycleHandshake for RecordingHandshake {
    fn begin_cycle(&self) {
        self.active.set(true);
        self.log.push(BusEvent::CycleBegin);
    }

    fn wait_for_cycle_end(&self) -> Result<(), Stall> {
        let pending = self.active.get();
        self.log.push(BusEvent::CycleWait { pending });
        if pending {
            if let Some(stall) = self.stall.get() {
                return Err(stall);
            }
        }
        self.active.set(false);
        Ok(())
    }
}
