//! Physical register access.
//!
//! Two 4K blocks of the SoC's peripheral window are mapped through
//! `/dev/mem`: the GPIO controller and the free-running system timer. The
//! mappings are released when the blocks are dropped.
//!
//! # GPIO registers used (word offsets)
//!
//! | Word | Name     | Use                              |
//! |------|----------|----------------------------------|
//! | 0-2  | GPFSEL0-2| Pin modes for GPIO 0-29          |
//! | 7    | GPSET0   | Drive pins high (1 bits only)    |
//! | 10   | GPCLR0   | Drive pins low (1 bits only)     |
//! | 13   | GPLEV0   | Pin levels                       |
//!
//! The system timer's CLO (word 1) counts at 1 MHz.

#![allow(unsafe_code)]
#![allow(clippy::cast_ptr_alignment)]

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;

use memmap2::{MmapMut, MmapOptions};

use crate::config::BoardRevision;
use crate::error::{PortError, Result};

/// Bytes mapped per block.
pub const BLOCK_SIZE: usize = 4096;
const BLOCK_WORDS: usize = BLOCK_SIZE / 4;

const GPFSEL0: usize = 0;
const GPSET0: usize = 7;
const GPCLR0: usize = 10;
const GPLEV0: usize = 13;

const ST_CLO: usize = 1;

/// Raw access to the GPIO lines.
///
/// No exclusivity is implied: the caller serializes access.
pub trait GpioLines {
    /// Drive every line whose bit is set in `mask` high.
    fn set_bits(&mut self, mask: u32);

    /// Drive every line whose bit is set in `mask` low.
    fn clear_bits(&mut self, mask: u32);

    /// Current pin levels.
    fn read(&self) -> u32;

    /// Write one function-select bank (ten pins, three bits each).
    fn set_function_select(&mut self, bank: usize, word: u32);

    /// Set the lines in `mask` to match `value`.
    fn drive(&mut self, mask: u32, value: u32) {
        self.clear_bits(mask & !value);
        self.set_bits(value & mask);
    }
}

/// A counter that increments at a fixed rate and wraps.
pub trait FreeRunningCounter: Send {
    fn counter_low(&self) -> u32;
}

/// One mapped 4K register block.
struct RegisterBlock {
    name: &'static str,
    map: MmapMut,
}

impl RegisterBlock {
    fn map(mem: &File, name: &'static str, base: u64) -> Result<Self> {
        // SAFETY: the mapping covers device registers, not memory another
        // part of this process holds references into. All access goes
        // through volatile reads and writes below.
        let map = unsafe { MmapOptions::new().offset(base).len(BLOCK_SIZE).map_mut(mem) }
            .map_err(|source| PortError::HardwareMapping { block: name, base, source })?;
        log::debug!("mapped {name} registers at {base:#X}");
        Ok(Self { name, map })
    }

    fn read(&self, word: usize) -> u32 {
        assert!(word < BLOCK_WORDS);
        // SAFETY: in bounds (checked above) and word aligned, since the
        // mapping starts on a page boundary.
        unsafe { self.map.as_ptr().cast::<u32>().add(word).read_volatile() }
    }

    fn write(&mut self, word: usize, value: u32) {
        assert!(word < BLOCK_WORDS);
        // SAFETY: as for `read`.
        unsafe {
            self.map
                .as_mut_ptr()
                .cast::<u32>()
                .add(word)
                .write_volatile(value);
        }
    }
}

impl Drop for RegisterBlock {
    fn drop(&mut self) {
        log::debug!("unmapping {} registers", self.name);
    }
}

/// The mapped GPIO controller.
pub struct GpioBlock {
    block: RegisterBlock,
}

impl GpioLines for GpioBlock {
    fn set_bits(&mut self, mask: u32) {
        self.block.write(GPSET0, mask);
    }

    fn clear_bits(&mut self, mask: u32) {
        self.block.write(GPCLR0, mask);
    }

    fn read(&self) -> u32 {
        self.block.read(GPLEV0)
    }

    fn set_function_select(&mut self, bank: usize, word: u32) {
        self.block.write(GPFSEL0 + bank, word);
    }
}

/// The mapped system timer.
pub struct TimerBlock {
    block: RegisterBlock,
}

impl FreeRunningCounter for TimerBlock {
    fn counter_low(&self) -> u32 {
        self.block.read(ST_CLO)
    }
}

/// Both register blocks, owned by one port.
pub struct PeripheralRegisterMap {
    pub gpio: GpioBlock,
    pub timer: TimerBlock,
}

impl PeripheralRegisterMap {
    /// Map the GPIO and timer blocks for the given board.
    ///
    /// Needs read/write access to `/dev/mem` (normally root).
    pub fn open(board: BoardRevision) -> Result<Self> {
        let gpio_base = board.gpio_base();
        let mem = open_dev_mem(gpio_base)?;
        let gpio = GpioBlock {
            block: RegisterBlock::map(&mem, "GPIO", gpio_base)?,
        };
        let timer = TimerBlock {
            block: RegisterBlock::map(&mem, "system timer", board.timer_base())?,
        };
        // The mappings stay valid once the descriptor is closed.
        drop(mem);
        Ok(Self { gpio, timer })
    }
}

fn open_dev_mem(base: u64) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_SYNC)
        .open("/dev/mem")
        .map_err(|source| PortError::HardwareMapping {
            block: "/dev/mem",
            base,
            source,
        })
}
