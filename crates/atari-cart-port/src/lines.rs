//! Bus line codec.
//!
//! The cartridge adapter wires the 2600 bus straight onto GPIO 0-22 of the
//! Pi, so one 32-bit GPIO word carries the whole bus state:
//!
//! | GPIO  | Signal                                          |
//! |-------|-------------------------------------------------|
//! | 0-12  | A0-A12                                          |
//! | 13-20 | D0-D7                                           |
//! | 21    | Level-shifter direction (1 = Pi drives data)    |
//! | 22    | Address lock (1 = lines changing, do not sample) |
//!
//! GPIO 22 is only wired on locked-variant adapters.

use crate::config::BusVariant;

/// Width of the address field.
pub const ADDRESS_BITS: u32 = 13;
/// A0-A12.
pub const ADDRESS_MASK: u32 = (1 << ADDRESS_BITS) - 1;
/// Bit offset of D0.
pub const DATA_SHIFT: u32 = 13;
/// D0-D7.
pub const DATA_MASK: u32 = 0xFF << DATA_SHIFT;
/// Level-shifter direction control.
pub const DIRECTION_BIT: u32 = 1 << 21;
/// Address lock control.
pub const LOCK_BIT: u32 = 1 << 22;

/// Lines rewritten when latching a write-style transaction.
pub const WRITE_LATCH_MASK: u32 = ADDRESS_MASK | DATA_MASK | DIRECTION_BIT;
/// Lines rewritten when latching an address to read from.
pub const READ_LATCH_MASK: u32 = ADDRESS_MASK;

/// A12: the cartridge's chip select.
pub const CART_SELECT: u16 = 0x1000;
/// A7 splits the non-cartridge space between RIOT (set) and TIA (clear).
pub const RIOT_SELECT: u16 = 0x0080;
/// Offset within the 4K cartridge window.
pub const CART_OFFSET_MASK: u16 = 0x0FFF;

/// Which device an address decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Cartridge,
    Riot,
    Tia,
}

impl Target {
    #[must_use]
    pub const fn of(address: u16) -> Self {
        if address & CART_SELECT != 0 {
            Self::Cartridge
        } else if address & RIOT_SELECT != 0 {
            Self::Riot
        } else {
            Self::Tia
        }
    }
}

/// Who drives the shared data lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Cartridge drives, Pi samples.
    Read,
    /// Pi drives, cartridge samples.
    Write,
}

impl Direction {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// One bus exercise, built per access and dropped when it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusTransaction {
    /// A0-A12.
    pub address: u16,
    pub direction: Direction,
    /// Ignored for reads.
    pub data: u8,
}

impl BusTransaction {
    #[must_use]
    pub const fn read(address: u16) -> Self {
        Self {
            address: address & ADDRESS_MASK as u16,
            direction: Direction::Read,
            data: 0,
        }
    }

    #[must_use]
    pub const fn write(address: u16, data: u8) -> Self {
        Self {
            address: address & ADDRESS_MASK as u16,
            direction: Direction::Write,
            data,
        }
    }

    /// GPIO levels to drive for this transaction.
    #[must_use]
    pub const fn word(&self) -> u32 {
        match self.direction {
            Direction::Read => address_only(self.address),
            Direction::Write => encode(self.address, self.data),
        }
    }

    /// Lines the transaction owns.
    #[must_use]
    pub const fn mask(&self) -> u32 {
        match self.direction {
            Direction::Read => READ_LATCH_MASK,
            Direction::Write => WRITE_LATCH_MASK,
        }
    }
}

/// Address and data packed together, with the direction line asserted so
/// the level shifter passes the Pi's data through to the cartridge.
#[must_use]
pub const fn encode(address: u16, data: u8) -> u32 {
    address_only(address) | ((data as u32) << DATA_SHIFT) | DIRECTION_BIT
}

/// Address field only.
#[must_use]
pub const fn address_only(address: u16) -> u32 {
    address as u32 & ADDRESS_MASK
}

/// Pull D0-D7 out of a sampled level word.
#[must_use]
pub const fn decode_data(word: u32) -> u8 {
    ((word & DATA_MASK) >> DATA_SHIFT) as u8
}

/// Pull A0-A12 out of a level word.
#[must_use]
pub const fn decode_address(word: u32) -> u16 {
    (word & ADDRESS_MASK) as u16
}

/// Function-select register bank count covering GPIO 0-29.
pub const FSEL_BANKS: usize = 3;

/// Function-select value for one 10-pin bank: 0b001 (output) for each pin
/// in `outputs`, 0b000 (input) otherwise.
#[must_use]
pub const fn function_select(outputs: u32, bank: usize) -> u32 {
    let mut word = 0;
    let mut slot = 0;
    while slot < 10 {
        let pin = bank * 10 + slot;
        if pin < 32 && outputs & (1 << pin) != 0 {
            word |= 0b001 << (slot * 3);
        }
        slot += 1;
    }
    word
}

/// GPIO pins the Pi drives in the given direction.
#[must_use]
pub const fn output_pins(direction: Direction, variant: BusVariant) -> u32 {
    let mut pins = ADDRESS_MASK | DIRECTION_BIT;
    if variant.uses_lock_line() {
        pins |= LOCK_BIT;
    }
    if matches!(direction, Direction::Write) {
        pins |= DATA_MASK;
    }
    pins
}

/// Function-select words for GPFSEL0-2.
#[must_use]
pub const fn pin_modes(direction: Direction, variant: BusVariant) -> [u32; FSEL_BANKS] {
    let outputs = output_pins(direction, variant);
    [
        function_select(outputs, 0),
        function_select(outputs, 1),
        function_select(outputs, 2),
    ]
}
