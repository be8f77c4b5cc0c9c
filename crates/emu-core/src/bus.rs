//! Memory and I/O bus interface.

/// Memory and I/O bus interface.
///
/// The CPU core reaches memory and peripherals through this trait. The
/// implementor handles address decoding and routing, and may turn an access
/// into a physical bus transaction as a side effect.
pub trait Bus {
    /// Read a byte from the given address.
    fn read(&mut self, address: u16) -> u8;

    /// Write a byte to the given address.
    fn write(&mut self, address: u16, value: u8);
}
