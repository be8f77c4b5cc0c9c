//! Devices that sit on the system bus.

/// An internal chip the system routes accesses to (RIOT, TIA, ...).
///
/// Register decoding is the chip's business: it receives the full CPU
/// address and masks what it needs.
pub trait Peripheral {
    /// Read a register. May have side effects (clearing flags, etc.).
    fn peek(&mut self, address: u16) -> u8;

    /// Write a register.
    fn poke(&mut self, address: u16, value: u8);
}

/// A cartridge plugged into the system.
///
/// Installation happens at construction, so a value of this type is always
/// attached to a system. The remaining hooks are what the host calls over
/// the cartridge's lifetime.
pub trait Cartridge {
    /// Short device name, used in diagnostics.
    fn name(&self) -> &'static str;

    /// Return the device to its power-on state.
    fn reset(&mut self);

    /// Modify cartridge storage in place (debugger patching).
    ///
    /// Returns `false` when the cartridge cannot be patched.
    fn patch(&mut self, address: u16, value: u8) -> bool;

    /// Serialize cartridge state. Returns `false` if unsupported or failed.
    fn save(&self, out: &mut dyn std::io::Write) -> bool;

    /// Restore cartridge state. Returns `false` if unsupported or failed.
    fn load(&mut self, input: &mut dyn std::io::Read) -> bool;
}
