//! Bus transaction dispatcher.
//!
//! Every CPU access in `$0000-$1FFF` lands here. Cartridge-window accesses
//! become real bus cycles on the adapter. Everything else is served by the
//! internal RIOT/TIA, and the resulting address and data are still put on
//! the adapter's lines, because bankswitching logic on the cartridge may
//! watch all bus traffic.
//!
//! # Turnaround
//!
//! The data lines are shared. Switching who drives them costs one wait for
//! the in-flight cycle; accesses in the same direction as the previous one
//! start straight away.
//!
//! | Previous | Next  | Wait before latching |
//! |----------|-------|----------------------|
//! | read     | read  | none                 |
//! | write    | write | none                 |
//! | read     | write | one                  |
//! | write    | read  | one                  |

use emu_core::{Bus, Cartridge, Observable, PAGE_SIZE, PageAccess, PageAccessType, Peripheral, System, Value};

use crate::config::{BoardRevision, BusVariant, PortConfig};
use crate::coordinator::{CycleCoordinator, CycleHandshake, Stall};
use crate::error::{PortError, Result};
use crate::lines::{BusTransaction, DIRECTION_BIT, Direction, LOCK_BIT, Target, decode_data, pin_modes};
use crate::registers::{GpioBlock, GpioLines, PeripheralRegisterMap};

/// Name the port registers its pages under.
pub const DEVICE_NAME: &str = "CartridgePort";

/// End of the address range the port claims from the host.
pub const CLAIM_END: u16 = 0x2000;

/// Returned by `peek` when the bus could not be read.
pub const OPEN_BUS: u8 = 0xFF;

/// The chips that answer for addresses outside the cartridge window.
pub struct InternalChips {
    /// 6532 RIOT (A7 set).
    pub riot: Box<dyn Peripheral>,
    /// TIA (A7 clear).
    pub tia: Box<dyn Peripheral>,
}

impl InternalChips {
    fn owner(&mut self, target: Target) -> Option<&mut dyn Peripheral> {
        match target {
            Target::Riot => Some(self.riot.as_mut()),
            Target::Tia => Some(self.tia.as_mut()),
            Target::Cartridge => None,
        }
    }
}

/// Stand-in chip for when the port runs without an emulator around it.
pub struct OpenBus;

impl Peripheral for OpenBus {
    fn peek(&mut self, _address: u16) -> u8 {
        OPEN_BUS
    }

    fn poke(&mut self, _address: u16, _value: u8) {}
}

/// Running totals kept by the dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Bus cycles started on the adapter.
    pub transactions: u64,
    /// Direction changes, each of which waited for the previous cycle.
    pub turnaround_waits: u64,
}

/// The cartridge port.
///
/// Generic over the GPIO block and the cycle handshake so the protocol can
/// run against simulated hardware. [`HardwarePort`] is the real thing.
pub struct CartPort<G: GpioLines, H: CycleHandshake> {
    gpio: G,
    handshake: H,
    chips: InternalChips,
    board: BoardRevision,
    variant: BusVariant,
    last_direction: Direction,
    last_address: u16,
    stats: BusStats,
}

/// A port driving a real adapter through `/dev/mem`.
pub type HardwarePort = CartPort<GpioBlock, CycleCoordinator>;

impl HardwarePort {
    /// Bring up the adapter and attach it to `system`.
    ///
    /// Maps the register blocks, starts the cycle coordinator, puts the
    /// lines in read mode and claims `$0000-$1FFF`. Call once per port.
    pub fn install(
        system: &mut dyn System,
        config: &PortConfig,
        chips: InternalChips,
    ) -> Result<Self> {
        let PeripheralRegisterMap { gpio, timer } = PeripheralRegisterMap::open(config.board)?;
        let coordinator = CycleCoordinator::start(
            config.hold,
            Box::new(timer),
            config.cpu_affinity,
            config.cycle_timeout(),
        )?;
        let port = Self::with_parts(system, config, gpio, coordinator, chips);
        log::info!(
            "cartridge port installed on {} ({} bus)",
            config.board.label(),
            config.variant.label()
        );
        Ok(port)
    }
}

impl<G: GpioLines> CartPort<G, CycleCoordinator> {
    /// True while the cycle coordinator thread is alive.
    #[must_use]
    pub fn coordinator_running(&self) -> bool {
        self.handshake.is_running()
    }

    /// Stop the cycle coordinator ahead of dropping the port.
    ///
    /// Any later access that has to wait for a cycle fails with
    /// [`PortError::CoordinatorStopped`].
    pub fn shutdown(&mut self) -> Option<u64> {
        self.handshake.stop()
    }
}

impl<G: GpioLines, H: CycleHandshake> CartPort<G, H> {
    /// Assemble a port from already-opened parts and attach it to `system`.
    pub fn with_parts(
        system: &mut dyn System,
        config: &PortConfig,
        gpio: G,
        handshake: H,
        chips: InternalChips,
    ) -> Self {
        let access = PageAccess {
            device: DEVICE_NAME,
            access: PageAccessType::ReadWrite,
        };
        for address in (0..CLAIM_END).step_by(usize::from(PAGE_SIZE)) {
            system.set_page_access(address, access);
        }

        let mut port = Self {
            gpio,
            handshake,
            chips,
            board: config.board,
            variant: config.variant,
            last_direction: Direction::Read,
            last_address: 0,
            stats: BusStats::default(),
        };
        port.configure_lines();
        port
    }

    /// Read a byte, running a bus cycle on the adapter.
    pub fn try_peek(&mut self, address: u16) -> Result<u8> {
        let target = Target::of(address);
        if target == Target::Cartridge {
            return self.read_cycle(address);
        }
        let value = self.chips.owner(target).map_or(OPEN_BUS, |chip| chip.peek(address));
        self.write_cycle(address, value)?;
        Ok(value)
    }

    /// Write a byte, running a bus cycle on the adapter.
    ///
    /// Internal chips get the write even if the adapter cycle fails.
    pub fn try_poke(&mut self, address: u16, value: u8) -> Result<()> {
        let cycle = self.write_cycle(address, value);
        if let Some(chip) = self.chips.owner(Target::of(address)) {
            chip.poke(address, value);
        }
        cycle
    }

    /// Read a byte. A stalled bus is logged and reads as [`OPEN_BUS`].
    pub fn peek(&mut self, address: u16) -> u8 {
        self.try_peek(address).unwrap_or_else(|err| {
            log::error!("peek {address:#06X}: {err}");
            OPEN_BUS
        })
    }

    /// Write a byte. Returns `false` only if the bus stalled.
    pub fn poke(&mut self, address: u16, value: u8) -> bool {
        match self.try_poke(address, value) {
            Ok(()) => true,
            Err(err) => {
                log::error!("poke {address:#06X} = {value:#04X}: {err}");
                false
            }
        }
    }

    #[must_use]
    pub fn last_direction(&self) -> Direction {
        self.last_direction
    }

    #[must_use]
    pub fn last_address(&self) -> u16 {
        self.last_address
    }

    #[must_use]
    pub fn stats(&self) -> BusStats {
        self.stats
    }

    #[must_use]
    pub fn variant(&self) -> BusVariant {
        self.variant
    }

    #[must_use]
    pub fn gpio(&self) -> &G {
        &self.gpio
    }

    #[must_use]
    pub fn handshake(&self) -> &H {
        &self.handshake
    }

    /// One-line summary for debugger panels.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "Real cartridge on {} GPIO, {} bus (adapter by Al Nafuur); last {} at {:#06X}",
            self.board.label(),
            self.variant.label(),
            self.last_direction.label(),
            self.last_address,
        )
    }

    /// Address and direction lines out, data lines in, nothing locked.
    fn configure_lines(&mut self) {
        self.set_pin_modes(Direction::Read);
        let mut released = DIRECTION_BIT;
        if self.variant.uses_lock_line() {
            released |= LOCK_BIT;
        }
        self.gpio.clear_bits(released);
        log::debug!("adapter lines configured for read ({} bus)", self.variant.label());
    }

    fn set_pin_modes(&mut self, direction: Direction) {
        for (bank, word) in pin_modes(direction, self.variant).into_iter().enumerate() {
            self.gpio.set_function_select(bank, word);
        }
    }

    fn lock(&mut self) {
        if self.variant.uses_lock_line() {
            self.gpio.set_bits(LOCK_BIT);
        }
    }

    fn unlock(&mut self) {
        if self.variant.uses_lock_line() {
            self.gpio.clear_bits(LOCK_BIT);
        }
    }

    fn wait(&self, address: u16) -> Result<()> {
        self.handshake
            .wait_for_cycle_end()
            .map_err(|stall| match stall {
                Stall::Timeout(waited) => PortError::CycleTimeout { address, waited },
                Stall::Stopped => PortError::CoordinatorStopped,
            })
    }

    /// Hand the data lines to the other side once the current cycle ends.
    ///
    /// The level shifter only ever points away from whoever is about to
    /// stop driving: into the Pi before its pins become outputs, and away
    /// from the Pi only after its pins are inputs.
    fn turn_around(&mut self, to: Direction, address: u16) -> Result<()> {
        self.wait(address)?;
        self.stats.turnaround_waits += 1;
        match to {
            Direction::Write => {
                self.gpio.set_bits(DIRECTION_BIT);
                self.set_pin_modes(Direction::Write);
            }
            Direction::Read => {
                self.set_pin_modes(Direction::Read);
                self.gpio.clear_bits(DIRECTION_BIT);
            }
        }
        Ok(())
    }

    /// Lock, turn around if needed, latch, unlock, start the cycle.
    fn start_cycle(&mut self, txn: BusTransaction, address: u16) -> Result<()> {
        self.lock();
        if self.last_direction != txn.direction {
            if let Err(err) = self.turn_around(txn.direction, address) {
                self.unlock();
                return Err(err);
            }
        }
        self.gpio.drive(txn.mask(), txn.word());
        self.unlock();
        self.handshake.begin_cycle();

        self.last_direction = txn.direction;
        self.last_address = address;
        self.stats.transactions += 1;
        log::trace!("{} {address:#06X}", txn.direction.label());
        Ok(())
    }

    /// Put an address and data byte on the bus. Does not wait for the hold:
    /// whatever uses the bus next does.
    fn write_cycle(&mut self, address: u16, value: u8) -> Result<()> {
        self.start_cycle(BusTransaction::write(address, value), address)
    }

    /// Put an address on the bus, hold, and sample what the cartridge drives.
    fn read_cycle(&mut self, address: u16) -> Result<u8> {
        self.start_cycle(BusTransaction::read(address), address)?;
        self.wait(address)?;
        Ok(decode_data(self.gpio.read()))
    }
}

impl<G: GpioLines, H: CycleHandshake> Bus for CartPort<G, H> {
    fn read(&mut self, address: u16) -> u8 {
        self.peek(address)
    }

    fn write(&mut self, address: u16, value: u8) {
        self.poke(address, value);
    }
}

impl<G: GpioLines, H: CycleHandshake> Cartridge for CartPort<G, H> {
    fn name(&self) -> &'static str {
        DEVICE_NAME
    }

    fn reset(&mut self) {
        // The cartridge resets itself on power-up; nothing to do here.
        log::debug!("cartridge port reset");
    }

    fn patch(&mut self, address: u16, value: u8) -> bool {
        log::warn!("cannot patch {address:#06X} = {value:#04X}: cartridge is real hardware");
        false
    }

    fn save(&self, _out: &mut dyn std::io::Write) -> bool {
        log::warn!("cartridge port state cannot be saved");
        false
    }

    fn load(&mut self, _input: &mut dyn std::io::Read) -> bool {
        log::warn!("cartridge port state cannot be loaded");
        false
    }
}

const QUERY_PATHS: &[&str] = &[
    "bus.last_address",
    "bus.last_direction",
    "bus.transactions",
    "bus.turnaround_waits",
    "config.board",
    "config.variant",
];

impl<G: GpioLines, H: CycleHandshake> Observable for CartPort<G, H> {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "bus.last_address" => Some(self.last_address.into()),
            "bus.last_direction" => Some(self.last_direction.label().into()),
            "bus.transactions" => Some(self.stats.transactions.into()),
            "bus.turnaround_waits" => Some(self.stats.turnaround_waits.into()),
            "config.board" => Some(self.board.label().into()),
            "config.variant" => Some(self.variant.label().into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}
