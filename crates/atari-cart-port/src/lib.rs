//! Atari 2600 cartridge port over Raspberry Pi GPIO.
//!
//! Lets an emulated 2600 run a real cartridge. Every CPU access in the
//! low 8K becomes an electrical bus cycle on a GPIO adapter: the address
//! is latched, data is driven or sampled, and the cycle is held long
//! enough for a ROM to respond. Timing is enforced by a busy-waiting
//! coordinator thread so the CPU core never sleeps mid-access.
//!
//! The cartridge sees all bus traffic, including TIA and RIOT accesses,
//! since some bankswitching schemes watch for them.

pub mod config;
pub mod coordinator;
mod error;
pub mod lines;
mod port;
pub mod registers;
#[cfg(any(test, feature = "test-utils"))]
pub mod sim;

pub use config::{BoardRevision, BusVariant, HoldTime, PortConfig};
pub use coordinator::{CycleCoordinator, CycleFlag, CycleHandshake, Stall};
pub use error::{PortError, Result};
pub use lines::{BusTransaction, Direction, Target};
pub use port::{BusStats, CLAIM_END, CartPort, DEVICE_NAME, HardwarePort, InternalChips, OPEN_BUS, OpenBus};
pub use registers::{FreeRunningCounter, GpioLines, PeripheralRegisterMap};
