//! Core traits shared by the emulator and its hardware bridges.
//!
//! The CPU talks to a `Bus`; devices claim address pages through `System`;
//! everything a debugger wants to see goes through `Observable`.

mod bus;
mod device;
mod observable;
mod page;

pub use bus::Bus;
pub use device::{Cartridge, Peripheral};
pub use observable::{Observable, Value};
pub use page::{NUM_PAGES, PAGE_SHIFT, PAGE_SIZE, PageAccess, PageAccessType, PageTable, System};
