//! Port configuration: board revision, bus variant and cycle calibration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PortError, Result};

/// Offset of the GPIO controller from the peripheral base.
pub const GPIO_OFFSET: u64 = 0x0020_0000;

/// Offset of the free-running system timer from the peripheral base.
pub const SYSTEM_TIMER_OFFSET: u64 = 0x3000;

/// SoC generation, which fixes where the peripherals live in physical memory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardRevision {
    /// Pi 1 / Zero.
    Bcm2835,
    /// Pi 2 / 3.
    #[default]
    Bcm2837,
    /// Pi 4.
    Bcm2711,
    /// Anything else: give the peripheral base directly.
    Custom { peripheral_base: u64 },
}

impl BoardRevision {
    /// Physical address of the peripheral window.
    #[must_use]
    pub const fn peripheral_base(self) -> u64 {
        match self {
            Self::Bcm2835 => 0x2000_0000,
            Self::Bcm2837 => 0x3F00_0000,
            Self::Bcm2711 => 0xFE00_0000,
            Self::Custom { peripheral_base } => peripheral_base,
        }
    }

    #[must_use]
    pub const fn gpio_base(self) -> u64 {
        self.peripheral_base() + GPIO_OFFSET
    }

    #[must_use]
    pub const fn timer_base(self) -> u64 {
        self.peripheral_base() + SYSTEM_TIMER_OFFSET
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Bcm2835 => "BCM2835",
            Self::Bcm2837 => "BCM2837",
            Self::Bcm2711 => "BCM2711",
            Self::Custom { .. } => "custom",
        }
    }
}

/// Handshake discipline on the address bus.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusVariant {
    /// No lock line. Address and data change while the cartridge may be
    /// sampling. Kept for adapters built before the lock line existed.
    Unlocked,
    /// GPIO 22 is asserted while the address/data lines are being changed
    /// and released once they are stable.
    #[default]
    Locked,
}

impl BusVariant {
    #[must_use]
    pub const fn uses_lock_line(self) -> bool {
        matches!(self, Self::Locked)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unlocked => "unlocked",
            Self::Locked => "locked",
        }
    }
}

/// How long the coordinator holds each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldTime {
    /// Fixed number of spin-loop iterations. Duration depends on the core
    /// clock, so this needs calibrating per board.
    Spins(u32),
    /// Ticks of the 1 MHz system timer's low counter word.
    TimerTicks(u32),
}

impl Default for HoldTime {
    fn default() -> Self {
        Self::TimerTicks(2)
    }
}

/// Everything needed to bring up a cartridge port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    pub board: BoardRevision,
    pub variant: BusVariant,
    pub hold: HoldTime,
    /// Core to pin the cycle coordinator to. `None` leaves placement to
    /// the scheduler.
    pub cpu_affinity: Option<usize>,
    /// Upper bound on any single wait for the coordinator, in microseconds.
    /// `None` waits forever.
    pub cycle_timeout_us: Option<u64>,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            board: BoardRevision::default(),
            variant: BusVariant::default(),
            hold: HoldTime::default(),
            cpu_affinity: None,
            cycle_timeout_us: Some(100_000),
        }
    }
}

impl PortConfig {
    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    #[must_use]
    pub fn cycle_timeout(&self) -> Option<Duration> {
        self.cycle_timeout_us.map(Duration::from_micros)
    }

    fn validate(&self) -> Result<()> {
        // mmap offsets must be page aligned
        if self.board.peripheral_base() % 4096 != 0 {
            return Err(PortError::Config(format!(
                "peripheral base {:#X} is not page aligned",
                self.board.peripheral_base()
            )));
        }
        if self.cycle_timeout_us == Some(0) {
            return Err(PortError::Config(
                "cycle_timeout_us must be non-zero (omit it to wait forever)".to_string(),
            ));
        }
        Ok(())
    }
}
