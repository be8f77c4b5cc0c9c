//! Error type for the cartridge port.

use std::io;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PortError>;

#[derive(Debug, Error)]
pub enum PortError {
    /// `/dev/mem` could not be opened or a register block could not be
    /// mapped. The port cannot run without real register access.
    #[error("cannot map {block} registers at {base:#X}: {source}")]
    HardwareMapping {
        block: &'static str,
        base: u64,
        #[source]
        source: io::Error,
    },
    #[error("cannot start cycle coordinator: {0}")]
    Spawn(#[source] io::Error),
    /// The coordinator did not end the cycle within the configured bound.
    #[error("bus cycle for {address:#06X} still active after {waited:?}")]
    CycleTimeout { address: u16, waited: Duration },
    /// The coordinator thread has exited; no cycle will ever end.
    #[error("cycle coordinator is no longer running")]
    CoordinatorStopped,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}
