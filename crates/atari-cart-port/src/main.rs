//! Cartridge port probe.
//!
//! Talks to a cartridge on real hardware without an emulator: read single
//! bytes, write bankswitch hotspots, or dump a range. Needs root for
//! `/dev/mem`.

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::process;

use atari_cart_port::{
    BoardRevision, BusVariant, HardwarePort, InternalChips, OpenBus, PortConfig,
};
use clap::{Parser, Subcommand, ValueEnum};
use emu_core::PageTable;

/// One past the last CPU address.
const ADDRESS_SPACE: u32 = 0x1_0000;

#[derive(Parser)]
#[command(name = "cartport-probe", about = "Read and write a real 2600 cartridge over GPIO")]
struct Cli {
    /// JSON port configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured board revision.
    #[arg(long, value_enum)]
    board: Option<BoardArg>,

    /// Adapter without the GPIO 22 lock line.
    #[arg(long)]
    unlocked: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum BoardArg {
    Bcm2835,
    Bcm2837,
    Bcm2711,
}

impl From<BoardArg> for BoardRevision {
    fn from(arg: BoardArg) -> Self {
        match arg {
            BoardArg::Bcm2835 => Self::Bcm2835,
            BoardArg::Bcm2837 => Self::Bcm2837,
            BoardArg::Bcm2711 => Self::Bcm2711,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Read one byte.
    Peek {
        #[arg(value_parser = parse_hex_u16)]
        address: u16,
    },
    /// Write one byte.
    Poke {
        #[arg(value_parser = parse_hex_u16)]
        address: u16,
        #[arg(value_parser = parse_hex_u8)]
        value: u8,
    },
    /// Hex dump a range.
    Dump {
        #[arg(value_parser = parse_hex_u16, default_value = "1000")]
        start: u16,
        #[arg(value_parser = parse_hex_u16, default_value = "1000")]
        len: u16,
    },
}

/// Accepts `1FF8`, `$1FF8` or `0x1FF8`.
fn parse_hex_u16(text: &str) -> Result<u16, String> {
    let digits = text
        .strip_prefix('$')
        .or_else(|| text.strip_prefix("0x"))
        .unwrap_or(text);
    u16::from_str_radix(digits, 16).map_err(|e| format!("bad hex value {text:?}: {e}"))
}

fn parse_hex_u8(text: &str) -> Result<u8, String> {
    let wide = parse_hex_u16(text)?;
    u8::try_from(wide).map_err(|_| format!("{text:?} does not fit in a byte"))
}

fn build_config(cli: &Cli) -> Result<PortConfig, String> {
    let mut config = match &cli.config {
        Some(path) => PortConfig::load(path).map_err(|e| format!("{}: {e}", path.display()))?,
        None => PortConfig::default(),
    };
    if let Some(board) = cli.board {
        config.board = board.into();
    }
    if cli.unlocked {
        config.variant = BusVariant::Unlocked;
    }
    Ok(config)
}

/// Rows of up to 16 addresses covering `start..start + len`, stopping at
/// `$FFFF` rather than wrapping into the TIA.
fn dump_rows(start: u16, len: u16) -> Vec<RangeInclusive<u16>> {
    let end = (u32::from(start) + u32::from(len)).min(ADDRESS_SPACE);
    if end - u32::from(start) < u32::from(len) {
        log::warn!("dump of {len:#X} bytes from ${start:04X} truncated at $FFFF");
    }
    (u32::from(start)..end)
        .step_by(16)
        .map(|row| row as u16..=((row + 16).min(end) - 1) as u16)
        .collect()
}

fn dump(port: &mut HardwarePort, start: u16, len: u16) {
    for row in dump_rows(start, len) {
        let first = *row.start();
        let bytes: Vec<String> = row.map(|addr| format!("{:02X}", port.peek(addr))).collect();
        println!("${first:04X}: {}", bytes.join(" "));
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = build_config(cli)?;
    let mut system = PageTable::new();
    let chips = InternalChips {
        riot: Box::new(OpenBus),
        tia: Box::new(OpenBus),
    };
    let mut port =
        HardwarePort::install(&mut system, &config, chips).map_err(|e| e.to_string())?;

    match cli.command {
        Command::Peek { address } => {
            let value = port.try_peek(address).map_err(|e| e.to_string())?;
            println!("${address:04X}: {value:02X}");
        }
        Command::Poke { address, value } => {
            port.try_poke(address, value).map_err(|e| e.to_string())?;
            println!("${address:04X} <- {value:02X}");
        }
        Command::Dump { start, len } => dump(&mut port, start, len),
    }

    log::info!("{}", port.describe());
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("cartport-probe: {e}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_prefixes() {
        assert_eq!(parse_hex_u16("1FF8"), Ok(0x1FF8));
        assert_eq!(parse_hex_u16("$1ff9"), Ok(0x1FF9));
        assert_eq!(parse_hex_u16("0x1000"), Ok(0x1000));
        assert!(parse_hex_u16("xyz").is_err());
        assert_eq!(parse_hex_u8("$AB"), Ok(0xAB));
        assert!(parse_hex_u8("100").is_err());
    }

    #[test]
    fn dump_rows_are_sixteen_wide() {
        let expected: Vec<RangeInclusive<u16>> = vec![0x1000..=0x100F, 0x1010..=0x101F, 0x1020..=0x1023];
        assert_eq!(dump_rows(0x1000, 0x24), expected);
        assert!(dump_rows(0x1000, 0).is_empty());
    }

    #[test]
    fn dump_stops_at_top_of_memory() {
        let top: Vec<RangeInclusive<u16>> = vec![0xFFF0..=0xFFFF];
        assert_eq!(dump_rows(0xFFF0, 0x100), top);
        let last: Vec<RangeInclusive<u16>> = vec![0xFFFF..=0xFFFF];
        assert_eq!(dump_rows(0xFFFF, 0xFFFF), last);
    }

    #[test]
    fn cli_overrides_config() {
        let cli = Cli::parse_from(["cartport-probe", "--board", "bcm2711", "--unlocked", "peek", "$1FF8"]);
        let config = build_config(&cli).expect("config");
        assert_eq!(config.board, BoardRevision::Bcm2711);
        assert_eq!(config.variant, BusVariant::Unlocked);
        assert!(matches!(cli.command, Command::Peek { address: 0x1FF8 }));
    }
}
