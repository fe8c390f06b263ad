//! CLI argument parsing

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fleetflash")]
#[command(author, version, about = "Flash ESP32 firmware onto every connected board", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(flatten)]
    pub flash: FlashArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Backend used to reach the boards
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Serial ports driven through esptool
    #[default]
    Esptool,
    /// In-memory boards, for dry runs
    Dummy,
}

/// Options for a flashing batch
#[derive(Args, Debug, Clone)]
pub struct FlashArgs {
    /// Directory containing bootloader.bin, partitions.bin and firmware.bin
    #[arg(long)]
    pub firmware_dir: Option<PathBuf>,

    /// Only erase the flash, write nothing
    #[arg(long, conflicts_with_all = ["skip_erase", "verify"])]
    pub erase_only: bool,

    /// Read every image back and compare after writing
    #[arg(long)]
    pub verify: bool,

    /// Serial baud rate
    #[arg(long, default_value_t = 115200, value_parser = clap::value_parser!(u32).range(1..))]
    pub baud: u32,

    /// Do not erase before writing
    #[arg(long)]
    pub skip_erase: bool,

    /// Flash exactly these ports instead of discovering boards (repeatable)
    #[arg(short, long)]
    pub port: Vec<String>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Flash layout file (TOML format)
    #[arg(long)]
    pub layout: Option<PathBuf>,

    /// Extra USB signatures (RON format)
    #[arg(long)]
    pub signatures: Option<PathBuf>,

    /// Target chip passed to esptool
    #[arg(long, default_value = "esp32")]
    pub chip: String,

    /// esptool command (e.g. "python3 -m esptool")
    #[arg(long, default_value = "esptool.py")]
    pub esptool: String,

    /// Deadline for a single erase, write or read, in seconds
    #[arg(long, default_value_t = 300)]
    pub timeout: u64,

    /// Pause after erase and write while the board reboots, in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub settle_ms: u64,

    /// Backend used to reach the boards
    #[arg(long, value_enum, default_value_t = Backend::Esptool)]
    pub backend: Backend,

    /// Number of emulated boards with --backend dummy
    #[arg(long, default_value_t = 2)]
    pub dummy_devices: usize,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List serial ports and show which ones would be flashed
    ListPorts {
        /// Extra USB signatures (RON format)
        #[arg(long)]
        signatures: Option<PathBuf>,

        /// Also show ports that would be skipped
        #[arg(short, long)]
        all: bool,
    },
}
