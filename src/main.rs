//! fleetflash - flash ESP32 firmware onto a batch of boards
//!
//! Every connected board is erased, written with the bootloader, partition
//! table and application images, and optionally read back and verified.
//! Boards are processed one at a time; a failing board is reported and the
//! batch moves on to the next one.
//!
//! # Exit codes
//!
//! - `0`: every board succeeded (or the operator declined)
//! - `1`: at least one board failed, or no board was found
//! - `2`: configuration error, reported before any board is touched

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use log::LevelFilter;
use std::process::ExitCode;

/// Log level for the number of `-v` flags
fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG still overrides the verbosity flags
    env_logger::Builder::new()
        .filter_level(log_level(cli.verbose))
        .parse_default_env()
        .init();

    match cli.command {
        Some(Commands::ListPorts { signatures, all }) => {
            match commands::list_ports(signatures.as_deref(), all) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        None => match commands::flash::run(&cli.flash) {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::from(2)
            }
        },
    }
}
