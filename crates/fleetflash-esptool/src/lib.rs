//! fleetflash-esptool - serial backend for fleetflash
//!
//! Discovery enumerates serial ports with `serialport` and keeps the ones
//! that look like ESP32 boards. Flashing delegates every primitive to the
//! `esptool` command line tool, one invocation per primitive.
//!
//! # Example
//!
//! ```ignore
//! use fleetflash_core::{Discoverer, SignatureDb};
//! use fleetflash_esptool::{Esptool, EsptoolConnector, EsptoolOptions, SerialDiscoverer};
//!
//! let devices = SerialDiscoverer::new(SignatureDb::builtin(), 115200).discover();
//! let connector = EsptoolConnector::new(Esptool::new(EsptoolOptions::default()));
//! ```

#![warn(missing_docs)]

pub mod discover;
pub mod error;
pub mod tool;
pub mod transport;

pub use discover::{looks_like_usb_serial, select_ports, SerialDiscoverer};
pub use error::EsptoolError;
pub use tool::{classify_failure, Esptool, EsptoolCommand, EsptoolOptions, DEFAULT_SETTLE};
pub use transport::{probe_port, EsptoolConnector, EsptoolTransport};
