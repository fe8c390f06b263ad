//! fleetflash-core - sequential multi-device firmware flashing
//!
//! This crate holds everything that does not depend on a particular
//! flashing backend: the data model, the seams a backend implements, and the
//! policy that sits on top of them.
//!
//! ```text
//! Discoverer ──► Orchestrator ──► Connector::connect ──► FlashTransport
//!                    │                                      ▲
//!                    ├── sequencer::run  (erase, write...) ─┤
//!                    └── verify::verify  (read back)  ──────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use fleetflash_core::{FirmwareSet, FlashConfig, FlashLayout, NoProgress, Orchestrator};
//!
//! let images = FirmwareSet::load_dir("build".as_ref(), &FlashLayout::default())?;
//! let mut orchestrator = Orchestrator::new(connector, FlashConfig::default());
//! let report = orchestrator.run_batch(discoverer.discover(), &images, &mut NoProgress);
//! assert!(report.all_succeeded());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod batch;
pub mod config;
pub mod device;
pub mod error;
pub mod image;
pub mod job;
pub mod layout;
pub mod progress;
pub mod sequencer;
pub mod signature;
pub mod transport;
pub mod verify;

pub use batch::{BatchReport, Orchestrator};
pub use config::FlashConfig;
pub use device::{DeviceHandle, UsbInfo};
pub use error::{ConfigError, TransportError};
pub use image::{FirmwareImage, FirmwareSet, ImageKind};
pub use job::{Failure, FlashJob, JobFlags, JobResult, JobStatus, Mismatch, Step};
pub use layout::FlashLayout;
pub use progress::{BatchObserver, NoProgress};
pub use signature::{DeviceSignature, SignatureDb};
pub use transport::{Connector, Discoverer, FlashTransport, StaticDiscoverer};
