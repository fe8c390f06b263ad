//! Error types for fleetflash-core
//!
//! Two families of errors exist. [`ConfigError`] is fatal to a whole run and
//! is always raised before any device is touched. [`TransportError`] is what
//! a backend reports for a single primitive on a single device; the
//! sequencer and verifier turn it into a per-device
//! [`JobStatus`](crate::job::JobStatus) instead of propagating it.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Configuration errors, reported before any device interaction
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No firmware directory was given and the run is not erase-only
    #[error("firmware directory not specified (use --firmware-dir PATH, or --erase-only to only erase)")]
    MissingFirmwareDir,

    /// The firmware directory does not exist
    #[error("firmware directory not found: {}", .0.display())]
    FirmwareDirNotFound(PathBuf),

    /// The firmware path exists but is not a directory
    #[error("firmware path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// A required image file is missing from the firmware directory
    #[error("{file} not found in {}", .dir.display())]
    MissingImage {
        /// Expected file name
        file: &'static str,
        /// Directory that was searched
        dir: PathBuf,
    },

    /// A required image file exists but contains no data
    #[error("{} is empty", .0.display())]
    EmptyImage(PathBuf),

    /// Reading a file failed
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Two images would overlap in flash
    #[error("{first} (0x{first_start:08X}..0x{first_end:08X}) overlaps {second} (starts at 0x{second_start:08X})")]
    OverlappingImages {
        /// Name of the lower image
        first: &'static str,
        /// Start of the lower image
        first_start: u32,
        /// End (exclusive) of the lower image
        first_end: u64,
        /// Name of the higher image
        second: &'static str,
        /// Start of the higher image
        second_start: u32,
    },

    /// Image offsets are not strictly increasing in write order
    #[error("layout offsets must increase in write order: {0}")]
    UnorderedLayout(String),

    /// An image runs past the 32-bit address space
    #[error("{image} at 0x{offset:08X} ends at 0x{end:X}, past the 32-bit address space")]
    BeyondAddressSpace {
        /// Image name
        image: &'static str,
        /// Start of the image
        offset: u32,
        /// End (exclusive) of the image
        end: u64,
    },

    /// An image does not fit into the flash size declared by the layout
    #[error("{image} ends at 0x{end:08X}, beyond the {flash_size} byte flash")]
    ImageTooLarge {
        /// Image name
        image: &'static str,
        /// End (exclusive) of the image
        end: u64,
        /// Declared flash size
        flash_size: u32,
    },

    /// A layout file could not be parsed
    #[error("invalid layout file: {0}")]
    Layout(String),

    /// A signature file could not be parsed
    #[error("invalid signature file: {0}")]
    Signature(String),

    /// Two flags that cannot be combined were both given
    #[error("conflicting options: {0}")]
    ConflictingFlags(&'static str),

    /// The baud rate is unusable
    #[error("invalid baud rate: {0}")]
    InvalidBaudRate(u32),
}

/// Errors reported by a flashing backend for a single primitive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The device did not answer within the step deadline
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The device could not be reached or went away
    #[error("device disconnected: {0}")]
    Disconnected(String),

    /// The device or tool reported that written data does not match
    #[error("checksum mismatch: {0}")]
    ChecksumMismatch(String),

    /// The device or tool rejected the operation
    #[error("operation rejected: {0}")]
    Rejected(String),

    /// The requested range lies outside the device's flash
    #[error("address 0x{addr:08X}+{len} out of bounds")]
    OutOfBounds {
        /// Start address
        addr: u32,
        /// Length in bytes
        len: usize,
    },

    /// Local I/O failure (tool missing, temporary file not writable, ...)
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e.to_string())
    }
}

impl TransportError {
    /// Whether this error means the device itself is gone
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TransportError::Disconnected(_))
    }
}
