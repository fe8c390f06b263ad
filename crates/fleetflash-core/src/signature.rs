//! USB signatures of known flashable boards
//!
//! Discovery keeps a serial port only if its USB vendor/product ID matches
//! one of these signatures. The built-in list covers the USB-UART bridges
//! found on common ESP32 boards; more can be loaded from a RON file:
//!
//! ```ron
//! (
//!     signatures: [
//!         (name: "CP2102N", vid: 0x10C4, pid: 0xEA60),
//!     ],
//! )
//! ```

use std::fs;
use std::path::Path;

use crate::error::ConfigError;

/// A USB vendor/product pair identifying a supported adapter
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct DeviceSignature {
    /// Display name
    pub name: String,
    /// USB vendor ID
    pub vid: u16,
    /// USB product ID
    pub pid: u16,
}

impl DeviceSignature {
    /// Create a new signature
    pub fn new(name: impl Into<String>, vid: u16, pid: u16) -> Self {
        Self {
            name: name.into(),
            vid,
            pid,
        }
    }

    /// Whether this signature matches the given IDs
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }
}

const BUILTIN: &[(&str, u16, u16)] = &[
    ("Silicon Labs CP210x", 0x10C4, 0xEA60),
    ("WCH CH340", 0x1A86, 0x7523),
    ("WCH CH9102", 0x1A86, 0x55D4),
    ("FTDI FT232R", 0x0403, 0x6001),
    ("Espressif USB-JTAG/serial", 0x303A, 0x1001),
];

#[derive(Debug, serde::Deserialize)]
struct SignatureFile {
    signatures: Vec<DeviceSignature>,
}

/// Collection of known signatures
#[derive(Debug, Clone, Default)]
pub struct SignatureDb {
    signatures: Vec<DeviceSignature>,
}

impl SignatureDb {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a database holding the built-in signatures
    pub fn builtin() -> Self {
        Self {
            signatures: BUILTIN
                .iter()
                .map(|&(name, vid, pid)| DeviceSignature::new(name, vid, pid))
                .collect(),
        }
    }

    /// Load signatures from a RON file, returning how many were added
    pub fn load_file(&mut self, path: &Path) -> Result<usize, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_ron(&content)
    }

    /// Load signatures from a RON string, returning how many were added
    pub fn load_ron(&mut self, content: &str) -> Result<usize, ConfigError> {
        let file: SignatureFile =
            ron::from_str(content).map_err(|e| ConfigError::Signature(e.to_string()))?;
        let count = file.signatures.len();
        for sig in file.signatures {
            self.add(sig);
        }
        Ok(count)
    }

    /// Add a signature, replacing an existing one with the same IDs
    pub fn add(&mut self, sig: DeviceSignature) {
        if let Some(existing) = self
            .signatures
            .iter_mut()
            .find(|s| s.matches(sig.vid, sig.pid))
        {
            *existing = sig;
        } else {
            self.signatures.push(sig);
        }
    }

    /// Find the signature matching a VID/PID pair
    pub fn find(&self, vid: u16, pid: u16) -> Option<&DeviceSignature> {
        self.signatures.iter().find(|s| s.matches(vid, pid))
    }

    /// All signatures
    pub fn iter(&self) -> impl Iterator<Item = &DeviceSignature> {
        self.signatures.iter()
    }

    /// Number of signatures
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Whether the database is empty
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}
