//! Device handles produced by discovery

use std::fmt;

/// USB metadata of a serial port, when the OS exposes it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct UsbInfo {
    /// USB vendor ID
    pub vid: u16,
    /// USB product ID
    pub pid: u16,
    /// Serial number string
    pub serial_number: Option<String>,
    /// Manufacturer string
    pub manufacturer: Option<String>,
    /// Product string
    pub product: Option<String>,
}

/// One connected serial endpoint
///
/// Equality and hashing cover every field, so two handles for the same
/// port with different baud rates are different devices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceHandle {
    /// Port path (e.g. `/dev/ttyUSB0`, `COM3`)
    pub port: String,
    /// Baud rate used to talk to the device
    pub baud_rate: u32,
    /// USB metadata, if available
    pub usb: Option<UsbInfo>,
    /// Name of the signature the port matched during discovery
    pub signature: Option<String>,
}

impl DeviceHandle {
    /// Create a handle for a port with no metadata
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            usb: None,
            signature: None,
        }
    }

    /// Attach USB metadata
    pub fn with_usb(mut self, usb: UsbInfo) -> Self {
        self.usb = Some(usb);
        self
    }

    /// Record the matched signature name
    pub fn with_signature(mut self, name: impl Into<String>) -> Self {
        self.signature = Some(name.into());
        self
    }

    /// One-line description for listings
    pub fn describe(&self) -> String {
        let mut out = self.port.clone();
        if let Some(usb) = &self.usb {
            out.push_str(&format!(" [{:04X}:{:04X}]", usb.vid, usb.pid));
        }
        if let Some(sig) = &self.signature {
            out.push_str(&format!(" {}", sig));
        } else if let Some(product) = self.usb.as_ref().and_then(|u| u.product.as_deref()) {
            out.push_str(&format!(" {}", product));
        }
        if let Some(serial) = self.usb.as_ref().and_then(|u| u.serial_number.as_deref()) {
            out.push_str(&format!(" (serial {})", serial));
        }
        out
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.port)
    }
}
