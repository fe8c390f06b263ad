//! Seams between the orchestrator and a flashing backend
//!
//! A backend provides three traits:
//!
//! - [`Discoverer`] enumerates connected devices;
//! - [`Connector`] opens an exclusive [`FlashTransport`] for one device;
//! - [`FlashTransport`] exposes the raw primitives (erase, write, read).
//!
//! Every primitive either succeeds completely or fails with a
//! [`TransportError`]. The orchestration policy (ordering, verification,
//! batching) lives on top of these traits and never inside a backend.

use crate::device::DeviceHandle;
use crate::error::TransportError;
use crate::verify::VERIFY_CHUNK_SIZE;

/// Raw flash primitives for one open device
pub trait FlashTransport {
    /// Erase the full addressable flash range
    fn erase(&mut self) -> Result<(), TransportError>;

    /// Write `data` at `offset`
    ///
    /// Returns only after every byte has been acknowledged.
    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), TransportError>;

    /// Read `len` bytes starting at `offset`
    fn read(&mut self, offset: u32, len: usize) -> Result<Vec<u8>, TransportError>;

    /// Flash size in bytes, when the backend knows it
    fn flash_size(&self) -> Option<u32> {
        None
    }

    /// Largest read worth issuing in one call
    ///
    /// Backends with a high fixed cost per read raise this so that a whole
    /// image is read back at once.
    fn max_read_len(&self) -> usize {
        VERIFY_CHUNK_SIZE
    }
}

impl<T: FlashTransport + ?Sized> FlashTransport for &mut T {
    fn erase(&mut self) -> Result<(), TransportError> {
        (**self).erase()
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(offset, data)
    }

    fn read(&mut self, offset: u32, len: usize) -> Result<Vec<u8>, TransportError> {
        (**self).read(offset, len)
    }

    fn flash_size(&self) -> Option<u32> {
        (**self).flash_size()
    }

    fn max_read_len(&self) -> usize {
        (**self).max_read_len()
    }
}

impl<T: FlashTransport + ?Sized> FlashTransport for Box<T> {
    fn erase(&mut self) -> Result<(), TransportError> {
        (**self).erase()
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(offset, data)
    }

    fn read(&mut self, offset: u32, len: usize) -> Result<Vec<u8>, TransportError> {
        (**self).read(offset, len)
    }

    fn flash_size(&self) -> Option<u32> {
        (**self).flash_size()
    }

    fn max_read_len(&self) -> usize {
        (**self).max_read_len()
    }
}

/// Opens transports for discovered devices
///
/// The returned transport borrows the connector, so at most one transport
/// can be open at any time. Dropping it releases the device.
pub trait Connector {
    /// Open the device, failing with [`TransportError::Disconnected`] if it
    /// is no longer reachable
    fn connect<'a>(
        &'a mut self,
        device: &DeviceHandle,
    ) -> Result<Box<dyn FlashTransport + 'a>, TransportError>;
}

impl<C: Connector + ?Sized> Connector for &mut C {
    fn connect<'a>(
        &'a mut self,
        device: &DeviceHandle,
    ) -> Result<Box<dyn FlashTransport + 'a>, TransportError> {
        (**self).connect(device)
    }
}

/// Enumerates connected devices
///
/// Every call reflects the current physical state. Enumeration problems are
/// not errors: implementations log them and return an empty list.
pub trait Discoverer {
    /// List the devices currently connected, in a stable order
    fn discover(&self) -> Vec<DeviceHandle>;
}

/// Fixed list of devices, used when ports are given explicitly
#[derive(Debug, Clone, Default)]
pub struct StaticDiscoverer {
    devices: Vec<DeviceHandle>,
}

impl StaticDiscoverer {
    /// Create a discoverer returning exactly these devices
    pub fn new(devices: Vec<DeviceHandle>) -> Self {
        Self { devices }
    }

    /// Build handles for port paths, sharing one baud rate
    pub fn from_ports<I, S>(ports: I, baud_rate: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut devices: Vec<DeviceHandle> = Vec::new();
        for port in ports {
            let handle = DeviceHandle::new(port, baud_rate);
            if !devices.iter().any(|d| d.port == handle.port) {
                devices.push(handle);
            }
        }
        Self { devices }
    }
}

impl Discoverer for StaticDiscoverer {
    fn discover(&self) -> Vec<DeviceHandle> {
        self.devices.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_discoverer_dedups_ports() {
        let disc = StaticDiscoverer::from_ports(["/dev/ttyUSB1", "/dev/ttyUSB0", "/dev/ttyUSB1"], 921600);
        let devices = disc.discover();
        let ports: Vec<_> = devices.iter().map(|d| d.port.as_str()).collect();
        // Explicit ports keep the operator's order
        assert_eq!(ports, ["/dev/ttyUSB1", "/dev/ttyUSB0"]);
        assert!(devices.iter().all(|d| d.baud_rate == 921600));

        // Restartable: a second call yields the same sequence
        assert_eq!(disc.discover(), devices);
    }

    #[test]
    fn test_static_discoverer_empty() {
        assert!(StaticDiscoverer::default().discover().is_empty());
    }
}
