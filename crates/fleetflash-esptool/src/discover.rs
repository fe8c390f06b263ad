//! Serial port discovery
//!
//! Ports that carry USB metadata are matched against the signature database.
//! Ports without it fall back to a name check, since some platforms do not
//! report the USB IDs of every adapter.

use fleetflash_core::{DeviceHandle, Discoverer, SignatureDb, UsbInfo};
use serialport::{SerialPortInfo, SerialPortType};

use crate::error::EsptoolError;

/// Port name prefixes of USB serial adapters on Linux and macOS
const USB_SERIAL_PREFIXES: &[&str] = &[
    "/dev/ttyUSB",
    "/dev/ttyACM",
    "/dev/cu.usbserial",
    "/dev/tty.usbserial",
    "/dev/cu.SLAB",
    "/dev/cu.wchusbserial",
];

/// Whether a port name looks like a USB serial adapter on this platform
///
/// Windows names every port `COMn`, so every port qualifies there.
pub fn looks_like_usb_serial(port_name: &str) -> bool {
    if cfg!(windows) {
        return true;
    }
    USB_SERIAL_PREFIXES
        .iter()
        .any(|prefix| port_name.starts_with(prefix))
}

/// Pick flashable boards out of an OS port listing
///
/// The result is sorted by port name and free of duplicates.
pub fn select_ports(
    ports: Vec<SerialPortInfo>,
    signatures: &SignatureDb,
    baud_rate: u32,
) -> Vec<DeviceHandle> {
    let mut devices: Vec<DeviceHandle> = Vec::new();

    for port in ports {
        let handle = match port.port_type {
            SerialPortType::UsbPort(info) => {
                let Some(sig) = signatures.find(info.vid, info.pid) else {
                    log::debug!(
                        "Skipping {} ({:04X}:{:04X} is not a known board)",
                        port.port_name,
                        info.vid,
                        info.pid
                    );
                    continue;
                };
                let name = sig.name.clone();
                DeviceHandle::new(port.port_name, baud_rate)
                    .with_usb(UsbInfo {
                        vid: info.vid,
                        pid: info.pid,
                        serial_number: info.serial_number,
                        manufacturer: info.manufacturer,
                        product: info.product,
                    })
                    .with_signature(name)
            }
            _ if looks_like_usb_serial(&port.port_name) => {
                DeviceHandle::new(port.port_name, baud_rate)
            }
            _ => {
                log::trace!("Skipping {}", port.port_name);
                continue;
            }
        };
        devices.push(handle);
    }

    devices.sort_by(|a, b| a.port.cmp(&b.port));
    devices.dedup_by(|a, b| a.port == b.port);
    devices
}

/// List the serial ports known to the OS
pub fn available_ports() -> Result<Vec<SerialPortInfo>, EsptoolError> {
    Ok(serialport::available_ports()?)
}

/// Discovers boards attached through USB serial adapters
#[derive(Debug, Clone)]
pub struct SerialDiscoverer {
    signatures: SignatureDb,
    baud_rate: u32,
}

impl SerialDiscoverer {
    /// Create a discoverer matching ports against `signatures`
    pub fn new(signatures: SignatureDb, baud_rate: u32) -> Self {
        Self {
            signatures,
            baud_rate,
        }
    }

    /// Signatures used for matching
    pub fn signatures(&self) -> &SignatureDb {
        &self.signatures
    }
}

impl Discoverer for SerialDiscoverer {
    fn discover(&self) -> Vec<DeviceHandle> {
        let ports = match available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                log::warn!("Could not enumerate serial ports: {}", e);
                return Vec::new();
            }
        };
        log::debug!("OS reports {} serial port(s)", ports.len());

        let devices = select_ports(ports, &self.signatures, self.baud_rate);
        log::debug!("{} port(s) look like boards", devices.len());
        devices
    }
}
