//! list-ports command implementation

use std::path::Path;

use fleetflash_core::config::DEFAULT_BAUD_RATE;
use fleetflash_core::SignatureDb;
use fleetflash_esptool::{discover, select_ports};
use serialport::SerialPortType;

use super::flash::load_signatures;

fn port_kind(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(info) => format!("USB {:04X}:{:04X}", info.vid, info.pid),
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        SerialPortType::Unknown => "unknown".to_string(),
    }
}

/// List serial ports and show which ones discovery keeps
pub fn list_ports(signatures: Option<&Path>, all: bool) -> Result<(), Box<dyn std::error::Error>> {
    let db: SignatureDb = load_signatures(signatures)?;
    let ports = discover::available_ports()?;

    if all {
        println!("Serial ports:");
        println!();
        println!("{:<32} {:<16}", "Port", "Type");
        println!("{}", "-".repeat(50));
        for port in &ports {
            println!("{:<32} {:<16}", port.port_name, port_kind(&port.port_type));
        }
        println!();
    }

    let devices = select_ports(ports, &db, DEFAULT_BAUD_RATE);
    if devices.is_empty() {
        println!("No boards found.");
        return Ok(());
    }

    println!("Boards that would be flashed:");
    for device in &devices {
        println!("  {}", device.describe());
    }
    Ok(())
}
