//! Flash transport backed by esptool invocations

use std::fs;
use std::io::Write;
use std::time::Duration;

use fleetflash_core::{Connector, DeviceHandle, FlashTransport, TransportError};
use serialport::{DataBits, FlowControl, Parity, StopBits};

use crate::error::EsptoolError;
use crate::tool::{Esptool, EsptoolCommand};

/// Check that a port can be opened, then release it
///
/// esptool opens the port itself, so the handle is closed right away.
pub fn probe_port(device: &DeviceHandle) -> Result<(), EsptoolError> {
    let port = serialport::new(&device.port, device.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(Duration::from_secs(5))
        .open()?;
    drop(port);

    log::debug!("{}: port opens at {} baud", device.port, device.baud_rate);
    Ok(())
}

/// Transport for one device, valid while its connector is borrowed
pub struct EsptoolTransport<'a> {
    tool: &'a Esptool,
    device: DeviceHandle,
}

impl<'a> EsptoolTransport<'a> {
    /// Create a transport running `tool` against `device`
    pub fn new(tool: &'a Esptool, device: DeviceHandle) -> Self {
        Self { tool, device }
    }

    /// Device this transport talks to
    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }
}

impl FlashTransport for EsptoolTransport<'_> {
    fn erase(&mut self) -> Result<(), TransportError> {
        self.tool.run(&self.device, EsptoolCommand::EraseFlash)?;
        self.tool.settle(&self.device);
        Ok(())
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), TransportError> {
        let mut staged = tempfile::Builder::new()
            .prefix("fleetflash-")
            .suffix(".bin")
            .tempfile()
            .map_err(EsptoolError::TempFile)?;
        staged.write_all(data).map_err(EsptoolError::TempFile)?;
        staged.flush().map_err(EsptoolError::TempFile)?;
        // Close our handle so the tool can open the file on every platform
        let path = staged.into_temp_path();

        self.tool.run(
            &self.device,
            EsptoolCommand::WriteFlash {
                offset,
                file: &path,
            },
        )?;
        self.tool.settle(&self.device);
        Ok(())
    }

    fn read(&mut self, offset: u32, len: usize) -> Result<Vec<u8>, TransportError> {
        let dir = tempfile::Builder::new()
            .prefix("fleetflash-")
            .tempdir()
            .map_err(EsptoolError::TempFile)?;
        let file = dir.path().join("readback.bin");

        self.tool.run(
            &self.device,
            EsptoolCommand::ReadFlash {
                offset,
                len,
                file: &file,
            },
        )?;

        fs::read(&file).map_err(|e| EsptoolError::TempFile(e).into())
    }

    fn flash_size(&self) -> Option<u32> {
        self.tool.options().flash_size
    }

    // Every invocation resets the board and uploads the stub
    fn max_read_len(&self) -> usize {
        usize::MAX
    }
}

/// Opens esptool transports for serial devices
#[derive(Debug, Clone, Default)]
pub struct EsptoolConnector {
    tool: Esptool,
}

impl EsptoolConnector {
    /// Create a connector running `tool`
    pub fn new(tool: Esptool) -> Self {
        Self { tool }
    }

    /// The esptool runner
    pub fn tool(&self) -> &Esptool {
        &self.tool
    }
}

impl Connector for EsptoolConnector {
    fn connect<'a>(
        &'a mut self,
        device: &DeviceHandle,
    ) -> Result<Box<dyn FlashTransport + 'a>, TransportError> {
        probe_port(device)?;
        Ok(Box::new(EsptoolTransport::new(&self.tool, device.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::EsptoolOptions;

    #[cfg(unix)]
    fn shell(script: &str) -> Esptool {
        Esptool::new(EsptoolOptions {
            program: "sh".to_string(),
            program_args: vec!["-c".to_string(), script.to_string(), "esptool".to_string()],
            settle: Duration::ZERO,
            flash_size: Some(4 * 1024 * 1024),
            ..EsptoolOptions::default()
        })
    }

    #[cfg(unix)]
    #[test]
    fn test_write_stages_data_in_a_file() {
        // The file is the last argument
        let tool = shell(r#"for a; do f=$a; done; [ "$(cat "$f")" = hello ]"#);
        let mut transport = EsptoolTransport::new(&tool, DeviceHandle::new("/dev/ttyUSB0", 115200));

        transport.write(0x10000, b"hello").unwrap();
        assert!(matches!(
            transport.write(0x10000, b"world"),
            Err(TransportError::Rejected(_))
        ));
        assert_eq!(transport.flash_size(), Some(4 * 1024 * 1024));
    }

    #[cfg(unix)]
    #[test]
    fn test_read_goes_through_a_file() {
        let tool = shell(r#"for a; do f=$a; done; printf 'abc' > "$f""#);
        let mut transport = EsptoolTransport::new(&tool, DeviceHandle::new("/dev/ttyUSB0", 115200));

        assert_eq!(transport.read(0x1000, 3).unwrap(), b"abc");
    }

    #[cfg(unix)]
    #[test]
    fn test_verify_reads_each_image_once() {
        use fleetflash_core::job::JobFlags;
        use fleetflash_core::progress::NoProgress;
        use fleetflash_core::{verify, FirmwareImage, FirmwareSet, FlashJob, ImageKind};

        let dir = tempfile::tempdir().unwrap();
        let calls = dir.path().join("calls");
        // Answer read_flash with zeroes: the length precedes the file
        let script = format!(
            r#"echo x >> '{}'; for a; do n=$p; p=$a; done; head -c "$n" /dev/zero > "$p""#,
            calls.display()
        );
        let tool = shell(&script);
        let device = DeviceHandle::new("/dev/ttyUSB0", 115200);
        let mut transport = EsptoolTransport::new(&tool, device.clone());

        let set = FirmwareSet::new(vec![
            FirmwareImage::new(ImageKind::Bootloader, 0x1000, vec![0; 0x4000]),
            FirmwareImage::new(ImageKind::Application, 0x10000, vec![0; 1024 * 1024]),
        ])
        .unwrap();
        let job = FlashJob::new(device, &set, JobFlags::default());

        let result = verify::verify(&mut transport, &job, &mut NoProgress);
        assert!(result.is_success());
        let spawned = fs::read_to_string(&calls).unwrap().lines().count();
        assert_eq!(spawned, 2);
    }

    #[test]
    fn test_connect_to_missing_port() {
        let mut connector = EsptoolConnector::default();
        let device = DeviceHandle::new("/dev/fleetflash-no-such-port", 115200);

        let err = connector.connect(&device).err().unwrap();
        assert!(err.is_disconnect());
    }
}
