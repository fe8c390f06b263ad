//! fleetflash-dummy - In-memory flash emulator for testing
//!
//! This crate provides a dummy flashing backend that emulates a bench of
//! boards in memory. It's useful for testing and for dry runs without real
//! hardware.
//!
//! Flash cells behave like NOR flash: erase sets every byte to `0xFF` and a
//! write can only clear bits. After each write the emulator compares the
//! region with the requested bytes and reports a checksum mismatch if they
//! differ, the same check esptool performs on real boards.

use fleetflash_core::{Connector, DeviceHandle, Discoverer, FlashTransport, TransportError};

/// Configuration for one emulated board
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Flash size in bytes
    pub size: usize,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            size: 4 * 1024 * 1024,
        }
    }
}

/// Faults to inject into a dummy board
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Faults {
    /// Refuse connections, as if the board had been unplugged
    pub unreachable: bool,
    /// Fail every erase
    pub fail_erase: bool,
    /// Fail the write starting at this offset
    pub fail_write_at: Option<u32>,
    /// Flip the lowest bit of this address right after it is written
    pub corrupt_at: Option<u32>,
    /// Fail every read
    pub fail_reads: bool,
    /// Report a disconnect once this many primitives have succeeded
    pub disconnect_after: Option<usize>,
}

/// Dummy flash board
///
/// Emulates the flash of one board in memory.
#[derive(Debug, Clone)]
pub struct DummyFlash {
    config: DummyConfig,
    data: Vec<u8>,
    faults: Faults,
    operations: usize,
}

impl DummyFlash {
    /// Create a new dummy flash with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let data = vec![0xFF; config.size];
        Self {
            config,
            data,
            faults: Faults::default(),
            operations: 0,
        }
    }

    /// Create a new dummy flash with default configuration (4 MiB)
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a dummy flash with pre-filled data
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut flash = Self::new(config);
        let len = std::cmp::min(initial_data.len(), flash.data.len());
        flash.data[..len].copy_from_slice(&initial_data[..len]);
        flash
    }

    /// Inject faults
    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }

    /// Get a reference to the flash data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get a mutable reference to the flash data
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Get the injected faults
    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    /// Get a mutable reference to the injected faults
    pub fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    /// Number of primitives that completed successfully
    pub fn operations(&self) -> usize {
        self.operations
    }

    fn range(&self, offset: u32, len: usize) -> Result<std::ops::Range<usize>, TransportError> {
        let start = offset as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(start..end),
            _ => Err(TransportError::OutOfBounds { addr: offset, len }),
        }
    }

    fn check_connected(&self) -> Result<(), TransportError> {
        match self.faults.disconnect_after {
            Some(limit) if self.operations >= limit => Err(TransportError::Disconnected(
                "dummy board went away".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl FlashTransport for DummyFlash {
    fn erase(&mut self) -> Result<(), TransportError> {
        self.check_connected()?;
        if self.faults.fail_erase {
            return Err(TransportError::Rejected("erase refused".to_string()));
        }

        self.data.fill(0xFF);
        self.operations += 1;
        log::trace!("dummy: erased {} bytes", self.data.len());
        Ok(())
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), TransportError> {
        self.check_connected()?;
        let range = self.range(offset, data.len())?;
        if self.faults.fail_write_at == Some(offset) {
            return Err(TransportError::Rejected(format!(
                "write at 0x{:08X} refused",
                offset
            )));
        }

        // Flash programming: can only change 1 -> 0
        for (cell, &byte) in self.data[range.clone()].iter_mut().zip(data) {
            *cell &= byte;
        }

        if &self.data[range.clone()] != data {
            return Err(TransportError::ChecksumMismatch(format!(
                "region 0x{:08X}+{} does not match written data",
                offset,
                data.len()
            )));
        }

        if let Some(addr) = self.faults.corrupt_at {
            if range.contains(&(addr as usize)) {
                self.data[addr as usize] ^= 0x01;
            }
        }

        self.operations += 1;
        log::trace!("dummy: wrote {} bytes at 0x{:08X}", data.len(), offset);
        Ok(())
    }

    fn read(&mut self, offset: u32, len: usize) -> Result<Vec<u8>, TransportError> {
        self.check_connected()?;
        if self.faults.fail_reads {
            return Err(TransportError::Rejected("read refused".to_string()));
        }
        let range = self.range(offset, len)?;

        self.operations += 1;
        Ok(self.data[range].to_vec())
    }

    fn flash_size(&self) -> Option<u32> {
        u32::try_from(self.data.len()).ok()
    }
}

/// A bench of dummy boards, each behind its own port name
///
/// Implements both [`Discoverer`] and [`Connector`], so it can stand in for
/// a real serial backend.
#[derive(Debug, Clone)]
pub struct DummyBench {
    boards: Vec<(String, DummyFlash)>,
    baud_rate: u32,
    connects: usize,
}

impl DummyBench {
    /// Create an empty bench
    pub fn new(baud_rate: u32) -> Self {
        Self {
            boards: Vec::new(),
            baud_rate,
            connects: 0,
        }
    }

    /// Create a bench of `count` identical boards named `dummy0`, `dummy1`, ...
    pub fn with_boards(count: usize, config: DummyConfig, baud_rate: u32) -> Self {
        let mut bench = Self::new(baud_rate);
        for i in 0..count {
            bench.add(format!("dummy{}", i), DummyFlash::new(config.clone()));
        }
        bench
    }

    /// Plug in a board
    pub fn add(&mut self, port: impl Into<String>, flash: DummyFlash) -> &mut Self {
        self.boards.push((port.into(), flash));
        self
    }

    /// Unplug a board, returning it
    pub fn remove(&mut self, port: &str) -> Option<DummyFlash> {
        let index = self.boards.iter().position(|(p, _)| p == port)?;
        Some(self.boards.remove(index).1)
    }

    /// Board behind `port`
    pub fn board(&self, port: &str) -> Option<&DummyFlash> {
        self.boards.iter().find(|(p, _)| p == port).map(|(_, f)| f)
    }

    /// Mutable board behind `port`
    pub fn board_mut(&mut self, port: &str) -> Option<&mut DummyFlash> {
        self.boards
            .iter_mut()
            .find(|(p, _)| p == port)
            .map(|(_, f)| f)
    }

    /// Number of boards on the bench
    pub fn len(&self) -> usize {
        self.boards.len()
    }

    /// Whether the bench is empty
    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    /// Number of connection attempts so far
    pub fn connects(&self) -> usize {
        self.connects
    }
}

impl Discoverer for DummyBench {
    fn discover(&self) -> Vec<DeviceHandle> {
        self.boards
            .iter()
            .filter(|(_, flash)| !flash.faults.unreachable)
            .map(|(port, _)| DeviceHandle::new(port.clone(), self.baud_rate).with_signature("dummy"))
            .collect()
    }
}

impl Connector for DummyBench {
    fn connect<'a>(
        &'a mut self,
        device: &DeviceHandle,
    ) -> Result<Box<dyn FlashTransport + 'a>, TransportError> {
        self.connects += 1;
        let flash = self
            .boards
            .iter_mut()
            .find(|(port, _)| *port == device.port)
            .map(|(_, flash)| flash)
            .ok_or_else(|| TransportError::Disconnected(format!("no board on {}", device.port)))?;

        if flash.faults.unreachable {
            return Err(TransportError::Disconnected(format!(
                "{} does not answer",
                device.port
            )));
        }

        log::debug!("dummy: connected to {}", device.port);
        Ok(Box::new(flash))
    }
}
