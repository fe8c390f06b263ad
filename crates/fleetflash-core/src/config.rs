//! Run configuration
//!
//! Everything that varies between runs lives in one [`FlashConfig`] passed
//! into the orchestrator.

use std::time::Duration;

use crate::error::ConfigError;
use crate::job::JobFlags;

/// Default serial baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default deadline for a single erase/write/read step
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(300);

/// Options applied to every device of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashConfig {
    /// Do not erase before writing
    pub skip_erase: bool,
    /// Erase only, write nothing
    pub erase_only: bool,
    /// Read back and compare after writing
    pub verify: bool,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Deadline for a single transport step
    pub step_timeout: Duration,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            skip_erase: false,
            erase_only: false,
            verify: false,
            baud_rate: DEFAULT_BAUD_RATE,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }
}

impl FlashConfig {
    /// Reject combinations that would do nothing useful
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.erase_only && self.skip_erase {
            return Err(ConfigError::ConflictingFlags(
                "--erase-only with --skip-erase leaves nothing to do",
            ));
        }
        if self.erase_only && self.verify {
            return Err(ConfigError::ConflictingFlags(
                "--verify has nothing to check with --erase-only",
            ));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::InvalidBaudRate(self.baud_rate));
        }
        Ok(())
    }

    /// Per-job flags derived from this configuration
    pub fn job_flags(&self) -> JobFlags {
        JobFlags {
            skip_erase: self.skip_erase,
            erase_only: self.erase_only,
            verify: self.verify && !self.erase_only,
        }
    }

    /// Short description of what a batch will do, e.g. "erase and flash"
    pub fn action(&self) -> String {
        let mut action = match (self.skip_erase, self.erase_only) {
            (false, false) => "erase and flash".to_string(),
            (true, false) => "flash".to_string(),
            (false, true) => "erase".to_string(),
            (true, true) => "do nothing to".to_string(),
        };
        if self.verify && !self.erase_only {
            action.push_str(" and verify");
        }
        action
    }
}
