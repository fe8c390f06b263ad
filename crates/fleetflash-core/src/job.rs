//! Per-device jobs and their outcomes

use std::fmt;

use crate::device::DeviceHandle;
use crate::error::TransportError;
use crate::image::{FirmwareImage, FirmwareSet, ImageKind};

/// Flags applied to a single job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobFlags {
    /// Do not erase before writing
    pub skip_erase: bool,
    /// Erase only, write nothing
    pub erase_only: bool,
    /// Read back and compare after writing
    pub verify: bool,
}

/// Work to perform on one device
///
/// Images are borrowed from the batch's [`FirmwareSet`]; a job never owns
/// or modifies image bytes.
#[derive(Debug, Clone)]
pub struct FlashJob<'a> {
    /// Target device
    pub device: DeviceHandle,
    /// Images to write, in write order
    pub images: Vec<&'a FirmwareImage>,
    /// Job flags
    pub flags: JobFlags,
}

impl<'a> FlashJob<'a> {
    /// Build the job for one device from the batch images
    ///
    /// Erase-only jobs carry no images.
    pub fn new(device: DeviceHandle, images: &'a FirmwareSet, flags: JobFlags) -> Self {
        let images = if flags.erase_only {
            Vec::new()
        } else {
            images.images().iter().collect()
        };
        Self {
            device,
            images,
            flags,
        }
    }

    /// Steps this job will execute, in order (verification excluded)
    pub fn steps(&self) -> Vec<Step> {
        let mut steps = Vec::with_capacity(self.images.len() + 1);
        if !self.flags.skip_erase {
            steps.push(Step::Erase);
        }
        steps.extend(self.images.iter().map(|img| Step::Write(img.kind())));
        steps
    }
}

/// A single step of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Opening the device
    Connect,
    /// Full flash erase
    Erase,
    /// Writing one image
    Write(ImageKind),
    /// Reading back and comparing one image
    Verify(ImageKind),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Connect => write!(f, "connect"),
            Step::Erase => write!(f, "erase"),
            Step::Write(kind) => write!(f, "write {}", kind),
            Step::Verify(kind) => write!(f, "verify {}", kind),
        }
    }
}

/// Outcome category of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    /// Every step succeeded
    Success,
    /// The erase step failed
    EraseFailed,
    /// Writing an image failed
    WriteFailed,
    /// Read-back content differs from the source image
    VerifyMismatch,
    /// The device could not be reached or disappeared
    DeviceUnreachable,
}

impl JobStatus {
    /// Whether this is [`JobStatus::Success`]
    pub fn is_success(self) -> bool {
        self == JobStatus::Success
    }

    /// Status for a transport error raised while executing `step`
    pub fn for_failure(step: Step, error: &TransportError) -> Self {
        if error.is_disconnect() {
            return JobStatus::DeviceUnreachable;
        }
        match step {
            Step::Connect => JobStatus::DeviceUnreachable,
            Step::Erase => JobStatus::EraseFailed,
            Step::Write(_) => JobStatus::WriteFailed,
            // Any read failure during verification means we lost the device
            Step::Verify(_) => JobStatus::DeviceUnreachable,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Success => "success",
            JobStatus::EraseFailed => "erase failed",
            JobStatus::WriteFailed => "write failed",
            JobStatus::VerifyMismatch => "verify mismatch",
            JobStatus::DeviceUnreachable => "device unreachable",
        };
        f.write_str(s)
    }
}

/// First difference found while verifying an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Image that differs
    pub image: ImageKind,
    /// Absolute flash address of the first differing byte
    pub address: u32,
    /// Byte from the source image
    pub expected: u8,
    /// Byte read from the device, `None` if the read came back short
    pub actual: Option<u8>,
    /// Number of differing bytes in this image
    pub count: usize,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.actual {
            Some(actual) => write!(
                f,
                "{}: {} byte(s) differ, first at 0x{:08X}: expected 0x{:02X}, got 0x{:02X}",
                self.image, self.count, self.address, self.expected, actual
            ),
            None => write!(
                f,
                "{}: read back short, first missing byte at 0x{:08X} (expected 0x{:02X})",
                self.image, self.address, self.expected
            ),
        }
    }
}

/// Why a job failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The backend reported an error
    Transport(TransportError),
    /// An image does not fit the device's flash
    TooLarge {
        /// End (exclusive) of the image
        end: u64,
        /// Flash size reported by the device
        flash_size: u32,
    },
    /// Read-back content differs
    Mismatch(Mismatch),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Transport(e) => write!(f, "{}", e),
            Failure::TooLarge { end, flash_size } => write!(
                f,
                "image ends at 0x{:08X}, beyond the {} byte flash",
                end, flash_size
            ),
            Failure::Mismatch(m) => write!(f, "{}", m),
        }
    }
}

/// Outcome of one device's job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    /// Device the job ran on
    pub device: DeviceHandle,
    /// Outcome category
    pub status: JobStatus,
    /// Step that failed, if any
    pub failed_step: Option<Step>,
    /// Failure details, if any
    pub failure: Option<Failure>,
}

impl JobResult {
    /// Successful result
    pub fn success(device: DeviceHandle) -> Self {
        Self {
            device,
            status: JobStatus::Success,
            failed_step: None,
            failure: None,
        }
    }

    /// Failed result
    pub fn failed(device: DeviceHandle, status: JobStatus, step: Step, failure: Failure) -> Self {
        Self {
            device,
            status,
            failed_step: Some(step),
            failure: Some(failure),
        }
    }

    /// Result for a transport error raised during `step`
    pub fn transport_failure(device: DeviceHandle, step: Step, error: TransportError) -> Self {
        let status = JobStatus::for_failure(step, &error);
        Self::failed(device, status, step, Failure::Transport(error))
    }

    /// Whether the job succeeded
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The mismatch details, for [`JobStatus::VerifyMismatch`] results
    pub fn mismatch(&self) -> Option<&Mismatch> {
        match &self.failure {
            Some(Failure::Mismatch(m)) => Some(m),
            _ => None,
        }
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.device, self.status)?;
        if let Some(step) = &self.failed_step {
            write!(f, " at {}", step)?;
        }
        if let Some(failure) = &self.failure {
            write!(f, " ({})", failure)?;
        }
        Ok(())
    }
}
