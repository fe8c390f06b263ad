//! Progress reporting hooks

use crate::batch::BatchReport;
use crate::device::DeviceHandle;
use crate::job::{JobResult, Step};

/// Receives progress events while a batch runs
///
/// All methods have empty default implementations so a front-end only
/// overrides what it displays.
pub trait BatchObserver {
    /// A batch of `devices` devices is starting
    fn batch_started(&mut self, _devices: usize) {}

    /// Work on the `index`-th device (0-based) is starting
    fn device_started(&mut self, _index: usize, _device: &DeviceHandle) {}

    /// A step is starting; `bytes` is the amount of data involved, 0 if none
    fn step_started(&mut self, _device: &DeviceHandle, _step: Step, _bytes: usize) {}

    /// A step finished, successfully or not
    fn step_finished(&mut self, _device: &DeviceHandle, _step: Step, _ok: bool) {}

    /// A device's job is complete
    fn device_finished(&mut self, _result: &JobResult) {}

    /// The whole batch is complete
    fn batch_finished(&mut self, _report: &BatchReport) {}
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl BatchObserver for NoProgress {}
