//! Batch orchestrator: run one job per device, one device at a time
//!
//! Devices are flashed strictly sequentially. A failing device is recorded
//! in the [`BatchReport`] and the batch moves on to the next one; nothing is
//! retried automatically.

use crate::config::FlashConfig;
use crate::device::DeviceHandle;
use crate::image::FirmwareSet;
use crate::job::{FlashJob, JobResult, JobStatus, Step};
use crate::progress::BatchObserver;
use crate::sequencer;
use crate::transport::Connector;
use crate::verify;

/// Per-device outcomes of a batch, in processing order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    results: Vec<JobResult>,
}

impl BatchReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result
    pub fn push(&mut self, result: JobResult) {
        self.results.push(result);
    }

    /// All results, in processing order
    pub fn results(&self) -> &[JobResult] {
        &self.results
    }

    /// Result for a device
    pub fn get(&self, device: &DeviceHandle) -> Option<&JobResult> {
        self.results.iter().find(|r| &r.device == device)
    }

    /// Status for a port path
    pub fn status_of(&self, port: &str) -> Option<JobStatus> {
        self.results
            .iter()
            .find(|r| r.device.port == port)
            .map(|r| r.status)
    }

    /// Number of devices processed
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether no device was processed
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Number of successful devices
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// Failed results
    pub fn failures(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    /// Whether every processed device succeeded (vacuously true when empty)
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(JobResult::is_success)
    }
}

impl<'a> IntoIterator for &'a BatchReport {
    type Item = &'a JobResult;
    type IntoIter = std::slice::Iter<'a, JobResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// Runs flash jobs over a sequence of devices
pub struct Orchestrator<C> {
    connector: C,
    config: FlashConfig,
}

impl<C: Connector> Orchestrator<C> {
    /// Create an orchestrator using `connector` to reach devices
    pub fn new(connector: C, config: FlashConfig) -> Self {
        Self { connector, config }
    }

    /// Configuration applied to every job
    pub fn config(&self) -> &FlashConfig {
        &self.config
    }

    /// The connector
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Give the connector back
    pub fn into_connector(self) -> C {
        self.connector
    }

    /// Flash every device in turn and collect the results
    ///
    /// An empty device sequence produces an empty report.
    pub fn run_batch<I>(
        &mut self,
        devices: I,
        images: &FirmwareSet,
        observer: &mut dyn BatchObserver,
    ) -> BatchReport
    where
        I: IntoIterator<Item = DeviceHandle>,
    {
        let devices: Vec<DeviceHandle> = devices.into_iter().collect();
        let mut report = BatchReport::new();

        observer.batch_started(devices.len());
        if devices.is_empty() {
            log::warn!("No devices to process");
        }

        let total = devices.len();
        for (index, device) in devices.into_iter().enumerate() {
            log::info!("[{}/{}] Processing {}", index + 1, total, device);
            observer.device_started(index, &device);

            let result = self.run_device(device, images, observer);
            if result.is_success() {
                log::info!("{}: done", result.device);
            } else {
                log::warn!("{}", result);
            }

            observer.device_finished(&result);
            report.push(result);
        }

        observer.batch_finished(&report);
        log::info!(
            "Batch complete: {} succeeded, {} failed, {} total",
            report.succeeded(),
            report.len() - report.succeeded(),
            report.len()
        );
        report
    }

    /// Connect to one device, run its job and verify if requested
    ///
    /// The transport is dropped, releasing the device, before returning.
    pub fn run_device(
        &mut self,
        device: DeviceHandle,
        images: &FirmwareSet,
        observer: &mut dyn BatchObserver,
    ) -> JobResult {
        let job = FlashJob::new(device, images, self.config.job_flags());

        observer.step_started(&job.device, Step::Connect, 0);
        let mut transport = match self.connector.connect(&job.device) {
            Ok(transport) => {
                observer.step_finished(&job.device, Step::Connect, true);
                transport
            }
            Err(e) => {
                observer.step_finished(&job.device, Step::Connect, false);
                log::error!("{}: cannot open device: {}", job.device, e);
                return JobResult::transport_failure(job.device, Step::Connect, e);
            }
        };

        let result = sequencer::run(transport.as_mut(), &job, observer);
        if !result.is_success() || !job.flags.verify {
            return result;
        }

        verify::verify(transport.as_mut(), &job, observer)
    }
}
