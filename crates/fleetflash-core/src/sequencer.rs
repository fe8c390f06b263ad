//! Flash sequencer: erase, then write every image, strictly in order
//!
//! The sequencer stops at the first failing step. It never retries and never
//! pipelines: each primitive must return before the next one is issued.

use crate::device::DeviceHandle;
use crate::error::TransportError;
use crate::job::{Failure, FlashJob, JobResult, JobStatus, Step};
use crate::progress::BatchObserver;
use crate::transport::FlashTransport;

/// Run one step, reporting it to the observer and mapping failure to a
/// [`JobResult`]
pub(crate) fn run_step<T>(
    observer: &mut dyn BatchObserver,
    device: &DeviceHandle,
    step: Step,
    bytes: usize,
    op: impl FnOnce() -> Result<T, TransportError>,
) -> Result<T, JobResult> {
    observer.step_started(device, step, bytes);
    match op() {
        Ok(value) => {
            observer.step_finished(device, step, true);
            Ok(value)
        }
        Err(e) => {
            observer.step_finished(device, step, false);
            log::error!("{}: {} failed: {}", device, step, e);
            Err(JobResult::transport_failure(device.clone(), step, e))
        }
    }
}

/// Execute the erase and write steps of `job` on `transport`
pub fn run<T>(transport: &mut T, job: &FlashJob<'_>, observer: &mut dyn BatchObserver) -> JobResult
where
    T: FlashTransport + ?Sized,
{
    let device = &job.device;

    if job.flags.skip_erase {
        log::info!("{}: skipping erase", device);
    } else {
        log::info!("{}: erasing flash", device);
        if let Err(result) = run_step(observer, device, Step::Erase, 0, || transport.erase()) {
            return result;
        }
    }

    let flash_size = transport.flash_size();

    for image in &job.images {
        let step = Step::Write(image.kind());

        if let Some(size) = flash_size {
            if image.end() > size as u64 {
                log::error!(
                    "{}: {} ends at 0x{:08X}, beyond the {} byte flash",
                    device,
                    image.kind(),
                    image.end(),
                    size
                );
                return JobResult::failed(
                    device.clone(),
                    JobStatus::WriteFailed,
                    step,
                    Failure::TooLarge {
                        end: image.end(),
                        flash_size: size,
                    },
                );
            }
        }

        log::info!(
            "{}: writing {} ({} bytes) at 0x{:08X}",
            device,
            image.kind(),
            image.len(),
            image.offset()
        );
        if let Err(result) = run_step(observer, device, step, image.len(), || {
            transport.write(image.offset(), image.data())
        }) {
            return result;
        }
    }

    JobResult::success(device.clone())
}
