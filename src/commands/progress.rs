//! Spinner progress display for batches

use fleetflash_core::{BatchObserver, BatchReport, DeviceHandle, JobResult, Step};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Shows one spinner per step of the device being flashed
#[derive(Default)]
pub struct SpinnerObserver {
    total: usize,
    spinner: Option<ProgressBar>,
}

impl SpinnerObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn spinner(message: String) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        // The template is a constant, so this only fails on a typo
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

fn describe_step(step: Step, bytes: usize) -> String {
    match step {
        Step::Connect => "Connecting...".to_string(),
        Step::Erase => "Erasing flash (this may take a while)...".to_string(),
        Step::Write(kind) => format!("Writing {} ({} bytes)...", kind, bytes),
        Step::Verify(kind) => format!("Verifying {} ({} bytes)...", kind, bytes),
    }
}

fn step_done(step: Step) -> String {
    match step {
        Step::Connect => "Connected".to_string(),
        Step::Erase => "Flash erased".to_string(),
        Step::Write(kind) => format!("Wrote {}", kind),
        Step::Verify(kind) => format!("Verified {}", kind),
    }
}

impl BatchObserver for SpinnerObserver {
    fn batch_started(&mut self, devices: usize) {
        self.total = devices;
    }

    fn device_started(&mut self, index: usize, device: &DeviceHandle) {
        println!();
        println!("[{}/{}] {}", index + 1, self.total, device.describe());
    }

    fn step_started(&mut self, _device: &DeviceHandle, step: Step, bytes: usize) {
        self.spinner = Some(Self::spinner(describe_step(step, bytes)));
    }

    fn step_finished(&mut self, _device: &DeviceHandle, step: Step, ok: bool) {
        if let Some(pb) = self.spinner.take() {
            if ok {
                pb.finish_with_message(step_done(step));
            } else {
                pb.abandon_with_message(format!("{} failed", step));
            }
        }
    }

    fn device_finished(&mut self, result: &JobResult) {
        if result.is_success() {
            println!("{}: OK", result.device);
        } else {
            println!("{}", result);
        }
    }

    fn batch_finished(&mut self, report: &BatchReport) {
        println!();
        println!("Summary");
        println!("=======");
        for result in report {
            let status = if result.is_success() { "OK" } else { "FAILED" };
            println!("  {:<8} {}", status, result);
        }
        println!();
        println!(
            "{} succeeded, {} failed, {} total",
            report.succeeded(),
            report.len() - report.succeeded(),
            report.len()
        );
    }
}
