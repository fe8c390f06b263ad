//! Orchestrator tests against the in-memory bench

use std::fs;

use fleetflash_core::{
    ConfigError, DeviceHandle, Discoverer, FirmwareImage, FirmwareSet, FlashConfig, FlashLayout,
    ImageKind, JobStatus, NoProgress, Orchestrator, Step,
};
use fleetflash_dummy::{DummyBench, DummyConfig, DummyFlash, Faults};

const BAUD: u32 = 115200;

fn config() -> DummyConfig {
    DummyConfig { size: 0x20000 }
}

fn images() -> FirmwareSet {
    FirmwareSet::new(vec![
        FirmwareImage::new(ImageKind::Bootloader, 0x1000, vec![0x11; 0x800]),
        FirmwareImage::new(ImageKind::PartitionTable, 0x8000, vec![0x22; 0xC00]),
        FirmwareImage::new(
            ImageKind::Application,
            0x10000,
            (0..0x5000u32).map(|i| (i * 7) as u8).collect(),
        ),
    ])
    .unwrap()
}

fn verifying() -> FlashConfig {
    FlashConfig {
        verify: true,
        ..FlashConfig::default()
    }
}

fn assert_flashed(flash: &DummyFlash, set: &FirmwareSet) {
    for img in set.images() {
        let start = img.offset() as usize;
        assert_eq!(&flash.data()[start..start + img.len()], img.data(), "{}", img.kind());
    }
}

#[test]
fn test_healthy_device_succeeds() {
    let set = images();
    let mut bench = DummyBench::with_boards(1, config(), BAUD);
    let devices = bench.discover();

    let report = Orchestrator::new(&mut bench, verifying()).run_batch(devices, &set, &mut NoProgress);

    assert_eq!(report.len(), 1);
    assert!(report.all_succeeded());
    assert_eq!(report.status_of("dummy0"), Some(JobStatus::Success));
    assert_flashed(bench.board("dummy0").unwrap(), &set);
}

#[test]
fn test_rerun_is_idempotent() {
    let set = images();
    let mut bench = DummyBench::with_boards(1, config(), BAUD);
    let devices = bench.discover();

    let first = Orchestrator::new(&mut bench, verifying()).run_batch(devices.clone(), &set, &mut NoProgress);
    let after_first = bench.board("dummy0").unwrap().data().to_vec();

    let second = Orchestrator::new(&mut bench, verifying()).run_batch(devices, &set, &mut NoProgress);
    let after_second = bench.board("dummy0").unwrap().data();

    assert_eq!(first, second);
    assert_eq!(after_first.as_slice(), after_second);
}

#[test]
fn test_corrupted_byte_is_a_mismatch() {
    let set = images();
    let mut bench = DummyBench::new(BAUD);
    bench.add(
        "dummy0",
        DummyFlash::new(config()).with_faults(Faults {
            corrupt_at: Some(0x10000 + 0x1234),
            ..Faults::default()
        }),
    );
    let devices = bench.discover();

    let report = Orchestrator::new(&mut bench, verifying()).run_batch(devices, &set, &mut NoProgress);
    let result = &report.results()[0];

    assert_eq!(result.status, JobStatus::VerifyMismatch);
    assert_eq!(result.failed_step, Some(Step::Verify(ImageKind::Application)));
    let mismatch = result.mismatch().unwrap();
    assert_eq!(mismatch.address, 0x11234);
    assert_eq!(mismatch.count, 1);
}

#[test]
fn test_corruption_without_verify_goes_unnoticed() {
    let set = images();
    let mut bench = DummyBench::new(BAUD);
    bench.add(
        "dummy0",
        DummyFlash::new(config()).with_faults(Faults {
            corrupt_at: Some(0x10000),
            ..Faults::default()
        }),
    );
    let devices = bench.discover();

    let report = Orchestrator::new(&mut bench, FlashConfig::default()).run_batch(devices, &set, &mut NoProgress);
    assert!(report.all_succeeded());
}

#[test]
fn test_skip_erase_over_dirty_flash() {
    let set = images();
    let mut bench = DummyBench::new(BAUD);
    bench.add("dummy0", DummyFlash::with_data(config(), &vec![0x00; 0x20000]));
    let devices = bench.discover();

    let config = FlashConfig {
        skip_erase: true,
        ..FlashConfig::default()
    };
    let report = Orchestrator::new(&mut bench, config).run_batch(devices, &set, &mut NoProgress);
    let result = &report.results()[0];

    // The writes are attempted and the emulator reports what it found
    assert_eq!(result.status, JobStatus::WriteFailed);
    assert_eq!(result.failed_step, Some(Step::Write(ImageKind::Bootloader)));
}

#[test]
fn test_skip_erase_over_erased_flash() {
    let set = images();
    let mut bench = DummyBench::with_boards(1, config(), BAUD);
    let devices = bench.discover();

    let config = FlashConfig {
        skip_erase: true,
        verify: true,
        ..FlashConfig::default()
    };
    let report = Orchestrator::new(&mut bench, config).run_batch(devices, &set, &mut NoProgress);
    assert!(report.all_succeeded());
}

#[test]
fn test_failing_device_does_not_stop_batch() {
    let set = images();
    let mut bench = DummyBench::with_boards(3, config(), BAUD);
    bench.board_mut("dummy1").unwrap().faults_mut().fail_erase = true;
    let devices = bench.discover();

    let report = Orchestrator::new(&mut bench, verifying()).run_batch(devices, &set, &mut NoProgress);

    let statuses: Vec<_> = report.results().iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        [JobStatus::Success, JobStatus::EraseFailed, JobStatus::Success]
    );
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failures().count(), 1);
    assert!(!report.all_succeeded());

    assert_flashed(bench.board("dummy0").unwrap(), &set);
    assert_flashed(bench.board("dummy2").unwrap(), &set);
    assert!(bench.board("dummy1").unwrap().data().iter().all(|&b| b == 0xFF));
}

#[test]
fn test_no_devices() {
    let set = images();
    let mut bench = DummyBench::new(BAUD);
    let devices = bench.discover();

    let report = Orchestrator::new(&mut bench, verifying()).run_batch(devices, &set, &mut NoProgress);
    assert!(report.is_empty());
    assert!(report.all_succeeded());
    assert_eq!(bench.connects(), 0);
}

#[test]
fn test_device_gone_before_its_turn() {
    let set = images();
    let mut bench = DummyBench::with_boards(2, config(), BAUD);
    let devices = bench.discover();
    bench.remove("dummy0");

    let report = Orchestrator::new(&mut bench, verifying()).run_batch(devices, &set, &mut NoProgress);

    let gone = report.get(&DeviceHandle::new("dummy0", BAUD).with_signature("dummy")).unwrap();
    assert_eq!(gone.status, JobStatus::DeviceUnreachable);
    assert_eq!(gone.failed_step, Some(Step::Connect));
    assert_eq!(report.status_of("dummy1"), Some(JobStatus::Success));
}

#[test]
fn test_disconnect_mid_write() {
    let set = images();
    let mut bench = DummyBench::new(BAUD);
    bench.add(
        "dummy0",
        DummyFlash::new(config()).with_faults(Faults {
            disconnect_after: Some(2),
            ..Faults::default()
        }),
    );
    let devices = bench.discover();

    let report = Orchestrator::new(&mut bench, FlashConfig::default()).run_batch(devices, &set, &mut NoProgress);
    let result = &report.results()[0];
    assert_eq!(result.status, JobStatus::DeviceUnreachable);
    assert_eq!(result.failed_step, Some(Step::Write(ImageKind::PartitionTable)));
}

#[test]
fn test_read_failure_during_verify() {
    let set = images();
    let mut bench = DummyBench::new(BAUD);
    bench.add(
        "dummy0",
        DummyFlash::new(config()).with_faults(Faults {
            fail_reads: true,
            ..Faults::default()
        }),
    );
    let devices = bench.discover();

    let report = Orchestrator::new(&mut bench, verifying()).run_batch(devices, &set, &mut NoProgress);
    let result = &report.results()[0];
    assert_eq!(result.status, JobStatus::DeviceUnreachable);
    assert_eq!(result.failed_step, Some(Step::Verify(ImageKind::Bootloader)));
}

#[test]
fn test_erase_only() {
    let set = images();
    let mut bench = DummyBench::new(BAUD);
    bench.add("dummy0", DummyFlash::with_data(config(), &[0x00; 64]));
    let devices = bench.discover();

    let config = FlashConfig {
        erase_only: true,
        ..FlashConfig::default()
    };
    let report = Orchestrator::new(&mut bench, config).run_batch(devices, &set, &mut NoProgress);

    assert!(report.all_succeeded());
    assert!(bench.board("dummy0").unwrap().data().iter().all(|&b| b == 0xFF));
}

#[test]
fn test_missing_firmware_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("bootloader.bin"), [1u8; 16]).unwrap();
    fs::write(dir.path().join("firmware.bin"), [3u8; 16]).unwrap();

    let err = FirmwareSet::load_dir(dir.path(), &FlashLayout::default()).unwrap_err();
    assert!(matches!(err, ConfigError::MissingImage { file: "partitions.bin", .. }));
}
