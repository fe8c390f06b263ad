//! Verifier: read every written image back and compare byte for byte

use crate::error::TransportError;
use crate::image::FirmwareImage;
use crate::job::{Failure, FlashJob, JobResult, JobStatus, Mismatch, Step};
use crate::progress::BatchObserver;
use crate::sequencer::run_step;
use crate::transport::FlashTransport;

/// Default chunk size used for read-back
pub const VERIFY_CHUNK_SIZE: usize = 4096;

/// Verify every image of `job` against the device
///
/// Read errors are reported as [`JobStatus::DeviceUnreachable`]; content
/// differences as [`JobStatus::VerifyMismatch`] naming the first image that
/// differs.
pub fn verify<T>(transport: &mut T, job: &FlashJob<'_>, observer: &mut dyn BatchObserver) -> JobResult
where
    T: FlashTransport + ?Sized,
{
    let device = &job.device;

    for image in &job.images {
        let step = Step::Verify(image.kind());
        log::info!("{}: verifying {} ({} bytes)", device, image.kind(), image.len());

        let mismatch = match run_step(observer, device, step, image.len(), || {
            compare_image(&mut *transport, image)
        }) {
            Ok(mismatch) => mismatch,
            Err(result) => return result,
        };

        if let Some(mismatch) = mismatch {
            log::error!("{}: verification failed: {}", device, mismatch);
            return JobResult::failed(
                device.clone(),
                JobStatus::VerifyMismatch,
                step,
                Failure::Mismatch(mismatch),
            );
        }
    }

    if !job.images.is_empty() {
        log::info!("{}: verification passed", device);
    }
    JobResult::success(device.clone())
}

/// Read `image` back and return its first difference, if any
pub fn compare_image<T>(
    transport: &mut T,
    image: &FirmwareImage,
) -> Result<Option<Mismatch>, TransportError>
where
    T: FlashTransport + ?Sized,
{
    let expected = image.data();
    let mut first: Option<(usize, u8, Option<u8>)> = None;
    let mut count = 0usize;
    let mut pos = 0usize;
    let max_chunk = transport.max_read_len().max(1);

    while pos < expected.len() {
        let chunk_size = std::cmp::min(max_chunk, expected.len() - pos);
        let actual = transport.read(image.offset() + pos as u32, chunk_size)?;
        let expected_chunk = &expected[pos..pos + chunk_size];

        if actual.as_slice() != expected_chunk {
            for (i, &exp) in expected_chunk.iter().enumerate() {
                let got = actual.get(i).copied();
                if got != Some(exp) {
                    count += 1;
                    if first.is_none() {
                        first = Some((pos + i, exp, got));
                    }
                }
            }
        }

        pos += chunk_size;
    }

    Ok(first.map(|(index, expected, actual)| Mismatch {
        image: image.kind(),
        address: image.offset() + index as u32,
        expected,
        actual,
        count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceHandle;
    use crate::image::{FirmwareSet, ImageKind};
    use crate::job::JobFlags;
    use crate::progress::NoProgress;

    /// Flat memory with optional short reads and read failures
    struct Memory {
        data: Vec<u8>,
        short_by: usize,
        fail_reads: bool,
        reads: usize,
    }

    impl Memory {
        fn new(size: usize) -> Self {
            Self {
                data: vec![0xFF; size],
                short_by: 0,
                fail_reads: false,
                reads: 0,
            }
        }
    }

    impl FlashTransport for Memory {
        fn erase(&mut self) -> Result<(), TransportError> {
            self.data.fill(0xFF);
            Ok(())
        }

        fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), TransportError> {
            let start = offset as usize;
            self.data[start..start + data.len()].copy_from_slice(data);
            Ok(())
        }

        fn read(&mut self, offset: u32, len: usize) -> Result<Vec<u8>, TransportError> {
            self.reads += 1;
            if self.fail_reads {
                return Err(TransportError::Timeout(std::time::Duration::from_secs(1)));
            }
            let start = offset as usize;
            let end = start + len.saturating_sub(self.short_by);
            Ok(self.data[start..end].to_vec())
        }
    }

    fn setup(app: Vec<u8>) -> (FirmwareSet, Memory) {
        let set = FirmwareSet::new(vec![
            FirmwareImage::new(ImageKind::Bootloader, 0x1000, vec![0x11; 100]),
            FirmwareImage::new(ImageKind::Application, 0x10000, app),
        ])
        .unwrap();
        let mut mem = Memory::new(0x20000);
        for img in set.images() {
            mem.write(img.offset(), img.data()).unwrap();
        }
        (set, mem)
    }

    fn job(set: &FirmwareSet) -> FlashJob<'_> {
        FlashJob::new(DeviceHandle::new("/dev/ttyUSB0", 115200), set, JobFlags::default())
    }

    #[test]
    fn test_matching_content_passes() {
        let (set, mut mem) = setup((0..10_000u32).map(|i| i as u8).collect());
        let result = verify(&mut mem, &job(&set), &mut NoProgress);
        assert!(result.is_success());
        // 1 chunk for the bootloader, 3 for the 10000 byte application
        assert_eq!(mem.reads, 4);
    }

    #[test]
    fn test_single_byte_difference_is_caught() {
        let app: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
        let (set, mut mem) = setup(app.clone());
        // Flip one byte in the third chunk of the application
        mem.data[0x10000 + 9000] ^= 0x01;

        let result = verify(&mut mem, &job(&set), &mut NoProgress);
        assert_eq!(result.status, JobStatus::VerifyMismatch);
        assert_eq!(result.failed_step, Some(Step::Verify(ImageKind::Application)));

        let m = result.mismatch().unwrap();
        assert_eq!(m.image, ImageKind::Application);
        assert_eq!(m.address, 0x10000 + 9000);
        assert_eq!(m.expected, app[9000]);
        assert_eq!(m.actual, Some(app[9000] ^ 0x01));
        assert_eq!(m.count, 1);
    }

    #[test]
    fn test_short_read_is_a_mismatch() {
        let (set, mut mem) = setup(vec![0x22; 64]);
        mem.short_by = 1;

        let result = verify(&mut mem, &job(&set), &mut NoProgress);
        assert_eq!(result.status, JobStatus::VerifyMismatch);
        let m = result.mismatch().unwrap();
        assert_eq!(m.image, ImageKind::Bootloader);
        assert_eq!(m.address, 0x1000 + 99);
        assert_eq!(m.actual, None);
    }

    #[test]
    fn test_chunk_size_follows_transport() {
        struct WholeImage(Memory);

        impl FlashTransport for WholeImage {
            fn erase(&mut self) -> Result<(), TransportError> {
                self.0.erase()
            }
            fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), TransportError> {
                self.0.write(offset, data)
            }
            fn read(&mut self, offset: u32, len: usize) -> Result<Vec<u8>, TransportError> {
                self.0.read(offset, len)
            }
            fn max_read_len(&self) -> usize {
                usize::MAX
            }
        }

        let app: Vec<u8> = (0..10_000u32).map(|i| (i * 7) as u8).collect();
        let (set, mem) = setup(app);
        let mut whole = WholeImage(mem);
        whole.0.data[0x10000 + 5000] ^= 0xFF;

        let result = verify(&mut whole, &job(&set), &mut NoProgress);
        assert_eq!(result.status, JobStatus::VerifyMismatch);
        assert_eq!(result.mismatch().unwrap().address, 0x10000 + 5000);
        // One read per image
        assert_eq!(whole.0.reads, 2);
    }

    #[test]
    fn test_read_failure_is_unreachable() {
        let (set, mut mem) = setup(vec![0x22; 64]);
        mem.fail_reads = true;

        let result = verify(&mut mem, &job(&set), &mut NoProgress);
        assert_eq!(result.status, JobStatus::DeviceUnreachable);
        assert_eq!(result.failed_step, Some(Step::Verify(ImageKind::Bootloader)));
    }
}
