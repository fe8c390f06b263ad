//! Running the esptool command line flasher
//!
//! Every primitive is one esptool invocation. The child's stdout and stderr
//! are drained by reader threads and forwarded to the log line by line while
//! the calling thread polls for exit and enforces the step deadline.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use fleetflash_core::config::DEFAULT_STEP_TIMEOUT;
use fleetflash_core::{DeviceHandle, TransportError};

use crate::error::EsptoolError;

/// Default settle delay after a hard reset
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(5);

/// How often the child is polled for exit
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Output lines kept for classifying a failure
const TAIL_LINES: usize = 64;

/// How esptool is invoked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsptoolOptions {
    /// Executable to run
    pub program: String,
    /// Arguments placed before esptool's own (e.g. `-m esptool` for python)
    pub program_args: Vec<String>,
    /// Target chip
    pub chip: String,
    /// Reset mode before the command
    pub before: String,
    /// Reset mode after the command
    pub after: String,
    /// SPI flash mode for writes
    pub flash_mode: String,
    /// SPI flash frequency for writes
    pub flash_freq: String,
    /// Flash size in bytes, detected by esptool if `None`
    pub flash_size: Option<u32>,
    /// Deadline for one invocation
    pub step_timeout: Duration,
    /// Pause after erase and write while the board reboots
    pub settle: Duration,
}

impl Default for EsptoolOptions {
    fn default() -> Self {
        Self {
            program: "esptool.py".to_string(),
            program_args: Vec::new(),
            chip: "esp32".to_string(),
            before: "default_reset".to_string(),
            after: "hard_reset".to_string(),
            flash_mode: "dio".to_string(),
            flash_freq: "40m".to_string(),
            flash_size: None,
            step_timeout: DEFAULT_STEP_TIMEOUT,
            settle: DEFAULT_SETTLE,
        }
    }
}

impl EsptoolOptions {
    /// Set the program from a command line such as `python3 -m esptool`
    pub fn with_command(mut self, command: &str) -> Self {
        let mut words = command.split_whitespace().map(str::to_string);
        if let Some(program) = words.next() {
            self.program = program;
            self.program_args = words.collect();
        }
        self
    }
}

/// One esptool operation
#[derive(Debug, Clone, Copy)]
pub enum EsptoolCommand<'a> {
    /// `erase_flash`
    EraseFlash,
    /// `write_flash` of one file
    WriteFlash {
        /// Target offset
        offset: u32,
        /// File holding the data
        file: &'a Path,
    },
    /// `read_flash` into a file
    ReadFlash {
        /// Start offset
        offset: u32,
        /// Number of bytes
        len: usize,
        /// Destination file
        file: &'a Path,
    },
}

/// esptool's name for a flash size, e.g. `4MB`
pub fn flash_size_arg(size: Option<u32>) -> String {
    const MIB: u32 = 1024 * 1024;
    match size {
        Some(size) if size >= MIB && size % MIB == 0 => format!("{}MB", size / MIB),
        Some(size) if size % 1024 == 0 => format!("{}KB", size / 1024),
        _ => "detect".to_string(),
    }
}

/// Map a failed invocation to a transport error
///
/// `tail` holds the last lines the tool printed.
pub fn classify_failure(code: Option<i32>, tail: &[String]) -> TransportError {
    let last = tail
        .iter()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| match code {
            Some(code) => format!("esptool exited with status {}", code),
            None => "esptool was terminated by a signal".to_string(),
        });

    let text = tail.join("\n").to_lowercase();

    if contains_any(&text, &["md5 of file does not match", "checksum", "md5 mismatch"]) {
        TransportError::ChecksumMismatch(last)
    } else if contains_any(
        &text,
        &[
            "could not open port",
            "failed to connect",
            "device disconnected",
            "device not configured",
            "serial exception",
            "port is closed",
            "no serial data received",
        ],
    ) {
        TransportError::Disconnected(last)
    } else {
        TransportError::Rejected(last)
    }
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

fn forward_lines(pipe: impl Read, tx: Sender<String>) {
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        // Progress updates are separated by carriage returns
        let text = String::from_utf8_lossy(&buf);
        for line in text.split(['\r', '\n']).filter(|l| !l.is_empty()) {
            if tx.send(line.to_string()).is_err() {
                return;
            }
        }
    }
}

/// Runs esptool for one device at a time
#[derive(Debug, Clone, Default)]
pub struct Esptool {
    options: EsptoolOptions,
}

impl Esptool {
    /// Create a runner with the given options
    pub fn new(options: EsptoolOptions) -> Self {
        Self { options }
    }

    /// The options in use
    pub fn options(&self) -> &EsptoolOptions {
        &self.options
    }

    /// Full argument list for `command` on `device`, program excluded
    pub fn args(&self, device: &DeviceHandle, command: EsptoolCommand<'_>) -> Vec<OsString> {
        let o = &self.options;
        let baud = device.baud_rate.to_string();
        let global: [&str; 10] = [
            "--chip",
            &o.chip,
            "--port",
            &device.port,
            "--baud",
            &baud,
            "--before",
            &o.before,
            "--after",
            &o.after,
        ];

        let mut args: Vec<OsString> = o.program_args.iter().map(OsString::from).collect();
        args.extend(global.iter().map(OsString::from));

        match command {
            EsptoolCommand::EraseFlash => args.push("erase_flash".into()),
            EsptoolCommand::WriteFlash { offset, file } => {
                let size = flash_size_arg(o.flash_size);
                let write: [&str; 8] = [
                    "write_flash",
                    "-z",
                    "--flash_mode",
                    &o.flash_mode,
                    "--flash_freq",
                    &o.flash_freq,
                    "--flash_size",
                    &size,
                ];
                args.extend(write.iter().map(OsString::from));
                args.push(format!("0x{:X}", offset).into());
                args.push(file.into());
            }
            EsptoolCommand::ReadFlash { offset, len, file } => {
                args.push("read_flash".into());
                args.push(format!("0x{:X}", offset).into());
                args.push(len.to_string().into());
                args.push(file.into());
            }
        }
        args
    }

    /// Run `command` against `device` and wait for it to finish
    pub fn run(&self, device: &DeviceHandle, command: EsptoolCommand<'_>) -> Result<(), TransportError> {
        let args = self.args(device, command);
        log::debug!(
            "Executing: {} {}",
            self.options.program,
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let mut child = Command::new(&self.options.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EsptoolError::Spawn {
                program: self.options.program.clone(),
                source,
            })?;

        let (tx, rx) = mpsc::channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            let tx = tx.clone();
            readers.push(thread::spawn(move || forward_lines(stdout, tx)));
        }
        if let Some(stderr) = child.stderr.take() {
            let tx = tx.clone();
            readers.push(thread::spawn(move || forward_lines(stderr, tx)));
        }
        drop(tx);

        let timeout = self.options.step_timeout;
        let deadline = Instant::now() + timeout;
        let mut tail: VecDeque<String> = VecDeque::with_capacity(TAIL_LINES);
        let mut keep = |line: String| {
            log::debug!("{}: {}", device.port, line);
            if tail.len() == TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        };

        let status = loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => keep(line),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => thread::sleep(POLL_INTERVAL),
            }

            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                log::error!("{}: esptool did not finish within {:?}, killing it", device.port, timeout);
                // The child may have exited in the meantime
                let _ = child.kill();
                let _ = child.wait();
                return Err(TransportError::Timeout(timeout));
            }
        };

        for reader in readers {
            let _ = reader.join();
        }
        for line in rx.try_iter() {
            keep(line);
        }

        if status.success() {
            Ok(())
        } else {
            let tail: Vec<String> = tail.into_iter().collect();
            Err(classify_failure(status.code(), &tail))
        }
    }

    /// Wait for the board to come back after a hard reset
    pub fn settle(&self, device: &DeviceHandle) {
        if self.options.settle.is_zero() {
            return;
        }
        log::debug!("{}: waiting {:?} for the board to reboot", device.port, self.options.settle);
        thread::sleep(self.options.settle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceHandle {
        DeviceHandle::new("/dev/ttyUSB0", 460800)
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Runner whose "esptool" is a shell snippet
    #[cfg(unix)]
    fn shell(script: &str, timeout: Duration) -> Esptool {
        Esptool::new(EsptoolOptions {
            program: "sh".to_string(),
            program_args: vec!["-c".to_string(), script.to_string(), "esptool".to_string()],
            step_timeout: timeout,
            settle: Duration::ZERO,
            ..EsptoolOptions::default()
        })
    }

    #[test]
    fn test_erase_args() {
        let tool = Esptool::default();
        assert_eq!(
            strings(tool.args(&device(), EsptoolCommand::EraseFlash)),
            [
                "--chip",
                "esp32",
                "--port",
                "/dev/ttyUSB0",
                "--baud",
                "460800",
                "--before",
                "default_reset",
                "--after",
                "hard_reset",
                "erase_flash"
            ]
        );
    }

    #[test]
    fn test_write_and_read_args() {
        let tool = Esptool::new(EsptoolOptions::default().with_command("python3 -m esptool"));
        assert_eq!(tool.options().program, "python3");

        let file = Path::new("/tmp/image.bin");
        let args = strings(tool.args(&device(), EsptoolCommand::WriteFlash { offset: 0x10000, file }));
        assert_eq!(&args[..2], ["-m", "esptool"]);
        assert_eq!(
            &args[12..],
            [
                "write_flash",
                "-z",
                "--flash_mode",
                "dio",
                "--flash_freq",
                "40m",
                "--flash_size",
                "detect",
                "0x10000",
                "/tmp/image.bin"
            ]
        );

        let args = strings(tool.args(
            &device(),
            EsptoolCommand::ReadFlash {
                offset: 0x1000,
                len: 4096,
                file,
            },
        ));
        assert_eq!(&args[12..], ["read_flash", "0x1000", "4096", "/tmp/image.bin"]);
    }

    #[test]
    fn test_flash_size_arg() {
        assert_eq!(flash_size_arg(None), "detect");
        assert_eq!(flash_size_arg(Some(4 * 1024 * 1024)), "4MB");
        assert_eq!(flash_size_arg(Some(512 * 1024)), "512KB");
        assert_eq!(flash_size_arg(Some(1000)), "detect");
    }

    #[test]
    fn test_classify_failure() {
        let lines = |s: &[&str]| s.iter().map(|l| l.to_string()).collect::<Vec<_>>();

        let err = classify_failure(
            Some(2),
            &lines(&[
                "Serial port /dev/ttyUSB0",
                "A fatal error occurred: Failed to connect to ESP32: No serial data received.",
            ]),
        );
        assert!(matches!(err, TransportError::Disconnected(_)));

        let err = classify_failure(
            Some(2),
            &lines(&["A fatal error occurred: could not open port /dev/ttyUSB9: [Errno 2] No such file or directory"]),
        );
        assert!(err.is_disconnect());

        let err = classify_failure(
            Some(2),
            &lines(&["Hash of data verified.", "A fatal error occurred: MD5 of file does not match data in flash!"]),
        );
        assert!(matches!(err, TransportError::ChecksumMismatch(_)));

        let err = classify_failure(Some(1), &lines(&["A fatal error occurred: Invalid head of packet", ""]));
        assert_eq!(
            err,
            TransportError::Rejected("A fatal error occurred: Invalid head of packet".to_string())
        );

        assert_eq!(
            classify_failure(Some(3), &[]),
            TransportError::Rejected("esptool exited with status 3".to_string())
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_run_success_and_failure() {
        let ok = shell("echo 'Chip erase completed successfully'", Duration::from_secs(10));
        assert!(ok.run(&device(), EsptoolCommand::EraseFlash).is_ok());

        let gone = shell(
            "echo 'A fatal error occurred: Failed to connect to ESP32' >&2; exit 2",
            Duration::from_secs(10),
        );
        let err = gone.run(&device(), EsptoolCommand::EraseFlash).unwrap_err();
        assert!(err.is_disconnect());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_timeout() {
        let slow = shell("sleep 5", Duration::from_millis(200));
        let started = Instant::now();
        let err = slow.run(&device(), EsptoolCommand::EraseFlash).unwrap_err();
        assert_eq!(err, TransportError::Timeout(Duration::from_millis(200)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_missing_program() {
        let tool = Esptool::new(EsptoolOptions {
            program: "fleetflash-no-such-esptool".to_string(),
            ..EsptoolOptions::default()
        });
        let err = tool.run(&device(), EsptoolCommand::EraseFlash).unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
