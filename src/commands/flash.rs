//! Batch flash command implementation

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Duration;

use fleetflash_core::{
    ConfigError, Connector, DeviceHandle, Discoverer, FirmwareSet, FlashConfig, FlashLayout,
    ImageKind, Orchestrator, SignatureDb, StaticDiscoverer,
};
use fleetflash_dummy::{DummyBench, DummyConfig};
use fleetflash_esptool::{Esptool, EsptoolConnector, EsptoolOptions, SerialDiscoverer};

use super::SpinnerObserver;
use crate::cli::{Backend, FlashArgs};

/// Build the run configuration from the command line
pub fn flash_config(args: &FlashArgs) -> FlashConfig {
    FlashConfig {
        skip_erase: args.skip_erase,
        erase_only: args.erase_only,
        verify: args.verify,
        baud_rate: args.baud,
        step_timeout: Duration::from_secs(args.timeout),
    }
}

/// Load the built-in signatures plus an optional RON file
pub fn load_signatures(path: Option<&Path>) -> Result<SignatureDb, ConfigError> {
    let mut db = SignatureDb::builtin();
    if let Some(path) = path {
        let count = db.load_file(path)?;
        log::info!("Loaded {} signatures from {}", count, path.display());
    }
    Ok(db)
}

/// Load the flash layout, or fall back to the ESP32 default
fn load_layout(path: Option<&Path>) -> Result<FlashLayout, ConfigError> {
    let layout = match path {
        Some(path) => {
            let layout = FlashLayout::from_toml_file(path)?;
            log::info!("Loaded layout from {:?}", path);
            layout
        }
        None => FlashLayout::default(),
    };
    layout.validate()?;
    Ok(layout)
}

/// Whether an answer to the confirmation prompt means yes
fn is_affirmative(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "s" | "sim"
    )
}

/// Ask `question` and read the answer from `input`
///
/// An unreadable answer counts as no.
fn confirm(question: &str, input: &mut dyn BufRead) -> bool {
    print!("{} [y/N] ", question);
    let _ = io::stdout().flush();

    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(_) => is_affirmative(&answer),
        Err(e) => {
            log::warn!("Could not read the answer: {}", e);
            false
        }
    }
}

fn print_images(images: &FirmwareSet) {
    println!("Firmware images:");
    for image in images.images() {
        print!(
            "  {:<12} 0x{:08X}  {} bytes",
            image.kind(),
            image.offset(),
            image.len()
        );
        if image.kind() == ImageKind::Application {
            print!(" ({:.1} KiB)", image.len() as f64 / 1024.0);
        }
        println!();
    }
}

/// Everything loaded from disk before any device is touched
pub struct Inputs {
    /// Validated run configuration
    pub config: FlashConfig,
    /// Flash layout in use
    pub layout: FlashLayout,
    /// Images to flash, empty in erase-only mode
    pub images: FirmwareSet,
    /// Known USB serial bridges
    pub signatures: SignatureDb,
}

impl Inputs {
    /// Validate the arguments and load every input file
    pub fn load(args: &FlashArgs) -> Result<Self, ConfigError> {
        let config = flash_config(args);
        config.validate()?;

        let layout = load_layout(args.layout.as_deref())?;
        let images = if config.erase_only {
            FirmwareSet::empty()
        } else {
            let dir = args
                .firmware_dir
                .as_deref()
                .ok_or(ConfigError::MissingFirmwareDir)?;
            let images = FirmwareSet::load_dir(dir, &layout)?;
            print_images(&images);
            images
        };
        let signatures = load_signatures(args.signatures.as_deref())?;

        Ok(Self {
            config,
            layout,
            images,
            signatures,
        })
    }
}

/// Run the flash command
///
/// Returns whether every device was flashed. Errors returned from here are
/// configuration errors: no device has been touched yet.
pub fn run(args: &FlashArgs) -> Result<bool, Box<dyn std::error::Error>> {
    match args.backend {
        Backend::Esptool => run_with(args, |inputs| {
            let devices = if args.port.is_empty() {
                SerialDiscoverer::new(inputs.signatures.clone(), args.baud).discover()
            } else {
                StaticDiscoverer::from_ports(args.port.iter().cloned(), args.baud).discover()
            };

            let options = EsptoolOptions {
                chip: args.chip.clone(),
                flash_size: inputs.layout.flash_size,
                step_timeout: inputs.config.step_timeout,
                settle: Duration::from_millis(args.settle_ms),
                ..EsptoolOptions::default()
            }
            .with_command(&args.esptool);

            (EsptoolConnector::new(Esptool::new(options)), devices)
        }),
        Backend::Dummy => run_with(args, |inputs| {
            let mut dummy = DummyConfig::default();
            if let Some(size) = inputs.layout.flash_size {
                dummy.size = size as usize;
            }
            let bench = DummyBench::with_boards(args.dummy_devices, dummy, args.baud);
            let devices = if args.port.is_empty() {
                bench.discover()
            } else {
                StaticDiscoverer::from_ports(args.port.iter().cloned(), args.baud).discover()
            };

            (bench, devices)
        }),
    }
}

/// Load the inputs, then open the backend with `open` and flash its devices
///
/// `open` is only called once every input has loaded.
pub fn run_with<C, F>(args: &FlashArgs, open: F) -> Result<bool, Box<dyn std::error::Error>>
where
    C: Connector,
    F: FnOnce(&Inputs) -> (C, Vec<DeviceHandle>),
{
    let inputs = Inputs::load(args)?;
    let (connector, devices) = open(&inputs);
    let mut stdin = io::stdin().lock();
    Ok(flash_devices(connector, devices, &inputs, args.yes, &mut stdin))
}

fn flash_devices<C: Connector>(
    connector: C,
    devices: Vec<DeviceHandle>,
    inputs: &Inputs,
    assume_yes: bool,
    input: &mut dyn BufRead,
) -> bool {
    if devices.is_empty() {
        println!("No devices found. Check the USB connections.");
        return false;
    }

    println!("Found {} device(s):", devices.len());
    for device in &devices {
        println!("  {}", device.describe());
    }

    let config = inputs.config.clone();
    let question = format!("About to {} {} device(s). Continue?", config.action(), devices.len());
    if !assume_yes && !confirm(&question, input) {
        println!("Aborted.");
        return true;
    }

    let mut observer = SpinnerObserver::new();
    let report = Orchestrator::new(connector, config).run_batch(devices, &inputs.images, &mut observer);
    report.all_succeeded()
}
