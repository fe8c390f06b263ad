//! Firmware images and the firmware directory
//!
//! A firmware directory holds exactly three files: `bootloader.bin`,
//! `partitions.bin` and `firmware.bin`. They are read once per run into a
//! [`FirmwareSet`] and shared, read-only, by every device of the batch.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::layout::FlashLayout;

/// The three kinds of image written to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImageKind {
    /// Second stage bootloader
    Bootloader,
    /// Partition table
    PartitionTable,
    /// Application firmware
    Application,
}

impl ImageKind {
    /// Order in which images are written
    pub const WRITE_ORDER: [ImageKind; 3] = [
        ImageKind::Bootloader,
        ImageKind::PartitionTable,
        ImageKind::Application,
    ];

    /// File name of this image inside the firmware directory
    pub fn file_name(self) -> &'static str {
        match self {
            ImageKind::Bootloader => "bootloader.bin",
            ImageKind::PartitionTable => "partitions.bin",
            ImageKind::Application => "firmware.bin",
        }
    }

    /// Short human-readable name
    pub fn name(self) -> &'static str {
        match self {
            ImageKind::Bootloader => "bootloader",
            ImageKind::PartitionTable => "partitions",
            ImageKind::Application => "application",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A binary blob destined for a fixed flash offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    kind: ImageKind,
    offset: u32,
    data: Vec<u8>,
    source: Option<PathBuf>,
}

impl FirmwareImage {
    /// Create an image from bytes already in memory
    pub fn new(kind: ImageKind, offset: u32, data: Vec<u8>) -> Self {
        Self {
            kind,
            offset,
            data,
            source: None,
        }
    }

    /// Read an image from a file
    pub fn from_file(kind: ImageKind, offset: u32, path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if data.is_empty() {
            return Err(ConfigError::EmptyImage(path.to_path_buf()));
        }
        Ok(Self {
            kind,
            offset,
            data,
            source: Some(path.to_path_buf()),
        })
    }

    /// Image kind
    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    /// Target flash offset
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Image contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Image length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// First address past the end of the image
    pub fn end(&self) -> u64 {
        self.offset as u64 + self.data.len() as u64
    }

    /// File the image was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

/// The images written to every device of a batch, in write order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirmwareSet {
    images: Vec<FirmwareImage>,
}

impl FirmwareSet {
    /// A set with no images (erase-only runs)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set from images, sorting them into write order and checking
    /// that they do not overlap
    pub fn new(mut images: Vec<FirmwareImage>) -> Result<Self, ConfigError> {
        images.sort_by_key(|img| img.kind);

        if let Some(img) = images.iter().find(|img| img.end() > u32::MAX as u64 + 1) {
            return Err(ConfigError::BeyondAddressSpace {
                image: img.kind.file_name(),
                offset: img.offset,
                end: img.end(),
            });
        }

        for pair in images.windows(2) {
            let (lo, hi) = (&pair[0], &pair[1]);
            if lo.offset >= hi.offset {
                return Err(ConfigError::UnorderedLayout(format!(
                    "{} at 0x{:X} is not below {} at 0x{:X}",
                    lo.kind, lo.offset, hi.kind, hi.offset
                )));
            }
            if lo.end() > hi.offset as u64 {
                return Err(ConfigError::OverlappingImages {
                    first: lo.kind.file_name(),
                    first_start: lo.offset,
                    first_end: lo.end(),
                    second: hi.kind.file_name(),
                    second_start: hi.offset,
                });
            }
        }

        Ok(Self { images })
    }

    /// Load `bootloader.bin`, `partitions.bin` and `firmware.bin` from a
    /// directory, placing them according to `layout`
    pub fn load_dir(dir: &Path, layout: &FlashLayout) -> Result<Self, ConfigError> {
        if !dir.exists() {
            return Err(ConfigError::FirmwareDirNotFound(dir.to_path_buf()));
        }
        if !dir.is_dir() {
            return Err(ConfigError::NotADirectory(dir.to_path_buf()));
        }

        // Report every missing file before reading any of them
        for kind in ImageKind::WRITE_ORDER {
            if !dir.join(kind.file_name()).is_file() {
                return Err(ConfigError::MissingImage {
                    file: kind.file_name(),
                    dir: dir.to_path_buf(),
                });
            }
        }

        let mut images = Vec::with_capacity(ImageKind::WRITE_ORDER.len());
        for kind in ImageKind::WRITE_ORDER {
            let path = dir.join(kind.file_name());
            let image = FirmwareImage::from_file(kind, layout.offset_of(kind), &path)?;
            log::debug!(
                "Loaded {} ({} bytes) for offset 0x{:08X}",
                path.display(),
                image.len(),
                image.offset()
            );
            images.push(image);
        }

        let set = Self::new(images)?;

        if let Some(flash_size) = layout.flash_size {
            if let Some(img) = set.images.iter().find(|img| img.end() > flash_size as u64) {
                return Err(ConfigError::ImageTooLarge {
                    image: img.kind.file_name(),
                    end: img.end(),
                    flash_size,
                });
            }
        }

        Ok(set)
    }

    /// Images in write order
    pub fn images(&self) -> &[FirmwareImage] {
        &self.images
    }

    /// Look up an image by kind
    pub fn get(&self, kind: ImageKind) -> Option<&FirmwareImage> {
        self.images.iter().find(|img| img.kind == kind)
    }

    /// Number of images
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether the set has no images
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Total number of bytes across all images
    pub fn total_bytes(&self) -> usize {
        self.images.iter().map(FirmwareImage::len).sum()
    }
}
