//! Flash layout: where each firmware image goes
//!
//! The default layout is the one used for ESP32 boards. A layout can also be
//! loaded from a TOML file:
//!
//! ```toml
//! [layout]
//! name = "esp32 default"
//! flash_size = "4 MiB"
//!
//! [offsets]
//! bootloader = 0x1000
//! partitions = 0x8000
//! application = 0x10000
//! ```

use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::image::ImageKind;

/// Default bootloader offset for ESP32
pub const DEFAULT_BOOTLOADER_OFFSET: u32 = 0x1000;
/// Default partition table offset for ESP32
pub const DEFAULT_PARTITIONS_OFFSET: u32 = 0x8000;
/// Default application offset for ESP32
pub const DEFAULT_APPLICATION_OFFSET: u32 = 0x10000;

/// Target flash offset of every image kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashLayout {
    /// Optional human-readable name
    pub name: Option<String>,
    /// Flash size, if known up front
    pub flash_size: Option<u32>,
    /// Bootloader offset
    pub bootloader: u32,
    /// Partition table offset
    pub partitions: u32,
    /// Application offset
    pub application: u32,
}

impl Default for FlashLayout {
    fn default() -> Self {
        Self {
            name: None,
            flash_size: None,
            bootloader: DEFAULT_BOOTLOADER_OFFSET,
            partitions: DEFAULT_PARTITIONS_OFFSET,
            application: DEFAULT_APPLICATION_OFFSET,
        }
    }
}

impl FlashLayout {
    /// Offset at which an image kind is written
    pub fn offset_of(&self, kind: ImageKind) -> u32 {
        match kind {
            ImageKind::Bootloader => self.bootloader,
            ImageKind::PartitionTable => self.partitions,
            ImageKind::Application => self.application,
        }
    }

    /// Check that offsets strictly increase in write order
    pub fn validate(&self) -> Result<(), ConfigError> {
        for pair in ImageKind::WRITE_ORDER.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if self.offset_of(lo) >= self.offset_of(hi) {
                return Err(ConfigError::UnorderedLayout(format!(
                    "{} at 0x{:X} is not below {} at 0x{:X}",
                    lo.file_name(),
                    self.offset_of(lo),
                    hi.file_name(),
                    self.offset_of(hi)
                )));
            }
        }
        if let Some(size) = self.flash_size {
            let last = ImageKind::Application;
            if self.offset_of(last) >= size {
                return Err(ConfigError::UnorderedLayout(format!(
                    "{} offset 0x{:X} is beyond the {} byte flash",
                    last.file_name(),
                    self.offset_of(last),
                    size
                )));
            }
        }
        Ok(())
    }

    /// Load a layout from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a layout from a TOML string
    ///
    /// Offsets missing from the file keep their default value.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: TomlLayoutFile =
            toml::from_str(content).map_err(|e| ConfigError::Layout(e.to_string()))?;

        let mut layout = FlashLayout::default();

        if let Some(meta) = file.layout {
            layout.name = meta.name;
            layout.flash_size = meta.flash_size;
        }

        if let Some(offsets) = file.offsets {
            if let Some(v) = offsets.bootloader {
                layout.bootloader = v;
            }
            if let Some(v) = offsets.partitions {
                layout.partitions = v;
            }
            if let Some(v) = offsets.application {
                layout.application = v;
            }
        }

        layout.validate()?;
        Ok(layout)
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlLayoutFile {
    layout: Option<TomlLayoutMeta>,
    offsets: Option<TomlOffsets>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlLayoutMeta {
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_size")]
    flash_size: Option<u32>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlOffsets {
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    bootloader: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    partitions: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    application: Option<u32>,
}

/// Deserialize a u32 that can be a TOML integer or a hex/decimal string
fn deserialize_opt_hex_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_int_or(deserializer, parse_number)
}

/// Deserialize a size that can be a TOML integer or a size string
fn deserialize_opt_size<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_int_or(deserializer, parse_size)
}

fn deserialize_int_or<'de, D>(
    deserializer: D,
    parse: fn(&str) -> Result<u32, String>,
) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexOrInt {
        Int(u32),
        Str(String),
    }

    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(Some(n)),
        HexOrInt::Str(s) => parse(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parse a number that can be hex (0x...) or decimal
pub fn parse_number(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

/// Parse a size string like "4 MiB", "0x400000" or "4096"
pub fn parse_size(s: &str) -> Result<u32, String> {
    let s = s.trim();

    if let Ok(n) = parse_number(s) {
        return Ok(n);
    }

    let s_lower = s.to_lowercase();
    let (num_str, multiplier) = if let Some(n) = s_lower.strip_suffix("mib") {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = s_lower.strip_suffix("mb") {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = s_lower.strip_suffix("kib") {
        (n.trim(), 1024)
    } else if let Some(n) = s_lower.strip_suffix("kb") {
        (n.trim(), 1024)
    } else if let Some(n) = s_lower.strip_suffix('b') {
        (n.trim(), 1)
    } else {
        return Err(format!("invalid size: {}", s));
    };

    let num: u32 = num_str.parse().map_err(|_| format!("invalid size: {}", s))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size too large: {}", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_is_valid() {
        let layout = FlashLayout::default();
        assert!(layout.validate().is_ok());
        assert_eq!(layout.offset_of(ImageKind::Bootloader), 0x1000);
        assert_eq!(layout.offset_of(ImageKind::PartitionTable), 0x8000);
        assert_eq!(layout.offset_of(ImageKind::Application), 0x10000);
    }

    #[test]
    fn test_parse_toml_layout() {
        let layout = FlashLayout::from_toml_str(
            r#"
            [layout]
            name = "s3"
            flash_size = "8 MiB"

            [offsets]
            bootloader = 0x0
            partitions = "0x8000"
            application = 65536
            "#,
        )
        .unwrap();

        assert_eq!(layout.name.as_deref(), Some("s3"));
        assert_eq!(layout.flash_size, Some(8 * 1024 * 1024));
        assert_eq!(layout.bootloader, 0);
        assert_eq!(layout.partitions, 0x8000);
        assert_eq!(layout.application, 0x10000);
    }

    #[test]
    fn test_partial_offsets_keep_defaults() {
        let layout = FlashLayout::from_toml_str("[offsets]\napplication = 0x20000\n").unwrap();
        assert_eq!(layout.bootloader, DEFAULT_BOOTLOADER_OFFSET);
        assert_eq!(layout.application, 0x20000);
    }

    #[test]
    fn test_unordered_layout_rejected() {
        let err = FlashLayout::from_toml_str("[offsets]\npartitions = 0x20000\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnorderedLayout(_)));
    }

    #[test]
    fn test_integer_flash_size() {
        let layout = FlashLayout::from_toml_str("[layout]\nflash_size = 4194304\n").unwrap();
        assert_eq!(layout.flash_size, Some(4 * 1024 * 1024));

        let err = FlashLayout::from_toml_str("[layout]\nflash_size = \"lots\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Layout(_)));
    }

    #[test]
    fn test_unknown_layout_key_rejected() {
        let err = FlashLayout::from_toml_str("[layout]\nflash_sise = \"4 MiB\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Layout(_)));
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Ok(4096));
        assert_eq!(parse_size("0x1000"), Ok(4096));
        assert_eq!(parse_size("4 KiB"), Ok(4096));
        assert_eq!(parse_size("4MiB"), Ok(4 * 1024 * 1024));
        assert!(parse_size("four").is_err());
    }
}
