//! Option resolution.
//!
//! Values come from the command line first, then from an optional TOML
//! config file, then from built-in defaults.
//!
//! ```toml
//! [capture]
//! output = "capture%04d.jpg"
//! timeout = 5000
//! trigger_key = "c"
//!
//! [metadata]
//! path = "-"
//! format = "txt"
//!
//! [device]
//! index = 0
//! encoding = "mjpg"
//!
//! [gpio]
//! backend = "cdev"
//! chip = "gpiochip0"
//! line = 17
//! ```

use crate::app::CaptureOptions;
use crate::cli::Args;
use crate::device::DeviceSettings;
use crate::gpio::{GpioBackend, LineRequest};
use crate::output::{Destination, MetadataFormat, MetadataTarget};
use crate::traits::{Format, FourCC};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest per-frame timeout the driver poll accepts, in milliseconds.
pub const MAX_FRAME_TIMEOUT_MS: u64 = 2_147_483_647; // i32::MAX

/// Errors raised while resolving options.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No output path on the command line or in the config file.
    #[error("output file name required")]
    MissingOutput,
    /// The trigger key must be a single ASCII character.
    #[error("trigger key {0:?} is not an ASCII character")]
    InvalidTriggerKey(char),
    /// The per-frame device timeout must be between 1 ms and `i32::MAX` ms.
    #[error("frame timeout of {0} ms is out of range (1..={max})", max = MAX_FRAME_TIMEOUT_MS)]
    InvalidFrameTimeout(u64),
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
}

/// Still-mode pixel encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Motion JPEG; every buffer is a JPEG file.
    #[default]
    Mjpg,
    /// Packed YUV 4:2:2, written raw.
    Yuyv,
}

impl Encoding {
    /// The V4L2 pixel format for this encoding.
    pub const fn fourcc(self) -> FourCC {
        match self {
            Self::Mjpg => FourCC::MJPG,
            Self::Yuyv => FourCC::YUYV,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CaptureSection {
    output: Option<String>,
    timeout: Option<u64>,
    trigger_key: Option<char>,
    max_restarts: Option<u32>,
    verbose: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataSection {
    path: Option<String>,
    format: Option<MetadataFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct DeviceSection {
    index: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    viewfinder_width: Option<u32>,
    viewfinder_height: Option<u32>,
    encoding: Option<Encoding>,
    frame_timeout: Option<u64>,
    buffer_count: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct GpioSection {
    backend: Option<GpioBackend>,
    chip: Option<String>,
    line: Option<u32>,
    active_low: Option<bool>,
}

/// Contents of a config file. Every table and key is optional.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    capture: CaptureSection,
    #[serde(default)]
    metadata: MetadataSection,
    #[serde(default)]
    device: DeviceSection,
    #[serde(default)]
    gpio: GpioSection,
}

impl FileConfig {
    /// Load and parse a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse config file text.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// Fully resolved program options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Still destination, possibly with a `%d` counter.
    pub output: Destination,
    /// Capture timeout. `None` disables the timeout trigger.
    pub timeout: Option<Duration>,
    /// Metadata destination and format.
    pub metadata: Option<MetadataTarget>,
    /// Log verbosity, 0 (quiet) to 3 (trace).
    pub verbose: u8,
    /// Key that requests a capture.
    pub trigger_key: u8,
    /// Consecutive device timeouts tolerated. `None` is unlimited.
    pub max_restarts: Option<u32>,
    /// Camera device settings.
    pub device: DeviceSettings,
    /// GPIO binding.
    pub gpio_backend: GpioBackend,
    /// Shutter button line.
    pub gpio: LineRequest,
}

impl Options {
    /// Resolve options from parsed arguments, loading `--config` if given.
    pub fn resolve(args: &Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    /// Combine command line and file values. The command line wins.
    pub fn merge(args: &Args, file: FileConfig) -> Result<Self, ConfigError> {
        let FileConfig {
            capture,
            metadata,
            device,
            gpio,
        } = file;

        let output = args
            .output
            .as_deref()
            .or(capture.output.as_deref())
            .filter(|output| !output.is_empty())
            .map(Destination::from)
            .ok_or(ConfigError::MissingOutput)?;

        let timeout = args
            .timeout
            .or(capture.timeout)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        let trigger_key = args.trigger_key.or(capture.trigger_key).unwrap_or('c');
        let trigger_key = u8::try_from(trigger_key)
            .ok()
            .filter(u8::is_ascii)
            .ok_or(ConfigError::InvalidTriggerKey(trigger_key))?;

        let metadata = args
            .metadata
            .as_deref()
            .or(metadata.path.as_deref())
            .filter(|path| !path.is_empty())
            .map(|path| MetadataTarget {
                destination: Destination::from(path),
                format: args.metadata_format.or(metadata.format).unwrap_or_default(),
            });

        let defaults = DeviceSettings::default();
        let frame_timeout = match args.frame_timeout.or(device.frame_timeout) {
            Some(ms) if ms == 0 || ms > MAX_FRAME_TIMEOUT_MS => {
                return Err(ConfigError::InvalidFrameTimeout(ms));
            }
            Some(ms) => Duration::from_millis(ms),
            None => defaults.frame_timeout,
        };
        let encoding = args.encoding.or(device.encoding).unwrap_or_default();
        let device = DeviceSettings {
            index: args.camera.or(device.index).unwrap_or(defaults.index),
            viewfinder: Format::new(
                args.viewfinder_width
                    .or(device.viewfinder_width)
                    .unwrap_or(defaults.viewfinder.width),
                args.viewfinder_height
                    .or(device.viewfinder_height)
                    .unwrap_or(defaults.viewfinder.height),
                defaults.viewfinder.fourcc,
            ),
            still: Format::new(
                args.width.or(device.width).unwrap_or(defaults.still.width),
                args.height.or(device.height).unwrap_or(defaults.still.height),
                encoding.fourcc(),
            ),
            buffer_count: args
                .buffer_count
                .or(device.buffer_count)
                .unwrap_or(defaults.buffer_count)
                .max(1),
            frame_timeout,
        };

        let line_defaults = LineRequest::default();
        let gpio_request = LineRequest {
            chip: args
                .gpio_chip
                .clone()
                .or(gpio.chip)
                .unwrap_or(line_defaults.chip),
            offset: args.gpio_line.or(gpio.line).unwrap_or(line_defaults.offset),
            active_low: args.gpio_active_low || gpio.active_low.unwrap_or(false),
        };

        Ok(Self {
            output,
            timeout,
            metadata,
            verbose: args.verbose.or(capture.verbose).unwrap_or(1),
            trigger_key,
            max_restarts: args.max_restarts.or(capture.max_restarts),
            device,
            gpio_backend: args.gpio_backend.or(gpio.backend).unwrap_or_default(),
            gpio: gpio_request,
        })
    }

    /// The subset of options the capture loop needs.
    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            output: self.output.clone(),
            metadata: self.metadata.clone(),
            timeout: self.timeout,
            trigger_key: self.trigger_key,
            max_restarts: self.max_restarts,
        }
    }

    /// `log` filter matching the verbosity level.
    pub const fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}
