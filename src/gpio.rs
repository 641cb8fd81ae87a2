//! Shutter button input on a single GPIO line.
//!
//! Three interchangeable backends sit behind [`InputLine`]:
//!
//! * `cdev` - the GPIO character device through `gpiocdev` (feature `gpio-cdev`)
//! * `sysfs` - the legacy `/sys/class/gpio` export interface
//! * `disabled` - a stub that always reads inactive
//!
//! [`GpioButton`] owns whichever line was acquired and releases it exactly
//! once, either explicitly or on drop.

use log::{debug, warn};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default sysfs GPIO root.
pub const SYSFS_ROOT: &str = "/sys/class/gpio";

/// Consumer label attached to requested lines.
pub const CONSUMER: &str = "pi-cam-shutter";

/// Logic level of an input line, after active-low inversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// The line is asserted.
    Active,
    /// The line is not asserted.
    Inactive,
}

/// Errors raised while acquiring, reading or releasing a line.
#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    /// The chip or line could not be requested.
    #[error("Failed to acquire GPIO line {offset} on {chip}: {reason}")]
    Acquire {
        /// Chip identifier as given by the user.
        chip: String,
        /// Line offset on the chip.
        offset: u32,
        /// Backend-specific reason.
        reason: String,
    },
    /// The selected backend was not compiled in.
    #[error("GPIO backend '{0}' is not available in this build")]
    BackendUnavailable(GpioBackend),
    /// Reading the line failed.
    #[error("Failed to read GPIO line: {0}")]
    Read(String),
    /// Releasing the line failed.
    #[error("Failed to release GPIO line: {0}")]
    Release(String),
    /// I/O error.
    #[error("GPIO I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for GPIO operations.
pub type Result<T> = std::result::Result<T, GpioError>;

/// Which GPIO binding to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GpioBackend {
    /// GPIO character device (`/dev/gpiochipN`).
    #[default]
    Cdev,
    /// Legacy sysfs interface.
    Sysfs,
    /// No button; the line always reads inactive.
    Disabled,
}

impl std::fmt::Display for GpioBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cdev => write!(f, "cdev"),
            Self::Sysfs => write!(f, "sysfs"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Which line to request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRequest {
    /// Chip name (`gpiochip0`) or path (`/dev/gpiochip0`).
    pub chip: String,
    /// Line offset on the chip.
    pub offset: u32,
    /// Treat a low electrical level as active.
    pub active_low: bool,
}

impl Default for LineRequest {
    fn default() -> Self {
        Self {
            chip: "gpiochip0".to_owned(),
            offset: 17,
            active_low: false,
        }
    }
}

impl LineRequest {
    fn acquire_error<E: std::fmt::Display>(&self, reason: E) -> GpioError {
        GpioError::Acquire {
            chip: self.chip.clone(),
            offset: self.offset,
            reason: reason.to_string(),
        }
    }

    /// Bare chip name, without any leading directory.
    fn chip_name(&self) -> &str {
        Path::new(&self.chip)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.chip)
    }

    const fn apply_polarity(&self, high: bool) -> Level {
        if high != self.active_low {
            Level::Active
        } else {
            Level::Inactive
        }
    }
}

/// A requested input line.
pub trait InputLine {
    /// Read the current logic level.
    fn read_level(&mut self) -> Result<Level>;

    /// Give the line back to the kernel. Calling this more than once is a no-op.
    fn release(&mut self) -> Result<()>;
}

/// Something that can hand out input lines.
pub trait LineProvider {
    /// Request the line described by `request`.
    fn acquire(&self, request: &LineRequest) -> Result<Box<dyn InputLine>>;
}

impl LineProvider for GpioBackend {
    fn acquire(&self, request: &LineRequest) -> Result<Box<dyn InputLine>> {
        match self {
            #[cfg(feature = "gpio-cdev")]
            Self::Cdev => Ok(Box::new(CdevLine::request(request)?)),
            #[cfg(not(feature = "gpio-cdev"))]
            Self::Cdev => Err(GpioError::BackendUnavailable(*self)),
            Self::Sysfs => Ok(Box::new(SysfsLine::open(Path::new(SYSFS_ROOT), request)?)),
            Self::Disabled => Ok(Box::new(DisabledLine)),
        }
    }
}

/// The shutter button: one acquired line with guaranteed release.
pub struct GpioButton {
    line: Box<dyn InputLine>,
    released: bool,
}

impl GpioButton {
    /// Acquire the button line from `provider`.
    pub fn acquire(provider: &dyn LineProvider, request: &LineRequest) -> Result<Self> {
        let line = provider.acquire(request)?;
        debug!("Acquired GPIO line {} on {}", request.offset, request.chip);
        Ok(Self {
            line,
            released: false,
        })
    }

    /// Read the line level.
    pub fn read_level(&mut self) -> Result<Level> {
        if self.released {
            return Err(GpioError::Read("line already released".to_owned()));
        }
        self.line.read_level()
    }

    /// Whether the button currently reads active.
    pub fn is_pressed(&mut self) -> Result<bool> {
        Ok(self.read_level()? == Level::Active)
    }

    /// Release the line. Only the first call reaches the backend.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.line.release()
    }

    /// Whether the line has been released.
    pub const fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for GpioButton {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("{err}");
        }
    }
}

/// Character-device line requested through `gpiocdev`.
#[cfg(feature = "gpio-cdev")]
pub struct CdevLine {
    request: Option<gpiocdev::Request>,
    offset: u32,
}

#[cfg(feature = "gpio-cdev")]
impl CdevLine {
    /// Request `request.offset` as an input on the chip.
    pub fn request(request: &LineRequest) -> Result<Self> {
        let path = if request.chip.starts_with('/') {
            PathBuf::from(&request.chip)
        } else {
            Path::new("/dev").join(&request.chip)
        };

        let mut builder = gpiocdev::Request::builder();
        builder
            .on_chip(path)
            .with_consumer(CONSUMER)
            .with_line(request.offset)
            .as_input();
        if request.active_low {
            builder.as_active_low();
        }

        // The builder and its line config are dropped on every path out of here.
        let line = builder
            .request()
            .map_err(|err| request.acquire_error(err))?;

        Ok(Self {
            request: Some(line),
            offset: request.offset,
        })
    }
}

#[cfg(feature = "gpio-cdev")]
impl InputLine for CdevLine {
    fn read_level(&mut self) -> Result<Level> {
        let request = self
            .request
            .as_ref()
            .ok_or_else(|| GpioError::Read("line already released".to_owned()))?;
        match request.value(self.offset) {
            Ok(gpiocdev::line::Value::Active) => Ok(Level::Active),
            Ok(gpiocdev::line::Value::Inactive) => Ok(Level::Inactive),
            Err(err) => Err(GpioError::Read(err.to_string())),
        }
    }

    fn release(&mut self) -> Result<()> {
        // Dropping the request closes the line fd.
        self.request.take();
        Ok(())
    }
}

/// Line exported through the legacy sysfs interface.
#[derive(Debug)]
pub struct SysfsLine {
    root: PathBuf,
    number: u32,
    request: LineRequest,
    exported_here: bool,
    released: bool,
}

impl SysfsLine {
    /// Export and configure the line under `root` (normally [`SYSFS_ROOT`]).
    ///
    /// The global line number is the chip's `base` plus the offset. A line that
    /// was already exported by someone else is used as-is and left exported on
    /// release.
    pub fn open(root: &Path, request: &LineRequest) -> Result<Self> {
        let base_path = root.join(request.chip_name()).join("base");
        let base = fs::read_to_string(&base_path)
            .map_err(|err| request.acquire_error(format!("{}: {err}", base_path.display())))?
            .trim()
            .parse::<u32>()
            .map_err(|err| request.acquire_error(format!("{}: {err}", base_path.display())))?;
        let number = base + request.offset;

        let mut line = Self {
            root: root.to_path_buf(),
            number,
            request: request.clone(),
            exported_here: false,
            released: false,
        };

        if !line.line_dir().exists() {
            fs::write(root.join("export"), number.to_string())
                .map_err(|err| request.acquire_error(format!("export gpio{number}: {err}")))?;
            line.exported_here = true;
        }

        if let Err(err) = fs::write(line.line_dir().join("direction"), "in") {
            // Leave nothing half-open.
            if let Err(unexport) = line.release() {
                warn!("{unexport}");
            }
            return Err(request.acquire_error(format!("set gpio{number} direction: {err}")));
        }

        Ok(line)
    }

    fn line_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.number))
    }

    /// Global sysfs line number.
    pub const fn number(&self) -> u32 {
        self.number
    }
}

impl InputLine for SysfsLine {
    fn read_level(&mut self) -> Result<Level> {
        if self.released {
            return Err(GpioError::Read("line already released".to_owned()));
        }
        let raw = fs::read_to_string(self.line_dir().join("value"))?;
        match raw.trim() {
            "0" => Ok(self.request.apply_polarity(false)),
            "1" => Ok(self.request.apply_polarity(true)),
            other => Err(GpioError::Read(format!("unexpected value {other:?}"))),
        }
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        if self.exported_here {
            fs::write(self.root.join("unexport"), self.number.to_string())
                .map_err(|err| GpioError::Release(format!("unexport gpio{}: {err}", self.number)))?;
        }
        Ok(())
    }
}

/// Stand-in for builds or setups without a button.
#[derive(Debug, Default)]
pub struct DisabledLine;

impl InputLine for DisabledLine {
    fn read_level(&mut self) -> Result<Level> {
        Ok(Level::Inactive)
    }

    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}
