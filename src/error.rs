//! Top-level error type.

use crate::config::ConfigError;
use crate::gpio::GpioError;
use crate::output::OutputError;
use crate::traits::CameraError;

/// Anything that ends the program with a non-zero status.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Bad options or config file.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Device failure.
    #[error(transparent)]
    Camera(#[from] CameraError),
    /// Shutter button failure.
    #[error(transparent)]
    Gpio(#[from] GpioError),
    /// Saving a still failed.
    #[error(transparent)]
    Output(#[from] OutputError),
    /// The device produced a message the loop does not handle.
    #[error("unrecognised message: {0}")]
    UnrecognizedMessage(String),
    /// Too many device timeouts in a row.
    #[error("device timed out more than {0} times in a row")]
    RestartLimit(u32),
    /// The ctrl-c handler could not be installed.
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// The single line printed to stderr before a non-zero exit.
pub fn diagnostic<E: std::fmt::Display>(err: &E) -> String {
    format!("ERROR: *** {err} ***")
}
