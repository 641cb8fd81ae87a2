//! Pi-Cam-Shutter: viewfinder-to-still camera capture with external triggers
//!
//! The capture loop streams a low-resolution viewfinder, and switches the
//! camera into still mode when a timeout elapses, a key is pressed or a GPIO
//! shutter button reads active. Device access goes through the [`Camera`]
//! trait so the loop can run against real V4L2 hardware or a mock.

pub mod app;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod gpio;
pub mod keyboard;
pub mod output;
pub mod preview;
pub mod traits;
pub mod trigger;

#[cfg(test)]
pub mod mock;

pub use app::{CaptureApp, CaptureOptions, RunSummary};
pub use device::{DeviceSettings, V4L2Camera};
pub use error::AppError;
pub use gpio::{GpioBackend, GpioButton, InputLine, Level, LineProvider, LineRequest};
pub use keyboard::{KeySource, TerminalKeyReader};
pub use output::{Destination, FileSink, MetadataFormat, OutputSink};
pub use traits::{Camera, CameraError, CaptureMode, DeviceMessage, Frame, FrameMetadata, StreamInfo};
