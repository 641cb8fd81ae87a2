//! Core traits and types for the camera abstraction.

use serde::Serialize;
use std::time::Duration;

/// Pixel format representation (e.g., YUYV, MJPG, RGB3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");

    /// Whether buffers in this format are already JPEG-compressed.
    #[must_use]
    pub fn is_compressed(self) -> bool {
        self == Self::MJPG
    }
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Requested video format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
}

impl Format {
    /// Create a new format specification.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        Self {
            width,
            height,
            fourcc,
        }
    }
}

/// Geometry of the stream a buffer was produced on, as negotiated with the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per line.
    pub stride: u32,
    /// Pixel format.
    pub fourcc: FourCC,
}

/// Streaming mode the device is configured for.
///
/// Exactly one mode is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Continuous low-latency preview frames.
    Viewfinder,
    /// A single high-quality capture frame.
    Still,
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Viewfinder => write!(f, "viewfinder"),
            Self::Still => write!(f, "still"),
        }
    }
}

/// Image-processing platform behind the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// `VideoCore` IV pipeline (Pi 4 and earlier).
    Vc4,
    /// PiSP pipeline (Pi 5). Still capture in this mode skips temporal denoise.
    Pisp,
    /// Anything else, including virtual devices.
    Unknown,
}

impl Platform {
    /// Classify a platform from the kernel driver name.
    #[must_use]
    pub fn from_driver(driver: &str) -> Self {
        match driver {
            "rp1-cfe" | "pispbe" => Self::Pisp,
            "unicam" | "bcm2835-unicam" | "bcm2835-isp" => Self::Vc4,
            _ => Self::Unknown,
        }
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Metadata for a captured frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameMetadata {
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    #[serde(serialize_with = "serialize_micros")]
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
}

fn serialize_micros<S: serde::Serializer>(
    timestamp: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(timestamp.as_micros()).unwrap_or(u64::MAX))
}

/// A completed buffer, copied out of the driver.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw frame data.
    pub data: Vec<u8>,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

/// Event delivered by [`Camera::wait`].
#[derive(Debug, Clone)]
pub enum DeviceMessage {
    /// A buffer completed on the configured stream.
    Completed(Frame),
    /// The driver gave up waiting for a frame. Recoverable by restarting the stream.
    DeviceTimeout,
    /// Shutdown was requested.
    Quit,
    /// The backend produced an event the controller does not understand.
    Unrecognized(String),
}

/// Error type for camera operations.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// Device with given index was not found.
    #[error("Device {0} not found")]
    DeviceNotFound(u32),
    /// Failed to open device.
    #[error("Failed to open device: {0}")]
    DeviceOpenFailed(String),
    /// An operation needed an open device.
    #[error("Device is not open")]
    NotOpen,
    /// An operation needed a configured stream.
    #[error("No stream is configured")]
    NotConfigured,
    /// Configure was called while a stream still existed.
    #[error("Stream for {0} mode must be torn down before reconfiguring")]
    AlreadyConfigured(CaptureMode),
    /// Requested format is not supported.
    #[error("Format not supported: {0:?}")]
    FormatNotSupported(Format),
    /// Error during streaming operation.
    #[error("Stream error: {0}")]
    StreamError(String),
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// The operations the capture loop needs from an imaging device.
///
/// The loop only ever changes mode through the full
/// `stop` → `teardown` → `configure` → `start` sequence.
pub trait Camera {
    /// Acquire the device.
    fn open(&mut self) -> Result<()>;

    /// Allocate a stream for `mode`. Returns the negotiated stream geometry.
    fn configure(&mut self, mode: CaptureMode) -> Result<StreamInfo>;

    /// Start streaming on the configured stream.
    fn start(&mut self) -> Result<()>;

    /// Stop streaming. Stopping a stopped device is a no-op.
    fn stop(&mut self) -> Result<()>;

    /// Release the configured stream and its buffers.
    fn teardown(&mut self);

    /// Block until the next device event.
    fn wait(&mut self) -> Result<DeviceMessage>;

    /// Geometry of the configured stream, if any.
    fn stream_info(&self) -> Option<StreamInfo>;

    /// Mode of the configured stream, if any.
    fn configured_mode(&self) -> Option<CaptureMode>;

    /// Human readable camera model.
    fn camera_model(&self) -> &str;

    /// Processing platform of the device.
    fn platform(&self) -> Platform;
}
