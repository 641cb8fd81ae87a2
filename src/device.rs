//! V4L2 camera implementation using the v4l crate.

use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::{CaptureStream as V4lCaptureStream, Stream as V4lStream};
use v4l::video::Capture;
use v4l::Device;

use crate::traits::{
    Camera, CameraError, CaptureMode, DeviceCapabilities, DeviceMessage, Format, FourCC, Frame,
    FrameMetadata, Platform, Result, StreamInfo,
};
use log::{debug, trace};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Stream layouts and timing for a [`V4L2Camera`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSettings {
    /// Device index (0 for /dev/video0).
    pub index: u32,
    /// Format requested in viewfinder mode.
    pub viewfinder: Format,
    /// Format requested in still mode.
    pub still: Format,
    /// Number of mmap buffers per stream.
    pub buffer_count: u32,
    /// How long a single dequeue may block before it reports a device timeout.
    pub frame_timeout: Duration,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            index: 0,
            viewfinder: Format::new(640, 480, FourCC::YUYV),
            still: Format::new(1920, 1080, FourCC::MJPG),
            buffer_count: 4,
            frame_timeout: Duration::from_secs(1),
        }
    }
}

impl DeviceSettings {
    fn format_for(&self, mode: CaptureMode) -> &Format {
        match mode {
            CaptureMode::Viewfinder => &self.viewfinder,
            CaptureMode::Still => &self.still,
        }
    }
}

/// A stream allocated for one capture mode.
struct ConfiguredStream {
    mode: CaptureMode,
    info: StreamInfo,
    stream: MmapStream<'static>,
}

/// V4L2 camera wrapping the v4l crate.
///
/// Streaming is switched on by the first dequeue after [`Camera::start`]; the
/// v4l mmap stream queues all of its buffers at that point.
pub struct V4L2Camera {
    settings: DeviceSettings,
    device: Option<Device>,
    capabilities: DeviceCapabilities,
    configured: Option<ConfiguredStream>,
    running: bool,
    quit: Arc<AtomicBool>,
}

impl V4L2Camera {
    /// Create a camera for the given settings. `quit` is polled around every
    /// dequeue and turns into [`DeviceMessage::Quit`] once set.
    #[must_use]
    pub fn new(settings: DeviceSettings, quit: Arc<AtomicBool>) -> Self {
        Self {
            settings,
            device: None,
            capabilities: DeviceCapabilities::default(),
            configured: None,
            running: false,
            quit,
        }
    }

    /// Capabilities reported by the driver. Empty until the device is opened.
    pub const fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    fn negotiate(device: &Device, format: &Format) -> Result<StreamInfo> {
        let mut fmt = device
            .format()
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        fmt.width = format.width;
        fmt.height = format.height;
        fmt.fourcc = format.fourcc.into();

        let fmt = device
            .set_format(&fmt)
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        if FourCC::from(fmt.fourcc) != format.fourcc {
            return Err(CameraError::FormatNotSupported(format.clone()));
        }

        Ok(StreamInfo {
            width: fmt.width,
            height: fmt.height,
            stride: fmt.stride,
            fourcc: FourCC::from(fmt.fourcc),
        })
    }
}

impl Camera for V4L2Camera {
    fn open(&mut self) -> Result<()> {
        let index = self.settings.index;
        let device = Device::new(index as usize).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => CameraError::DeviceNotFound(index),
            _ => CameraError::DeviceOpenFailed(err.to_string()),
        })?;

        let caps = device
            .query_caps()
            .map_err(|err| CameraError::DeviceOpenFailed(err.to_string()))?;

        self.capabilities = DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
        };

        if !self.capabilities.can_capture || !self.capabilities.can_stream {
            return Err(CameraError::DeviceOpenFailed(format!(
                "{} cannot stream video capture",
                self.capabilities.card
            )));
        }

        debug!(
            "Opened /dev/video{index}: {} ({})",
            self.capabilities.card, self.capabilities.driver
        );
        self.device = Some(device);
        Ok(())
    }

    fn configure(&mut self, mode: CaptureMode) -> Result<StreamInfo> {
        if let Some(configured) = &self.configured {
            return Err(CameraError::AlreadyConfigured(configured.mode));
        }
        let device = self.device.as_ref().ok_or(CameraError::NotOpen)?;

        let info = Self::negotiate(device, self.settings.format_for(mode))?;
        let mut stream: MmapStream<'static> =
            MmapStream::with_buffers(device, Type::VideoCapture, self.settings.buffer_count)
                .map_err(|err| CameraError::StreamError(err.to_string()))?;
        stream.set_timeout(self.settings.frame_timeout);

        debug!(
            "Configured {mode} stream: {}x{} {}",
            info.width, info.height, info.fourcc
        );
        self.configured = Some(ConfiguredStream {
            mode,
            info: info.clone(),
            stream,
        });
        Ok(info)
    }

    fn start(&mut self) -> Result<()> {
        if self.configured.is_none() {
            return Err(CameraError::NotConfigured);
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        if let Some(configured) = self.configured.as_mut() {
            V4lStream::stop(&mut configured.stream)
                .map_err(|err| CameraError::StreamError(err.to_string()))?;
        }
        Ok(())
    }

    fn teardown(&mut self) {
        self.running = false;
        // Dropping the mmap stream issues STREAMOFF and frees the buffers.
        self.configured = None;
    }

    fn wait(&mut self) -> Result<DeviceMessage> {
        if self.quit_requested() {
            return Ok(DeviceMessage::Quit);
        }
        if !self.running {
            return Err(CameraError::StreamError("wait called on a stopped stream".to_owned()));
        }
        let configured = self.configured.as_mut().ok_or(CameraError::NotConfigured)?;

        let result = V4lCaptureStream::next(&mut configured.stream).map(|(buf, meta)| {
            let used = buf.get(..meta.bytesused as usize).unwrap_or(buf);

            // Safe conversions: V4L2 timestamps are always non-negative in practice
            #[allow(clippy::cast_sign_loss)]
            let secs = meta.timestamp.sec.max(0) as u64;
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let nanos = (meta.timestamp.usec.max(0) as u32).saturating_mul(1000);

            Frame {
                data: used.to_vec(),
                metadata: FrameMetadata {
                    sequence: meta.sequence,
                    timestamp: Duration::new(secs, nanos),
                    bytes_used: meta.bytesused,
                },
            }
        });

        match result {
            Ok(frame) => {
                trace!("Dequeued frame {}", frame.metadata.sequence);
                Ok(DeviceMessage::Completed(frame))
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                if self.quit_requested() {
                    Ok(DeviceMessage::Quit)
                } else {
                    Ok(DeviceMessage::DeviceTimeout)
                }
            }
            Err(err) => Err(CameraError::StreamError(err.to_string())),
        }
    }

    fn stream_info(&self) -> Option<StreamInfo> {
        self.configured.as_ref().map(|configured| configured.info.clone())
    }

    fn configured_mode(&self) -> Option<CaptureMode> {
        self.configured.as_ref().map(|configured| configured.mode)
    }

    fn camera_model(&self) -> &str {
        &self.capabilities.card
    }

    fn platform(&self) -> Platform {
        Platform::from_driver(&self.capabilities.driver)
    }
}
