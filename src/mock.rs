//! Test doubles for running the capture loop without hardware.
//!
//! All doubles can share one [`Trace`] so a test sees device, sink and GPIO
//! calls in the order they happened.

use crate::gpio::{self, GpioError, InputLine, Level, LineProvider, LineRequest};
use crate::keyboard::KeySource;
use crate::output::{self, Destination, MetadataFormat, OutputError, OutputSink};
use crate::traits::{
    Camera, CameraError, CaptureMode, DeviceMessage, FourCC, Frame, FrameMetadata, Platform,
    Result, StreamInfo,
};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Duration;

/// One observable side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `Camera::open`
    Open,
    /// `Camera::configure`
    Configure(CaptureMode),
    /// `Camera::start`
    Start,
    /// `Camera::stop`
    Stop,
    /// `Camera::teardown`
    Teardown,
    /// `OutputSink::write_image`
    WriteImage(Destination),
    /// `OutputSink::write_metadata`
    WriteMetadata(Destination),
    /// A GPIO line was acquired.
    Acquire,
    /// A GPIO line release reached the backend.
    Release,
}

/// Shared, ordered call log.
#[derive(Debug, Default)]
pub struct Trace(Rc<RefCell<Vec<Call>>>);

impl Clone for Trace {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl Trace {
    /// Append a call.
    pub fn push(&self, call: Call) {
        self.0.borrow_mut().push(call);
    }

    /// Snapshot of all calls so far.
    pub fn calls(&self) -> Vec<Call> {
        self.0.borrow().clone()
    }

    /// Number of recorded calls equal to `call`.
    pub fn count(&self, call: &Call) -> usize {
        self.0.borrow().iter().filter(|c| *c == call).count()
    }
}

/// Build a frame with `len` bytes of a repeating pattern.
pub fn mock_frame(sequence: u32, len: usize) -> Frame {
    #[allow(clippy::cast_possible_truncation)]
    let data = (0..len).map(|i| (i % 256) as u8).collect();
    #[allow(clippy::cast_possible_truncation)]
    let bytes_used = len as u32;
    Frame {
        data,
        metadata: FrameMetadata {
            sequence,
            timestamp: Duration::from_millis(u64::from(sequence) * 33), // ~30fps
            bytes_used,
        },
    }
}

/// Shorthand for a completed-frame message.
pub fn completed(sequence: u32) -> DeviceMessage {
    DeviceMessage::Completed(mock_frame(sequence, 64))
}

/// Camera that replays a scripted message sequence. Once the script runs
/// out every wait returns [`DeviceMessage::Quit`].
pub struct MockCamera {
    trace: Trace,
    script: VecDeque<DeviceMessage>,
    configured: Option<CaptureMode>,
    running: bool,
    platform: Platform,
    fail_open: bool,
    waits: u32,
}

impl MockCamera {
    /// Create a camera replaying `script`.
    pub fn new<I: IntoIterator<Item = DeviceMessage>>(trace: &Trace, script: I) -> Self {
        Self {
            trace: trace.clone(),
            script: script.into_iter().collect(),
            configured: None,
            running: false,
            platform: Platform::Unknown,
            fail_open: false,
            waits: 0,
        }
    }

    /// Report `platform` from [`Camera::platform`].
    #[must_use]
    pub const fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Make [`Camera::open`] fail.
    #[must_use]
    pub const fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Whether the device is currently streaming.
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Number of messages handed out so far, including the final quit.
    pub const fn waits(&self) -> u32 {
        self.waits
    }
}

impl Camera for MockCamera {
    fn open(&mut self) -> Result<()> {
        if self.fail_open {
            return Err(CameraError::DeviceNotFound(0));
        }
        self.trace.push(Call::Open);
        Ok(())
    }

    fn configure(&mut self, mode: CaptureMode) -> Result<StreamInfo> {
        if let Some(current) = self.configured {
            return Err(CameraError::AlreadyConfigured(current));
        }
        self.trace.push(Call::Configure(mode));
        self.configured = Some(mode);
        self.stream_info().ok_or(CameraError::NotConfigured)
    }

    fn start(&mut self) -> Result<()> {
        if self.configured.is_none() {
            return Err(CameraError::NotConfigured);
        }
        self.trace.push(Call::Start);
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.trace.push(Call::Stop);
        self.running = false;
        Ok(())
    }

    fn teardown(&mut self) {
        self.trace.push(Call::Teardown);
        self.running = false;
        self.configured = None;
    }

    fn wait(&mut self) -> Result<DeviceMessage> {
        if !self.running {
            return Err(CameraError::StreamError("wait on a stopped stream".to_owned()));
        }
        self.waits += 1;
        Ok(self.script.pop_front().unwrap_or(DeviceMessage::Quit))
    }

    fn stream_info(&self) -> Option<StreamInfo> {
        self.configured.map(|mode| match mode {
            CaptureMode::Viewfinder => StreamInfo {
                width: 640,
                height: 480,
                stride: 1280,
                fourcc: FourCC::YUYV,
            },
            CaptureMode::Still => StreamInfo {
                width: 1920,
                height: 1080,
                stride: 0,
                fourcc: FourCC::MJPG,
            },
        })
    }

    fn configured_mode(&self) -> Option<CaptureMode> {
        self.configured
    }

    fn camera_model(&self) -> &str {
        "Mock Camera"
    }

    fn platform(&self) -> Platform {
        self.platform
    }
}

/// Hands out [`MockLine`]s that read a scripted level sequence.
pub struct MockLineProvider {
    trace: Trace,
    levels: Rc<RefCell<VecDeque<Level>>>,
    releases: Rc<Cell<u32>>,
    fail: bool,
}

impl MockLineProvider {
    /// Lines read `levels` in order, then inactive forever.
    pub fn new(trace: &Trace, levels: Vec<Level>) -> Self {
        Self {
            trace: trace.clone(),
            levels: Rc::new(RefCell::new(levels.into())),
            releases: Rc::new(Cell::new(0)),
            fail: false,
        }
    }

    /// A provider whose acquisition always fails.
    pub fn failing(trace: &Trace) -> Self {
        Self {
            fail: true,
            ..Self::new(trace, Vec::new())
        }
    }

    /// Number of `release` calls that reached a line.
    pub fn release_count(&self) -> u32 {
        self.releases.get()
    }
}

impl LineProvider for MockLineProvider {
    fn acquire(&self, request: &LineRequest) -> gpio::Result<Box<dyn InputLine>> {
        if self.fail {
            return Err(GpioError::Acquire {
                chip: request.chip.clone(),
                offset: request.offset,
                reason: "mock failure".to_owned(),
            });
        }
        self.trace.push(Call::Acquire);
        Ok(Box::new(MockLine {
            trace: self.trace.clone(),
            levels: Rc::clone(&self.levels),
            releases: Rc::clone(&self.releases),
        }))
    }
}

/// Line backed by a [`MockLineProvider`] script.
pub struct MockLine {
    trace: Trace,
    levels: Rc<RefCell<VecDeque<Level>>>,
    releases: Rc<Cell<u32>>,
}

impl InputLine for MockLine {
    fn read_level(&mut self) -> gpio::Result<Level> {
        Ok(self
            .levels
            .borrow_mut()
            .pop_front()
            .unwrap_or(Level::Inactive))
    }

    fn release(&mut self) -> gpio::Result<()> {
        self.trace.push(Call::Release);
        self.releases.set(self.releases.get() + 1);
        Ok(())
    }
}

/// Key source replaying a fixed sequence, then reporting no keys.
#[derive(Debug, Default)]
pub struct ScriptedKeys(VecDeque<Option<u8>>);

impl ScriptedKeys {
    /// Replay `keys`, one entry per poll.
    pub fn new<I: IntoIterator<Item = Option<u8>>>(keys: I) -> Self {
        Self(keys.into_iter().collect())
    }
}

impl KeySource for ScriptedKeys {
    fn read_key(&mut self) -> Option<u8> {
        self.0.pop_front().flatten()
    }
}

/// Sink that records writes instead of touching the filesystem.
pub struct RecordingSink {
    trace: Trace,
    images: Vec<(Destination, usize)>,
    metadata: Vec<(Destination, MetadataFormat, u32)>,
    fail_images: bool,
}

impl RecordingSink {
    /// Create a sink logging to `trace`.
    pub fn new(trace: &Trace) -> Self {
        Self {
            trace: trace.clone(),
            images: Vec::new(),
            metadata: Vec::new(),
            fail_images: false,
        }
    }

    /// Make every image write fail.
    #[must_use]
    pub const fn failing(mut self) -> Self {
        self.fail_images = true;
        self
    }

    /// Destinations and sizes of written images.
    pub fn images(&self) -> &[(Destination, usize)] {
        &self.images
    }

    /// Destinations, formats and frame sequence numbers of written metadata.
    pub fn metadata(&self) -> &[(Destination, MetadataFormat, u32)] {
        &self.metadata
    }
}

impl OutputSink for RecordingSink {
    fn write_image(
        &mut self,
        frame: &Frame,
        _info: &StreamInfo,
        destination: &Destination,
        _camera_model: &str,
    ) -> output::Result<()> {
        if self.fail_images {
            return Err(OutputError::Image {
                destination: destination.clone(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "mock failure"),
            });
        }
        self.trace.push(Call::WriteImage(destination.clone()));
        self.images.push((destination.clone(), frame.data.len()));
        Ok(())
    }

    fn write_metadata(
        &mut self,
        destination: &Destination,
        format: MetadataFormat,
        metadata: &FrameMetadata,
    ) -> output::Result<()> {
        self.trace.push(Call::WriteMetadata(destination.clone()));
        self.metadata
            .push((destination.clone(), format, metadata.sequence));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_camera_replays_script_then_quits() {
        let trace = Trace::default();
        let mut camera = MockCamera::new(&trace, [completed(0), DeviceMessage::DeviceTimeout]);
        camera.open().expect("open failed");
        camera.configure(CaptureMode::Viewfinder).expect("configure failed");
        camera.start().expect("start failed");

        assert!(matches!(camera.wait(), Ok(DeviceMessage::Completed(_))));
        assert!(matches!(camera.wait(), Ok(DeviceMessage::DeviceTimeout)));
        assert!(matches!(camera.wait(), Ok(DeviceMessage::Quit)));
        assert_eq!(camera.waits(), 3);
    }

    #[test]
    fn test_mock_camera_rejects_configure_without_teardown() {
        let trace = Trace::default();
        let mut camera = MockCamera::new(&trace, Vec::<DeviceMessage>::new());
        camera.configure(CaptureMode::Viewfinder).expect("configure failed");
        assert!(matches!(
            camera.configure(CaptureMode::Still),
            Err(CameraError::AlreadyConfigured(CaptureMode::Viewfinder))
        ));
        camera.teardown();
        let info = camera.configure(CaptureMode::Still).expect("configure failed");
        assert_eq!(info.fourcc, FourCC::MJPG);
    }

    #[test]
    fn test_mock_camera_wait_requires_start() {
        let trace = Trace::default();
        let mut camera = MockCamera::new(&trace, [completed(0)]);
        assert!(camera.wait().is_err());
    }

    #[test]
    fn test_scripted_keys() {
        let mut keys = ScriptedKeys::new([None, Some(b'c')]);
        assert_eq!(keys.read_key(), None);
        assert_eq!(keys.read_key(), Some(b'c'));
        assert_eq!(keys.read_key(), None);
    }
}
