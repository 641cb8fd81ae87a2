//! The capture state machine.
//!
//! [`CaptureApp`] owns a camera, an output sink and the trigger sources. It
//! streams in viewfinder mode until a trigger fires, switches to still mode
//! for exactly one frame, saves it and goes back to the viewfinder.
//!
//! Every mode change runs the full stop → teardown → configure → start
//! sequence. The shutter button line is acquired once per [`CaptureApp::run`]
//! and released exactly once on every way out of it.

use crate::error::AppError;
use crate::gpio::{GpioButton, LineProvider, LineRequest};
use crate::keyboard::{KeySource, NoKeys};
use crate::output::{Destination, MetadataTarget, OutputSink};
use crate::preview::{LogPreview, Preview};
use crate::traits::{Camera, CameraError, CaptureMode, DeviceMessage, Frame, Platform};
use crate::trigger::TriggerAggregator;
use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// Source of the current time.
pub type Clock = Box<dyn FnMut() -> Instant>;

/// What the loop does with triggers and captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Where stills go. May contain a `%d` capture counter.
    pub output: Destination,
    /// Where still metadata goes, if anywhere.
    pub metadata: Option<MetadataTarget>,
    /// Capture once this much time has passed since streaming began.
    pub timeout: Option<Duration>,
    /// Key that requests a capture.
    pub trigger_key: u8,
    /// Give up after this many consecutive device timeouts. `None` retries forever.
    pub max_restarts: Option<u32>,
}

impl CaptureOptions {
    /// Options writing to `output` with every optional trigger off and the `c` key.
    pub fn new(output: Destination) -> Self {
        Self {
            output,
            metadata: None,
            timeout: None,
            trigger_key: b'c',
            max_restarts: None,
        }
    }
}

/// What to run instead on a platform that loses temporal denoise in this mode.
fn zsl_suggestion(output: &Destination) -> String {
    let output = match output {
        Destination::Stdout => "-".to_owned(),
        Destination::File(_) => output.to_string(),
    };
    format!(
        "Consider using rpicam-still with the --zsl option for best results, for example: \
         rpicam-still --zsl -o {output}"
    )
}

/// Counters for one run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Completed frames received, in either mode.
    pub frames: u64,
    /// Stills written.
    pub captures: u32,
    /// Stop/start restarts after device timeouts.
    pub restarts: u32,
}

/// The capture controller.
pub struct CaptureApp<C: Camera, S: OutputSink> {
    camera: C,
    sink: S,
    keys: Box<dyn KeySource>,
    preview: Box<dyn Preview>,
    clock: Clock,
    triggers: TriggerAggregator,
    options: CaptureOptions,
    mode: CaptureMode,
    streaming: bool,
    summary: RunSummary,
}

impl<C: Camera, S: OutputSink> CaptureApp<C, S> {
    /// Compose a controller around `camera` and `sink`.
    pub fn new(camera: C, sink: S, options: CaptureOptions) -> Self {
        Self {
            camera,
            sink,
            keys: Box::new(NoKeys),
            preview: Box::new(LogPreview::default()),
            clock: Box::new(Instant::now),
            triggers: TriggerAggregator::new(options.timeout, options.trigger_key),
            options,
            mode: CaptureMode::Viewfinder,
            streaming: false,
            summary: RunSummary::default(),
        }
    }

    /// Read trigger keys from `keys`.
    #[must_use]
    pub fn with_keys(mut self, keys: Box<dyn KeySource>) -> Self {
        self.keys = keys;
        self
    }

    /// Forward untriggered viewfinder frames to `preview`.
    #[must_use]
    pub fn with_preview(mut self, preview: Box<dyn Preview>) -> Self {
        self.preview = preview;
        self
    }

    /// Use `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Current capture mode.
    pub const fn mode(&self) -> CaptureMode {
        self.mode
    }

    /// The camera.
    pub const fn camera(&self) -> &C {
        &self.camera
    }

    /// The output sink.
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Acquire the button, run the loop until quit or a fatal error, and
    /// release the button on the way out regardless of the outcome.
    pub fn run(
        &mut self,
        provider: &dyn LineProvider,
        request: &LineRequest,
    ) -> Result<RunSummary, AppError> {
        self.summary = RunSummary::default();
        self.mode = CaptureMode::Viewfinder;
        let mut button = GpioButton::acquire(provider, request)?;

        let outcome = self.start_and_loop(&mut button);
        let released = button.release();
        self.shutdown();

        match (outcome, released) {
            (Ok(summary), Ok(())) => Ok(summary),
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(err), released) => {
                if let Err(release_err) = released {
                    warn!("{release_err}");
                }
                Err(err)
            }
        }
    }

    fn start_and_loop(&mut self, button: &mut GpioButton) -> Result<RunSummary, AppError> {
        self.camera.open()?;
        if self.camera.platform() == Platform::Pisp {
            warn!("Capture will not make use of temporal denoise");
            warn!("{}", zsl_suggestion(&self.options.output));
        }

        self.camera.configure(CaptureMode::Viewfinder)?;
        self.camera.start()?;
        self.streaming = true;
        self.mode = CaptureMode::Viewfinder;

        let start_time = (self.clock)();
        self.event_loop(start_time, button)
    }

    fn event_loop(
        &mut self,
        start_time: Instant,
        button: &mut GpioButton,
    ) -> Result<RunSummary, AppError> {
        let mut consecutive_timeouts = 0u32;

        loop {
            match self.camera.wait()? {
                DeviceMessage::DeviceTimeout => {
                    consecutive_timeouts += 1;
                    if let Some(limit) = self.options.max_restarts {
                        if consecutive_timeouts > limit {
                            return Err(AppError::RestartLimit(limit));
                        }
                    }
                    warn!("Device timeout detected, attempting a restart");
                    self.stop()?;
                    self.start()?;
                    self.summary.restarts += 1;
                }
                DeviceMessage::Quit => {
                    debug!("Quit received in {} mode", self.mode);
                    return Ok(self.summary);
                }
                DeviceMessage::Unrecognized(kind) => {
                    return Err(AppError::UnrecognizedMessage(kind));
                }
                DeviceMessage::Completed(frame) => {
                    consecutive_timeouts = 0;
                    self.summary.frames += 1;
                    match self.mode {
                        CaptureMode::Viewfinder => {
                            self.on_viewfinder_frame(&frame, start_time, button)?;
                        }
                        CaptureMode::Still => self.on_still_frame(&frame)?,
                    }
                }
            }
        }
    }

    fn on_viewfinder_frame(
        &mut self,
        frame: &Frame,
        start_time: Instant,
        button: &mut GpioButton,
    ) -> Result<(), AppError> {
        let now = (self.clock)();
        let fired = self
            .triggers
            .poll(now, start_time, self.keys.as_mut(), button);

        if fired.fired() {
            info!("Capture triggered by {fired}");
            return self.switch_mode(CaptureMode::Still);
        }

        if let Some(info) = self.camera.stream_info() {
            self.preview.show(frame, &info);
        }
        Ok(())
    }

    fn on_still_frame(&mut self, frame: &Frame) -> Result<(), AppError> {
        self.stop()?;
        info!("Still capture image received");

        let info = self.camera.stream_info().ok_or(CameraError::NotConfigured)?;
        let index = self.summary.captures;
        let destination = self.options.output.for_capture(index);
        self.sink
            .write_image(frame, &info, &destination, self.camera.camera_model())?;
        self.summary.captures += 1;

        if let Some(target) = &self.options.metadata {
            self.sink.write_metadata(
                &target.destination.for_capture(index),
                target.format,
                &frame.metadata,
            )?;
        }

        self.switch_mode(CaptureMode::Viewfinder)
    }

    fn switch_mode(&mut self, mode: CaptureMode) -> Result<(), AppError> {
        self.stop()?;
        self.camera.teardown();
        self.camera.configure(mode)?;
        self.start()?;
        self.mode = mode;
        debug!("Switched to {mode} mode");
        Ok(())
    }

    fn start(&mut self) -> Result<(), CameraError> {
        self.camera.start()?;
        self.streaming = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        if self.streaming {
            self.camera.stop()?;
            self.streaming = false;
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Err(err) = self.stop() {
            warn!("Failed to stop camera: {err}");
        }
        if self.camera.configured_mode().is_some() {
            self.camera.teardown();
        }
    }
}
