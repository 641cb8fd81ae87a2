//! Viewfinder frame consumers.

use crate::traits::{Frame, StreamInfo};
use log::debug;

/// Receives viewfinder frames that did not trigger a capture.
pub trait Preview {
    /// Show one frame. Frames are not persisted.
    fn show(&mut self, frame: &Frame, info: &StreamInfo);
}

/// Headless preview that reports progress in the log every `interval` frames.
#[derive(Debug)]
pub struct LogPreview {
    interval: u64,
    shown: u64,
}

impl Default for LogPreview {
    fn default() -> Self {
        Self::new(30)
    }
}

impl LogPreview {
    /// Create a preview logging every `interval` frames (at least 1).
    #[must_use]
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            shown: 0,
        }
    }

    /// Frames shown so far.
    pub const fn shown(&self) -> u64 {
        self.shown
    }
}

impl Preview for LogPreview {
    fn show(&mut self, frame: &Frame, info: &StreamInfo) {
        self.shown += 1;
        if self.shown % self.interval == 0 {
            debug!(
                "Viewfinder frame {} ({}x{} {}, {} bytes)",
                frame.metadata.sequence,
                info.width,
                info.height,
                info.fourcc,
                frame.data.len()
            );
        }
    }
}
