//! Trigger aggregation for viewfinder frames.
//!
//! Each viewfinder frame polls three independent sources once: the elapsed
//! time since the loop started, a pending keypress and the shutter button.
//! Any one of them is enough to request a still capture.

use crate::gpio::GpioButton;
use crate::keyboard::KeySource;
use log::{info, warn};
use std::time::{Duration, Instant};

/// Which trigger sources fired on one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Triggers {
    /// The configured timeout has elapsed.
    pub timeout: bool,
    /// The trigger key was pressed.
    pub key: bool,
    /// The shutter button reads active.
    pub button: bool,
}

impl Triggers {
    /// Whether any source fired.
    pub const fn fired(&self) -> bool {
        self.timeout || self.key || self.button
    }
}

impl std::fmt::Display for Triggers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = [
            (self.timeout, "timeout"),
            (self.key, "key"),
            (self.button, "button"),
        ]
        .into_iter()
        .filter_map(|(fired, name)| fired.then_some(name))
        .collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("+"))
        }
    }
}

/// True once strictly more than `timeout` has passed since `start`.
/// A `None` timeout never elapses.
pub fn timeout_elapsed(now: Instant, start: Instant, timeout: Option<Duration>) -> bool {
    timeout.is_some_and(|timeout| now.saturating_duration_since(start) > timeout)
}

/// Polls all trigger sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerAggregator {
    timeout: Option<Duration>,
    trigger_key: u8,
}

impl TriggerAggregator {
    /// Create an aggregator. A zero timeout disables the timeout trigger.
    pub fn new(timeout: Option<Duration>, trigger_key: u8) -> Self {
        Self {
            timeout: timeout.filter(|timeout| !timeout.is_zero()),
            trigger_key,
        }
    }

    /// Evaluate every source once. May consume one buffered keystroke.
    ///
    /// A button that cannot be read counts as not pressed.
    pub fn poll(
        &self,
        now: Instant,
        start: Instant,
        keys: &mut dyn KeySource,
        button: &mut GpioButton,
    ) -> Triggers {
        let key = keys.read_key();
        if let Some(code) = key {
            info!("{} - {code}", char::from(code).escape_default());
        }

        let button = match button.is_pressed() {
            Ok(pressed) => pressed,
            Err(err) => {
                warn!("{err}");
                false
            }
        };

        Triggers {
            timeout: timeout_elapsed(now, start, self.timeout),
            key: key == Some(self.trigger_key),
            button,
        }
    }
}
