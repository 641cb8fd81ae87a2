//! Non-blocking single key reads from the controlling terminal.

use log::{debug, warn};
use nix::sys::termios::{self, LocalFlags, SetArg, SpecialCharacterIndices, Termios};
use std::io::{self, IsTerminal, Read};

/// A source of single keypresses that never blocks.
pub trait KeySource {
    /// Return the next buffered key, or `None` if nothing was typed.
    fn read_key(&mut self) -> Option<u8>;
}

/// Key source that never reports a key.
#[derive(Debug, Default)]
pub struct NoKeys;

impl KeySource for NoKeys {
    fn read_key(&mut self) -> Option<u8> {
        None
    }
}

/// Reads stdin one byte at a time with line buffering and echo switched off.
///
/// The original terminal settings are restored by [`TerminalKeyReader::restore`]
/// or on drop, whichever comes first.
pub struct TerminalKeyReader {
    original: Option<Termios>,
}

impl TerminalKeyReader {
    /// Switch stdin to non-canonical, non-echoing, non-blocking reads.
    ///
    /// When stdin is not a terminal the reader is inert and reports no keys,
    /// since a pipe cannot be made to return immediately this way.
    pub fn enable() -> io::Result<Self> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            warn!("stdin is not a terminal, keypress trigger disabled");
            return Ok(Self { original: None });
        }

        let original = termios::tcgetattr(&stdin).map_err(io::Error::from)?;
        let mut raw = original.clone();
        raw.local_flags.remove(LocalFlags::ICANON | LocalFlags::ECHO);
        for index in [SpecialCharacterIndices::VMIN, SpecialCharacterIndices::VTIME] {
            if let Some(slot) = raw.control_chars.get_mut(index as usize) {
                *slot = 0;
            }
        }
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw).map_err(io::Error::from)?;
        debug!("Terminal switched to non-blocking key reads");

        Ok(Self {
            original: Some(original),
        })
    }

    /// Whether keys are actually being read.
    pub const fn is_active(&self) -> bool {
        self.original.is_some()
    }

    /// Put the terminal back the way it was.
    pub fn restore(&mut self) -> io::Result<()> {
        if let Some(original) = self.original.take() {
            termios::tcsetattr(io::stdin(), SetArg::TCSANOW, &original)
                .map_err(io::Error::from)?;
            debug!("Terminal settings restored");
        }
        Ok(())
    }
}

impl KeySource for TerminalKeyReader {
    fn read_key(&mut self) -> Option<u8> {
        if self.original.is_none() {
            return None;
        }
        let mut byte = [0u8; 1];
        match io::stdin().read(&mut byte) {
            Ok(1) => {
                let [key] = byte;
                Some(key)
            }
            Ok(_) => None,
            Err(err) => {
                if err.kind() != io::ErrorKind::WouldBlock && err.kind() != io::ErrorKind::Interrupted
                {
                    warn!("Failed to read key: {err}");
                }
                None
            }
        }
    }
}

impl Drop for TerminalKeyReader {
    fn drop(&mut self) {
        if let Err(err) = self.restore() {
            warn!("Failed to restore terminal: {err}");
        }
    }
}
