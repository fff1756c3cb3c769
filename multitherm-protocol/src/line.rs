//! Byte-at-a-time line assembly for the remote link.
//!
//! The reader collects bytes until `\n`, ignores `\r`, and hands the
//! completed line to [`RemoteCommand::parse`]. A line longer than
//! [`MAX_LINE_LEN`] is discarded up to its terminator and reported once.

use heapless::Vec;

use crate::command::{ParseError, RemoteCommand};

/// Maximum line length in bytes, excluding the terminator
pub const MAX_LINE_LEN: usize = 64;

/// State machine assembling inbound lines
#[derive(Debug, Clone)]
pub struct LineReader {
    buffer: Vec<u8, MAX_LINE_LEN>,
    /// Set after an overflow until the next `\n`
    discarding: bool,
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

impl LineReader {
    /// Create a new line reader
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            discarding: false,
        }
    }

    /// Drop any partially received line
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    /// Feed a single byte to the reader
    ///
    /// Returns `Ok(Some(cmd))` when a complete line parsed, `Ok(None)` when
    /// more bytes are needed (blank lines are skipped), or `Err` when the
    /// completed line was rejected.
    pub fn feed(&mut self, byte: u8) -> Result<Option<RemoteCommand>, ParseError> {
        match byte {
            b'\r' => Ok(None),
            b'\n' => {
                if self.discarding {
                    self.reset();
                    return Err(ParseError::LineTooLong);
                }

                let result = match core::str::from_utf8(&self.buffer) {
                    Ok(line) if line.trim().is_empty() => Ok(None),
                    Ok(line) => RemoteCommand::parse(line).map(Some),
                    Err(_) => Err(ParseError::InvalidUtf8),
                };
                self.buffer.clear();
                result
            }
            _ => {
                if !self.discarding && self.buffer.push(byte).is_err() {
                    self.buffer.clear();
                    self.discarding = true;
                }
                Ok(None)
            }
        }
    }

    /// Feed multiple bytes to the reader
    ///
    /// Returns the first command or error produced. Remaining bytes after
    /// that line are not consumed.
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Result<Option<RemoteCommand>, ParseError> {
        for &byte in bytes {
            if let Some(cmd) = self.feed(byte)? {
                return Ok(Some(cmd));
            }
        }
        Ok(None)
    }
}
