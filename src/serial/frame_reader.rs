//! Line framing on top of a [`Transport`]
//!
//! Reads byte by byte so that nothing beyond the line currently being assembled
//! is buffered. A partial line survives a timeout and is completed by the next
//! call.

use chrono::{DateTime, Local};
use std::io::{self, Read};
use std::time::{Duration, Instant};
use tracing::{trace, warn};

use super::transport::{Transport, TransportError};

pub const DEFAULT_READ_TIMEOUT_MS: u64 = 50;
pub const DEFAULT_MAX_LINE_LEN: usize = 256;

/// One text line exactly as received, without its terminator
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub line: String,
    pub received_at: DateTime<Local>,
}

impl RawFrame {
    pub fn new(line: String) -> Self {
        Self {
            line,
            received_at: Local::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReaderSettings {
    pub read_timeout: Duration,
    pub max_line_len: usize,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

pub struct FrameReader {
    transport: Box<dyn Transport>,
    settings: ReaderSettings,
    partial: Vec<u8>,
    // Set after an overlong line until its terminator shows up
    discarding: bool,
}

impl FrameReader {
    pub fn new(transport: Box<dyn Transport>, settings: ReaderSettings) -> Self {
        Self {
            transport,
            partial: Vec::with_capacity(settings.max_line_len.min(DEFAULT_MAX_LINE_LEN)),
            settings,
            discarding: false,
        }
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Reads the next complete line
    ///
    /// Returns `Ok(None)` when the timeout elapses before a terminator arrives.
    /// Each read is capped by the time left, so a slow trickle of bytes cannot
    /// stretch the call much past `read_timeout`.
    /// Any `Err` means the transport must not be used again.
    pub fn try_read_line(&mut self) -> Result<Option<RawFrame>, TransportError> {
        let deadline = Instant::now() + self.settings.read_timeout;
        let mut byte = [0u8; 1];

        loop {
            self.transport
                .set_read_timeout(deadline.saturating_duration_since(Instant::now()))?;
            match self.transport.read(&mut byte) {
                Ok(0) => return Err(TransportError::Disconnected),
                Ok(_) => {
                    if let Some(line) = self.push_byte(byte[0]) {
                        trace!("Line received from {}: {:?}", self.transport.name(), line);
                        return Ok(Some(RawFrame::new(line)));
                    }
                }
                Err(e) if is_timeout(&e) => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(TransportError::Io(e)),
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    /// Closes the transport. The reader is unusable afterwards.
    pub fn close(&mut self) -> Result<(), TransportError> {
        self.partial.clear();
        self.transport.close()
    }

    fn push_byte(&mut self, byte: u8) -> Option<String> {
        if byte == b'\n' {
            if self.discarding {
                self.discarding = false;
                return None;
            }
            let mut bytes = std::mem::take(&mut self.partial);
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
            return Some(String::from_utf8_lossy(&bytes).into_owned());
        }

        if self.discarding {
            return None;
        }

        if self.partial.len() >= self.settings.max_line_len {
            warn!(
                "Discarding line from {} longer than {} bytes",
                self.transport.name(),
                self.settings.max_line_len
            );
            self.partial.clear();
            self.discarding = true;
            return None;
        }

        self.partial.push(byte);
        None
    }
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}
