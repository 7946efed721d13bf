//! Byte transport abstraction and the `serialport` backed implementation

use serde::{Deserialize, Serialize};
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::frame_reader::{ReaderSettings, DEFAULT_MAX_LINE_LEN, DEFAULT_READ_TIMEOUT_MS};

/// Errors raised by the transport layer
///
/// Every variant means the transport is no longer usable. Read timeouts are not
/// represented here; the frame reader reports them as "no data this tick".
#[derive(Debug, Error)]
pub enum TransportError {
    /// The requested device does not exist (unplugged, wrong name)
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The device exists but we are not allowed to open it or it is in use
    #[error("Access denied to {0}")]
    PermissionDenied(String),

    /// Any other failure while opening the port
    #[error("Failed to open {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    /// I/O failure on an open transport
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stream reported end-of-file, which for a UART means the device went away
    #[error("Stream closed by the device")]
    Disconnected,

    /// Read attempted without an open transport
    #[error("Transport is not open")]
    NotOpen,
}

/// An open, readable byte stream
///
/// Implementations must bound every `read` call by their own timeout and signal
/// an expired timeout with `io::ErrorKind::TimedOut` (or `WouldBlock`).
pub trait Transport: Read + Send {
    /// Human readable identifier, used in log messages
    fn name(&self) -> &str;

    /// Releases the underlying handle. Called at most once by the owner.
    fn close(&mut self) -> Result<(), TransportError>;

    /// Caps how long the next `read` may block
    ///
    /// The frame reader passes the time left before its deadline. Transports
    /// that never block keep the default.
    fn set_read_timeout(&mut self, _timeout: Duration) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Factory for transports, so the connection supervisor can (re)open a link
pub trait Connector: Send {
    fn connect(&mut self) -> Result<Box<dyn Transport>, TransportError>;

    /// Human readable description of the target (port name, replay source, ...)
    fn describe(&self) -> String;
}

/// Serial link configuration
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SerialSettings {
    /// Platform port identifier, e.g. `COM10` or `/dev/ttyUSB0`
    pub port_name: String,

    /// Must match the sensor firmware's `Serial.begin()` speed
    pub baud_rate: u32,

    /// Upper bound for a single line read in milliseconds
    pub read_timeout_ms: u64,

    /// Assert DTR on open, needed by some Arduino boards
    pub dtr: bool,

    /// Assert RTS on open
    pub rts: bool,

    /// Drop anything buffered by the OS before the first read
    pub discard_on_open: bool,

    /// Lines longer than this are thrown away
    pub max_line_len: usize,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port_name: default_port_name().to_string(),
            baud_rate: 115_200,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            dtr: true,
            rts: true,
            discard_on_open: true,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

impl SerialSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn reader_settings(&self) -> ReaderSettings {
        ReaderSettings {
            read_timeout: self.read_timeout(),
            max_line_len: self.max_line_len,
        }
    }
}

#[cfg(windows)]
fn default_port_name() -> &'static str {
    "COM3"
}

#[cfg(not(windows))]
fn default_port_name() -> &'static str {
    "/dev/ttyUSB0"
}

/// Opens UART transports with the `serialport` crate
pub struct SerialConnector {
    settings: SerialSettings,
}

impl SerialConnector {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }
}

impl Connector for SerialConnector {
    fn connect(&mut self) -> Result<Box<dyn Transport>, TransportError> {
        let port_name = self.settings.port_name.clone();
        debug!(
            "Opening serial port {} at {} baud (timeout {}ms)",
            port_name, self.settings.baud_rate, self.settings.read_timeout_ms
        );

        let mut port = serialport::new(&port_name, self.settings.baud_rate)
            .timeout(self.settings.read_timeout())
            .open()
            .map_err(|e| map_open_error(&port_name, e))?;

        if self.settings.dtr {
            port.write_data_terminal_ready(true)
                .map_err(|e| map_open_error(&port_name, e))?;
        }
        if self.settings.rts {
            port.write_request_to_send(true)
                .map_err(|e| map_open_error(&port_name, e))?;
        }
        if self.settings.discard_on_open {
            if let Err(e) = port.clear(ClearBuffer::Input) {
                // Stale input only costs one bad frame, keep the port
                warn!("Could not discard input buffer on {}: {}", port_name, e);
            }
        }

        info!("Serial port {} opened successfully", port_name);
        Ok(Box::new(SerialTransport {
            name: port_name,
            port: Some(port),
            timeout: self.settings.read_timeout(),
        }))
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.settings.port_name, self.settings.baud_rate)
    }
}

fn map_open_error(port: &str, error: serialport::Error) -> TransportError {
    match error.kind() {
        serialport::ErrorKind::NoDevice => TransportError::DeviceNotFound(port.to_string()),
        serialport::ErrorKind::Io(io::ErrorKind::NotFound) => {
            TransportError::DeviceNotFound(port.to_string())
        }
        serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
            TransportError::PermissionDenied(port.to_string())
        }
        _ => TransportError::OpenFailed {
            port: port.to_string(),
            reason: error.to_string(),
        },
    }
}

/// A UART opened by [`SerialConnector`]
pub struct SerialTransport {
    name: String,
    port: Option<Box<dyn SerialPort>>,
    // Last timeout handed to the port, whole milliseconds
    timeout: Duration,
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.as_mut() {
            Some(port) => port.read(buf),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("serial port {} already closed", self.name),
            )),
        }
    }
}

impl Transport for SerialTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<(), TransportError> {
        // serialport releases the OS handle on drop
        match self.port.take() {
            Some(port) => {
                drop(port);
                info!("Serial port {} closed", self.name);
                Ok(())
            }
            None => Err(TransportError::NotOpen),
        }
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX).max(1);
        let timeout = Duration::from_millis(millis);
        if timeout == self.timeout {
            return Ok(());
        }
        let port = self.port.as_mut().ok_or(TransportError::NotOpen)?;
        port.set_timeout(timeout)
            .map_err(|e| TransportError::Io(e.into()))?;
        self.timeout = timeout;
        Ok(())
    }
}
