//! Serial subsystem: byte transport and line framing
//!
//! Splits the inbound sensor link into two layers:
//!
//! 1. [`transport`] - opens and owns the byte stream (a UART via `serialport`,
//!    or a [`replay`] source), and maps platform errors to [`TransportError`]
//! 2. [`frame_reader`] - assembles one text line at a time from the stream,
//!    with a bounded read timeout
//!
//! # Architecture
//!
//! ```text
//! Connector ──open──► Transport ──bytes──► FrameReader ──► RawFrame
//!                        │                     │
//!                     (close)            (timeout = idle)
//! ```
//!
//! A read timeout is the normal idle case between sensor transmissions and is
//! reported as `Ok(None)`, never as an error.

pub mod frame_reader;
pub mod replay;
pub mod transport;

pub use frame_reader::{FrameReader, RawFrame, ReaderSettings};
pub use replay::{ReplayConnector, ReplayEvent, ReplayTransport};
pub use transport::{Connector, SerialConnector, SerialSettings, Transport, TransportError};
