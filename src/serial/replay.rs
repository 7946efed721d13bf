//! In-memory transport replaying captured or scripted sensor output
//!
//! Used to run the pipeline against a recorded serial log (`--replay`) and to
//! script timeouts and faults without hardware.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::transport::{Connector, Transport, TransportError};

/// One scripted step of a replayed stream
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayEvent {
    /// Bytes delivered to the reader, in order
    Bytes(Vec<u8>),
    /// A single read that times out without data
    Timeout,
    /// A single read that fails with the given error kind
    Fault(io::ErrorKind),
}

impl ReplayEvent {
    pub fn data(text: &str) -> Self {
        ReplayEvent::Bytes(text.as_bytes().to_vec())
    }

    pub fn line(text: &str) -> Self {
        ReplayEvent::Bytes(format!("{text}\n").into_bytes())
    }
}

pub struct ReplayTransport {
    name: String,
    events: VecDeque<ReplayEvent>,
    pending: VecDeque<u8>,
    idle_when_exhausted: bool,
    closed: bool,
    close_count: Arc<AtomicUsize>,
}

impl ReplayTransport {
    /// Creates a transport that reports end-of-stream once `events` are used up
    pub fn new(name: impl Into<String>, events: Vec<ReplayEvent>) -> Self {
        Self {
            name: name.into(),
            events: events.into(),
            pending: VecDeque::new(),
            idle_when_exhausted: false,
            closed: false,
            close_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replays a captured log, one line per record
    pub fn from_log(name: impl Into<String>, contents: &str) -> Self {
        let events = contents.lines().map(ReplayEvent::line).collect();
        Self::new(name, events)
    }

    /// Keep timing out instead of reporting end-of-stream after the script
    pub fn idle_when_exhausted(mut self) -> Self {
        self.idle_when_exhausted = true;
        self
    }

    /// Share a close counter between several transports
    pub fn with_close_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.close_count = counter;
        self
    }

    /// Number of `close` calls observed so far
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        self.close_count.clone()
    }
}

impl Read for ReplayTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("replay {} already closed", self.name),
            ));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        while self.pending.is_empty() {
            match self.events.pop_front() {
                Some(ReplayEvent::Bytes(bytes)) => self.pending.extend(bytes),
                Some(ReplayEvent::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "replay timeout"))
                }
                Some(ReplayEvent::Fault(kind)) => {
                    return Err(io::Error::new(kind, "scripted replay fault"))
                }
                None if self.idle_when_exhausted => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "replay idle"))
                }
                None => return Ok(0),
            }
        }

        let mut copied = 0;
        while copied < buf.len() {
            match self.pending.pop_front() {
                Some(byte) => {
                    buf[copied] = byte;
                    copied += 1;
                }
                None => break,
            }
        }
        Ok(copied)
    }
}

impl Transport for ReplayTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        if self.closed {
            return Err(TransportError::NotOpen);
        }
        self.closed = true;
        self.pending.clear();
        debug!("Replay transport {} closed", self.name);
        Ok(())
    }
}

/// Hands out prepared replay transports, one per `connect` call
///
/// A `None` slot makes that connection attempt fail with `DeviceNotFound`, as
/// does an empty queue.
pub struct ReplayConnector {
    name: String,
    transports: VecDeque<Option<ReplayTransport>>,
    attempts: Arc<AtomicUsize>,
}

impl ReplayConnector {
    pub fn new(name: impl Into<String>, transports: Vec<Option<ReplayTransport>>) -> Self {
        Self {
            name: name.into(),
            transports: transports.into(),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn single(transport: ReplayTransport) -> Self {
        let name = transport.name.clone();
        Self::new(name, vec![Some(transport)])
    }

    /// Number of `connect` calls observed so far
    pub fn attempt_counter(&self) -> Arc<AtomicUsize> {
        self.attempts.clone()
    }
}

impl Connector for ReplayConnector {
    fn connect(&mut self) -> Result<Box<dyn Transport>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.transports.pop_front() {
            Some(Some(transport)) => {
                info!("Replay source {} opened", transport.name);
                Ok(Box::new(transport))
            }
            _ => Err(TransportError::DeviceNotFound(self.name.clone())),
        }
    }

    fn describe(&self) -> String {
        format!("replay:{}", self.name)
    }
}
