//! Owns the transport and its Closed/Open/Faulted lifecycle

use std::fmt::{self, Display};
use tracing::{debug, error, info, warn};

use super::retry::{NeverRetry, RetryPolicy};
use crate::serial::{Connector, FrameReader, RawFrame, ReaderSettings, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Closed,
    Open,
    Faulted,
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Closed => write!(f, "Closed"),
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Faulted => write!(f, "Faulted"),
        }
    }
}

/// Exclusive owner of the transport handle
///
/// The handle is closed exactly once: when a fault is detected, on
/// [`shutdown`](Self::shutdown), or when the supervisor is dropped.
pub struct ConnectionSupervisor {
    connector: Box<dyn Connector>,
    settings: ReaderSettings,
    reader: Option<FrameReader>,
    state: ConnectionState,
    retry_policy: Box<dyn RetryPolicy>,
    ticks_since_fault: u64,
    attempts: u32,
    last_fault: Option<String>,
}

impl ConnectionSupervisor {
    pub fn new(connector: Box<dyn Connector>, settings: ReaderSettings) -> Self {
        Self {
            connector,
            settings,
            reader: None,
            state: ConnectionState::Closed,
            retry_policy: Box::new(NeverRetry),
            ticks_since_fault: 0,
            attempts: 0,
            last_fault: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: Box<dyn RetryPolicy>) -> Self {
        debug!("Retry policy: {}", policy.describe());
        self.retry_policy = policy;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn last_fault(&self) -> Option<&str> {
        self.last_fault.as_deref()
    }

    pub fn describe(&self) -> String {
        self.connector.describe()
    }

    /// Acquires the transport; a failure leaves the supervisor `Faulted`
    pub fn open(&mut self) -> Result<(), TransportError> {
        if self.is_open() {
            debug!("Connection {} already open", self.describe());
            return Ok(());
        }

        match self.connector.connect() {
            Ok(transport) => {
                info!("Connection opened: {}", transport.name());
                self.reader = Some(FrameReader::new(transport, self.settings));
                self.state = ConnectionState::Open;
                self.ticks_since_fault = 0;
                self.attempts = 0;
                self.retry_policy.on_connected();
                Ok(())
            }
            Err(e) => {
                error!("Failed to open {}: {}", self.describe(), e);
                self.mark_faulted(&e);
                Err(e)
            }
        }
    }

    /// Per-tick bookkeeping; runs the retry policy while `Faulted`
    pub fn before_tick(&mut self) -> ConnectionState {
        if self.state == ConnectionState::Faulted {
            self.ticks_since_fault = self.ticks_since_fault.saturating_add(1);
            if self
                .retry_policy
                .should_retry(self.ticks_since_fault, self.attempts)
            {
                self.attempts = self.attempts.saturating_add(1);
                info!(
                    "Reconnecting to {} (attempt {})",
                    self.describe(),
                    self.attempts
                );
                // Failure is already logged and recorded by open()
                let _ = self.open();
            }
        }
        self.state
    }

    /// Reads the next line; a transport fault closes the handle
    pub fn read_frame(&mut self) -> Result<Option<RawFrame>, TransportError> {
        let reader = match (&self.state, self.reader.as_mut()) {
            (ConnectionState::Open, Some(reader)) => reader,
            _ => return Err(TransportError::NotOpen),
        };

        match reader.try_read_line() {
            Ok(frame) => Ok(frame),
            Err(e) => {
                warn!("Transport fault on {}: {}", reader.transport_name(), e);
                self.mark_faulted(&e);
                Err(e)
            }
        }
    }

    /// Releases the transport and returns to `Closed`; safe to call repeatedly
    pub fn shutdown(&mut self) {
        if self.state != ConnectionState::Closed {
            info!("Closing connection {}", self.describe());
        }
        self.release();
        self.state = ConnectionState::Closed;
    }

    fn mark_faulted(&mut self, fault: &TransportError) {
        self.release();
        self.state = ConnectionState::Faulted;
        self.ticks_since_fault = 0;
        self.last_fault = Some(fault.to_string());
    }

    fn release(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            match reader.close() {
                Ok(()) => debug!("Transport {} released", reader.transport_name()),
                Err(e) => warn!("Error closing {}: {}", reader.transport_name(), e),
            }
        }
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.release();
    }
}
