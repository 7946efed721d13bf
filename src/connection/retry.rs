//! Reconnect policies for a faulted connection

use tracing::debug;

/// Decides whether the supervisor should try to reopen a faulted transport
///
/// Consulted once per tick while the connection is `Faulted`.
pub trait RetryPolicy: Send {
    /// `ticks_since_fault` counts from the last fault or failed attempt,
    /// starting at 1; `attempts` is the number of reopen attempts so far.
    fn should_retry(&mut self, ticks_since_fault: u64, attempts: u32) -> bool;

    /// Called after a successful (re)open
    fn on_connected(&mut self) {}

    fn describe(&self) -> String;
}

/// Stay faulted until the caller reopens explicitly
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl RetryPolicy for NeverRetry {
    fn should_retry(&mut self, _ticks_since_fault: u64, _attempts: u32) -> bool {
        false
    }

    fn describe(&self) -> String {
        "never".to_string()
    }
}

/// Reattempt every `every_ticks` ticks, at most `max_attempts` times in a row
#[derive(Debug, Clone, Copy)]
pub struct RetryEveryTicks {
    pub every_ticks: u64,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl RetryEveryTicks {
    pub fn new(every_ticks: u64, max_attempts: Option<u32>) -> Self {
        Self {
            every_ticks: every_ticks.max(1),
            max_attempts,
        }
    }
}

impl RetryPolicy for RetryEveryTicks {
    fn should_retry(&mut self, ticks_since_fault: u64, attempts: u32) -> bool {
        if let Some(max) = self.max_attempts {
            if attempts >= max {
                return false;
            }
        }
        let due = ticks_since_fault >= self.every_ticks;
        if due {
            debug!(
                "Retry due after {} ticks (attempt {})",
                ticks_since_fault,
                attempts + 1
            );
        }
        due
    }

    fn describe(&self) -> String {
        match self.max_attempts {
            Some(max) => format!("every {} ticks, {} attempts", self.every_ticks, max),
            None => format!("every {} ticks", self.every_ticks),
        }
    }
}
