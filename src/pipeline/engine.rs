//! Tick-driven pipeline with a statum lifecycle
//!
//! # State Machine
//!
//! ```text
//! Initializing ──initialize──► Running ──shutdown──► Stopped
//!                                 │ ▲
//!                                 └─┘ tick
//! ```
//!
//! # Data flow per tick
//!
//! ```text
//! Supervisor ──► RawFrame ──parse──► QuaternionSample ──source──► RawOrientation
//!                                                                      │
//!                              ControlSignal ◄──SignalConditioner──────┘
//! ```
//!
//! Every failure path leaves the [`ControlSignal`] untouched, so the host
//! sees the last good value frozen instead of a jump to a default. A tick
//! without data only moves the output under a law that advances while idle.

use chrono::{DateTime, Local};
use statum::{machine, state};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::error::PipelineError;
use crate::connection::{ConnectionState, ConnectionSupervisor};
use crate::mapping::{
    ControlSignal, MappingConfig, OrientationMapper, RawOrientation, SignalConditioner,
};
use crate::sensor::{self, ParseError};

/// States for the pipeline lifecycle using statum
#[state]
#[derive(Debug, Clone)]
pub enum PipelineState {
    Initializing, // Config validated, transport not acquired yet
    Running,      // Accepting ticks
    Stopped,      // Transport released
}

/// Inputs the host supplies with every tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickInput {
    /// Time elapsed since the previous tick
    pub dt: Duration,
    /// External hold ("game over"), skips output while the transport stays open
    pub hold: bool,
}

impl TickInput {
    pub fn new(dt: Duration) -> Self {
        Self { dt, hold: false }
    }

    pub fn held(dt: Duration) -> Self {
        Self { dt, hold: true }
    }
}

/// What happened during one tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A frame was applied
    Updated(ControlSignal),
    /// Read timed out without a complete line; exponential smoothing still
    /// steps towards the last target
    Idle,
    /// A line arrived but was rejected
    ParseRejected(ParseError),
    /// External hold active, nothing read
    Held,
    /// Connection not open, nothing read
    Skipped,
    /// The transport failed during this tick
    Faulted,
    /// Cancellation was requested; call `shutdown`
    ShutdownRequested,
}

/// Read-only snapshot for UI and debugging
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineDiagnostics {
    pub connection_state: ConnectionState,
    pub last_raw_line: Option<String>,
    pub last_frame_at: Option<DateTime<Local>>,
    /// Last rejected line's error; cleared by the next applied frame
    pub last_parse_error: Option<ParseError>,
    pub last_transport_fault: Option<String>,
    pub last_orientation: Option<RawOrientation>,
    pub frames_applied: u64,
    pub parse_failures: u64,
    pub idle_ticks: u64,
    pub skipped_ticks: u64,
}

/// Orientation-to-control-signal pipeline
///
/// The host drives it: one `tick` per update, never overlapping.
#[machine]
pub struct Pipeline<S: PipelineState> {
    config: MappingConfig,
    mapper: OrientationMapper,
    conditioner: SignalConditioner,
    supervisor: ConnectionSupervisor,
    signal: ControlSignal,
    diagnostics: PipelineDiagnostics,
    shutdown_token: CancellationToken,
}

impl<S: PipelineState> Pipeline<S> {
    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    pub fn signal(&self) -> &ControlSignal {
        &self.signal
    }

    pub fn diagnostics(&self) -> &PipelineDiagnostics {
        &self.diagnostics
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// Token checked at the top of every tick; cancel it to request shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }
}

impl Pipeline<Initializing> {
    pub fn create(
        config: MappingConfig,
        supervisor: ConnectionSupervisor,
    ) -> Result<Self, PipelineError> {
        info!(
            "Creating pipeline '{}' on {}",
            config.name,
            supervisor.describe()
        );
        config.validate()?;

        let mapper = config.mapper();
        let conditioner = SignalConditioner::from_config(&config);
        let signal = config.initial_signal();

        Ok(Self::new(
            config,
            mapper,
            conditioner,
            supervisor,
            signal,
            PipelineDiagnostics::default(),
            CancellationToken::new(),
        ))
    }

    /// Opens the transport and starts accepting ticks
    ///
    /// A failed open is not fatal: the pipeline runs `Faulted` and skips
    /// ticks until a retry or an explicit `reconnect` succeeds.
    pub fn initialize(mut self) -> Pipeline<Running> {
        if let Err(e) = self.supervisor.open() {
            warn!("Pipeline '{}' starts without sensor: {}", self.config.name, e);
            self.diagnostics.last_transport_fault = Some(e.to_string());
        }
        self.diagnostics.connection_state = self.supervisor.state();

        info!(
            "Pipeline '{}' running ({})",
            self.config.name, self.diagnostics.connection_state
        );
        self.transition()
    }
}

impl Pipeline<Running> {
    /// Runs one pass: supervise, read, parse, map, condition
    pub fn tick(&mut self, input: TickInput) -> TickOutcome {
        if self.shutdown_token.is_cancelled() {
            return TickOutcome::ShutdownRequested;
        }

        let state = self.supervisor.before_tick();
        self.diagnostics.connection_state = state;
        if state != ConnectionState::Open {
            self.diagnostics.skipped_ticks += 1;
            return TickOutcome::Skipped;
        }

        if input.hold {
            trace!("Hold active, tick skipped");
            return TickOutcome::Held;
        }

        let frame = match self.supervisor.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.diagnostics.idle_ticks += 1;
                let dt = input.dt.as_secs_f32();
                if let Some(signal) = self.conditioner.coast(&self.signal, dt) {
                    self.signal = signal;
                }
                return TickOutcome::Idle;
            }
            Err(e) => {
                debug!("Tick ended by transport fault: {}", e);
                self.diagnostics.last_transport_fault = Some(e.to_string());
                self.diagnostics.connection_state = self.supervisor.state();
                return TickOutcome::Faulted;
            }
        };

        let parsed = sensor::parse(&frame.line);
        self.diagnostics.last_frame_at = Some(frame.received_at);
        self.diagnostics.last_raw_line = Some(frame.line);

        let sample = match parsed {
            Ok(sample) => sample,
            Err(ParseError::Empty) => {
                trace!("Empty line ignored");
                return TickOutcome::ParseRejected(ParseError::Empty);
            }
            Err(e) => {
                match &e {
                    ParseError::MalformedField { .. } => warn!("Rejected sensor frame: {}", e),
                    _ => debug!("Rejected sensor frame: {}", e),
                }
                self.diagnostics.parse_failures += 1;
                self.diagnostics.last_parse_error = Some(e.clone());
                return TickOutcome::ParseRejected(e);
            }
        };

        let raw = self
            .config
            .source
            .read(&self.mapper, &sample, self.config.invert);
        self.signal = self
            .conditioner
            .apply(&self.signal, raw, input.dt.as_secs_f32());

        self.diagnostics.last_orientation = Some(raw);
        self.diagnostics.last_parse_error = None;
        self.diagnostics.frames_applied += 1;

        TickOutcome::Updated(self.signal)
    }

    /// Explicitly reopens a faulted or closed transport
    pub fn reconnect(&mut self) -> Result<(), PipelineError> {
        info!("Reconnect requested for '{}'", self.config.name);
        let result = self.supervisor.open();
        self.diagnostics.connection_state = self.supervisor.state();
        if let Err(e) = &result {
            self.diagnostics.last_transport_fault = Some(e.to_string());
        }
        result.map_err(PipelineError::from)
    }

    /// Releases the transport; the last signal stays readable
    pub fn shutdown(mut self) -> Pipeline<Stopped> {
        info!("Shutting down pipeline '{}'", self.config.name);
        self.shutdown_token.cancel();
        self.supervisor.shutdown();
        self.diagnostics.connection_state = self.supervisor.state();
        self.transition()
    }
}

impl Pipeline<Stopped> {
    pub fn into_signal(self) -> ControlSignal {
        self.signal
    }
}
