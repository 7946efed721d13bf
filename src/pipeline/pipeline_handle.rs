//! Fixed-rate driver running a pipeline on a blocking worker thread
//!
//! Serial reads block for up to the read timeout, so the loop runs on
//! `spawn_blocking` instead of the async executor. Output leaves through
//! `watch` channels: the host always sees the latest value, never a backlog.

use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::engine::{Pipeline, PipelineDiagnostics, Running, TickInput, TickOutcome};
use super::error::PipelineError;
use crate::mapping::ControlSignal;

pub const DEFAULT_TICK_RATE_HZ: f32 = 60.0;

/// Handle for a pipeline running in a background worker
///
/// Dropping the handle requests shutdown; the worker then releases the
/// transport on its own.
#[derive(Debug)]
pub struct PipelineHandle {
    pub name: String,

    signal_rx: watch::Receiver<ControlSignal>,

    diagnostics_rx: watch::Receiver<PipelineDiagnostics>,

    hold_tx: watch::Sender<bool>,

    shutdown_token: CancellationToken,

    task_handle: Option<JoinHandle<ControlSignal>>,
}

impl PipelineHandle {
    /// Spawns the tick loop at `tick_rate_hz`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(pipeline: Pipeline<Running>, tick_rate_hz: f32) -> Result<Self, PipelineError> {
        if !(tick_rate_hz.is_finite() && tick_rate_hz > 0.0) {
            return Err(PipelineError::InvalidTickRate(tick_rate_hz));
        }
        let period = Duration::try_from_secs_f32(1.0 / tick_rate_hz)
            .map_err(|_| PipelineError::InvalidTickRate(tick_rate_hz))?;

        let name = pipeline.config().name.clone();
        let (signal_tx, signal_rx) = watch::channel(*pipeline.signal());
        let (diagnostics_tx, diagnostics_rx) = watch::channel(pipeline.diagnostics().clone());
        let (hold_tx, hold_rx) = watch::channel(false);
        let shutdown_token = pipeline.shutdown_token();

        let worker_name = name.clone();
        let task_handle = tokio::task::spawn_blocking(move || {
            info!("Spawning pipeline worker: {} at {} Hz", worker_name, tick_rate_hz);
            run_loop(pipeline, period, signal_tx, diagnostics_tx, hold_rx)
        });

        Ok(Self {
            name,
            signal_rx,
            diagnostics_rx,
            hold_tx,
            shutdown_token,
            task_handle: Some(task_handle),
        })
    }

    /// Latest control signal
    pub fn signal(&self) -> ControlSignal {
        *self.signal_rx.borrow()
    }

    pub fn subscribe_signal(&self) -> watch::Receiver<ControlSignal> {
        self.signal_rx.clone()
    }

    /// Latest diagnostic snapshot
    pub fn diagnostics(&self) -> PipelineDiagnostics {
        self.diagnostics_rx.borrow().clone()
    }

    pub fn subscribe_diagnostics(&self) -> watch::Receiver<PipelineDiagnostics> {
        self.diagnostics_rx.clone()
    }

    /// Sets the external hold flag read at every tick
    pub fn set_hold(&self, hold: bool) {
        self.hold_tx.send_replace(hold);
    }

    pub fn is_finished(&self) -> bool {
        self.task_handle
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Requests shutdown and waits for the worker to release the transport
    ///
    /// Returns the final control signal.
    pub async fn shutdown(&mut self) -> Result<ControlSignal, PipelineError> {
        debug!("Sending shutdown signal to pipeline: {}", self.name);
        self.shutdown_token.cancel();

        match self.task_handle.take() {
            Some(handle) => match handle.await {
                Ok(signal) => {
                    debug!("Pipeline worker completed: {}", self.name);
                    Ok(signal)
                }
                Err(e) => {
                    error!("Pipeline worker panicked: {} - {}", self.name, e);
                    Err(PipelineError::Worker(e.to_string()))
                }
            },
            None => {
                debug!("Pipeline already shut down: {}", self.name);
                Ok(self.signal())
            }
        }
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        if self.task_handle.is_some() {
            warn!("Pipeline handle dropped without shutdown: {}", self.name);
        }
        self.shutdown_token.cancel();
    }
}

fn run_loop(
    mut pipeline: Pipeline<Running>,
    period: Duration,
    signal_tx: watch::Sender<ControlSignal>,
    diagnostics_tx: watch::Sender<PipelineDiagnostics>,
    hold_rx: watch::Receiver<bool>,
) -> ControlSignal {
    let mut last_tick = Instant::now();

    loop {
        let started = Instant::now();
        let dt = started.duration_since(last_tick);
        last_tick = started;

        let hold = *hold_rx.borrow();
        match pipeline.tick(TickInput { dt, hold }) {
            TickOutcome::ShutdownRequested => break,
            TickOutcome::Updated(signal) => {
                signal_tx.send_replace(signal);
            }
            TickOutcome::Idle => {
                let signal = *pipeline.signal();
                signal_tx.send_if_modified(|current| {
                    let changed = *current != signal;
                    *current = signal;
                    changed
                });
            }
            TickOutcome::Faulted => {
                warn!(
                    "Pipeline '{}' faulted, holding last output",
                    pipeline.config().name
                );
            }
            _ => {}
        }
        diagnostics_tx.send_replace(pipeline.diagnostics().clone());

        if let Some(remaining) = period.checked_sub(started.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    let stopped = pipeline.shutdown();
    diagnostics_tx.send_replace(stopped.diagnostics().clone());
    info!("Pipeline worker stopped: {}", stopped.config().name);
    stopped.into_signal()
}
