//! Orientation-to-control-signal pipeline and its background driver

pub mod engine;
pub mod error;
pub mod pipeline_handle;

pub use engine::{
    Initializing, Pipeline, PipelineDiagnostics, PipelineState, Running, Stopped, TickInput,
    TickOutcome,
};
pub use error::PipelineError;
pub use pipeline_handle::{PipelineHandle, DEFAULT_TICK_RATE_HZ};
