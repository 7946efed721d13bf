use thiserror::Error;

use crate::mapping::MappingError;
use crate::serial::TransportError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid mapping configuration: {0}")]
    Config(#[from] MappingError),

    #[error("Invalid tick rate: {0} Hz")]
    InvalidTickRate(f32),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Pipeline worker failed: {0}")]
    Worker(String),
}
