use thiserror::Error;

use crate::gateway::GatewayError;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad caller input, rejected before any side effect.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Absent, or not owned by the caller.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
