//! Error types for the meta-manager.

use edgegrid_bus::BusError;
use edgegrid_state::StateError;
use thiserror::Error;

pub type MetaResult<T> = Result<T, MetaError>;

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("content decode error: {0}")]
    ContentDecode(String),

    #[error("store error: {0}")]
    Store(#[from] StateError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("connection interrupted")]
    Disconnected,

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("no route for resource `{0}`")]
    Route(String),

    #[error("bus error: {0}")]
    Bus(BusError),
}

impl From<BusError> for MetaError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Timeout { .. } => MetaError::Timeout(err.to_string()),
            BusError::ContentDecode(reason) => MetaError::ContentDecode(reason),
            other => MetaError::Bus(other),
        }
    }
}
