//! Error types for resource clients.

use edgegrid_bus::BusError;
use edgegrid_state::StateError;
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection interrupted")]
    Disconnected,

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("content decode error: {0}")]
    ContentDecode(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("store error: {0}")]
    Store(#[from] StateError),

    #[error("bus error: {0}")]
    Bus(BusError),
}

impl From<BusError> for ClientError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Timeout { .. } => ClientError::Timeout(err.to_string()),
            BusError::ContentDecode(reason) => ClientError::ContentDecode(reason),
            other => ClientError::Bus(other),
        }
    }
}
