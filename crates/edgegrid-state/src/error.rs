//! Record store errors.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

/// Every redb failure is flattened to text: callers only log it or
/// turn it into an error reply.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot open record store: {0}")]
    Open(String),

    #[error("record store transaction failed: {0}")]
    Transaction(String),

    #[error("record store table unavailable: {0}")]
    Table(String),

    #[error("record store read failed: {0}")]
    Read(String),

    #[error("record store write failed: {0}")]
    Write(String),

    #[error("cannot encode record: {0}")]
    Serialize(String),

    #[error("cannot decode stored record: {0}")]
    Deserialize(String),

    /// Strict insert hit an existing key.
    #[error("record {0} already exists")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),
}
