//! Error types for the message bus.

use std::time::Duration;

use thiserror::Error;

pub type BusResult<T> = Result<T, BusError>;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("module not registered: {0}")]
    UnknownModule(String),

    #[error("inbox full for module {0}")]
    QueueFull(String),

    #[error("inbox closed for module {0}")]
    Closed(String),

    #[error("timed out after {timeout:?} waiting on {module}")]
    Timeout { module: String, timeout: Duration },

    #[error("no waiter for response to {0}")]
    NoWaiter(String),

    #[error("content decode error: {0}")]
    ContentDecode(String),
}
