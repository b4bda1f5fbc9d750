//! Error types for node-task execution.

use edgegrid_bus::BusError;
use edgegrid_state::StateError;
use thiserror::Error;

pub type TaskResult<T> = Result<T, TaskError>;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("invalid task spec: {0}")]
    TaskSpec(String),

    #[error("invalid node task resource `{0}`")]
    InvalidResource(String),

    #[error("no action runner for resource type {0}")]
    UnknownRunner(String),

    #[error("unknown action {0}")]
    UnknownAction(String),

    #[error("store error: {0}")]
    Store(#[from] StateError),

    #[error("report file error: {0}")]
    Report(String),

    #[error("command failed: {0}")]
    Command(String),

    #[error("connection interrupted")]
    Disconnected,

    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}
