//! edgegrid-task: imperative node tasks issued by the cloud.
//!
//! # Flow
//!
//! ```text
//!   cloud ──▶ taskmanager inbox ──▶ TaskManager ──▶ ActionRegistry ──▶ NodeUpgradeJobRunner
//!                                                                         │
//!                     job record persisted ◀── before any action runs ────┤
//!                     report file written  ◀── terminal action failed ────┘
//!
//!   connected event ──▶ TaskReconciler
//!                          1. read report file
//!                          2. send status upstream
//!                          3. remove report file
//!                          4. failed upgrade → rollback, else drop job record
//! ```
//!
//! Upgrade and rollback may replace the running binary, so the report
//! file, not memory, carries the outcome across restarts.

pub mod error;
pub mod executor;
pub mod manager;
pub mod message;
pub mod reconciler;
pub mod report;
pub mod resource;
pub mod runner;
pub mod upgrade;

pub use error::{TaskError, TaskResult};
pub use executor::{CommandExecutor, ShellExecutor};
pub use manager::TaskManager;
pub use message::{StatusReporter, UpstreamMessage};
pub use reconciler::TaskReconciler;
pub use report::{ReportEvent, ReportFile, TaskReport};
pub use resource::NodeTaskResource;
pub use runner::{ActionRegistry, ActionRunner};
pub use upgrade::{NODE_UPGRADE_JOB, NodeUpgradeJobRunner, NodeUpgradeJobSpec, UpgradeAction};
