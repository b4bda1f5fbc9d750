//! edgegrid-core: shared vocabulary for the EdgeGrid edge node.
//!
//! Everything that more than one subsystem needs to agree on lives here:
//! module and group names used for bus routing, the closed set of
//! operation and resource-type tokens, resource-string parsing, the
//! process-wide cloud connection flag, and the `edgegrid.toml` config.

pub mod config;
pub mod connection;
pub mod modules;
pub mod operation;
pub mod resource;

pub use config::EdgeConfig;
pub use connection::{CloudConnection, ConnectionEvent};
pub use operation::Operation;
pub use resource::{ParsedResource, ResourceType, parse_resource};
