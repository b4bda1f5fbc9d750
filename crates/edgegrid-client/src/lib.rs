//! edgegrid-client: object clients for components running on the node.
//!
//! One generic [`ResourceClient`] stands in for every per-kind client a
//! control-plane SDK would offer. Each call becomes a bus message to the
//! meta-manager with `source = edged`, `group = meta` and
//! `resource = <namespace>/<type>/<name>`.

pub mod client;
pub mod error;

pub use client::{MetaClient, ResourceClient};
pub use error::{ClientError, ClientResult};
