//! Module and group names used for bus routing.
//!
//! These names are part of the wire contract with the cloud side and
//! with the local runtime, so they are fixed strings rather than config.

/// The meta-manager module (this node's metadata cache and router).
pub const META_MANAGER: &str = "metamanager";
/// The local container runtime agent.
pub const EDGED: &str = "edged";
/// The cloud tunnel connector.
pub const EDGE_HUB: &str = "websocket";
/// The node-task manager.
pub const TASK_MANAGER: &str = "taskmanager";
/// The edge function runtime.
pub const EDGE_FUNCTION: &str = "edgefunction";

/// Cloud-side modules that appear as message sources.
pub const CLOUD_CONTROLLER: &str = "edgecontroller";
pub const DYNAMIC_CONTROLLER: &str = "dynamiccontroller";
pub const CLOUD_FUNCTION: &str = "funcmgr";

/// Source name carried by connection up/down events.
pub const NODE_CONNECTION: &str = "node-connection";

pub const META_GROUP: &str = "meta";
pub const HUB_GROUP: &str = "hub";
pub const EDGED_GROUP: &str = "edged";
pub const TASK_GROUP: &str = "task";
/// Group stamped on messages the meta-manager originates itself.
pub const RESOURCE_GROUP: &str = "resource";

/// Body of a successful acknowledgement.
pub const OK: &str = "OK";
