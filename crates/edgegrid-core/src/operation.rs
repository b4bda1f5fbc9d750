//! Operation tokens carried in a message's route.

use std::fmt;

/// The closed set of operations the meta-manager understands.
///
/// Node-task action verbs (`upgrade`, `rollback`, ...) are deliberately
/// not part of this enum: they are owned by whichever action runner is
/// registered for the task's resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Insert,
    Update,
    Delete,
    Query,
    Response,
    /// Error response to a failed request.
    Error,
    NodeConnection,
    MetaSync,
    FunctionAction,
    FunctionActionResult,
    CsiCreateVolume,
    CsiDeleteVolume,
    CsiPublishVolume,
    CsiUnpublishVolume,
    /// Upstream node-task status report.
    UpdateNodeTaskStatus,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Query => "query",
            Operation::Response => "response",
            Operation::Error => "error",
            Operation::NodeConnection => "node-connection-event",
            Operation::MetaSync => "meta-sync",
            Operation::FunctionAction => "function-action",
            Operation::FunctionActionResult => "function-action-result",
            Operation::CsiCreateVolume => "csi-create-volume",
            Operation::CsiDeleteVolume => "csi-delete-volume",
            Operation::CsiPublishVolume => "csi-publish-volume",
            Operation::CsiUnpublishVolume => "csi-unpublish-volume",
            Operation::UpdateNodeTaskStatus => "update-node-task-status",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        let op = match token {
            "insert" => Operation::Insert,
            "update" => Operation::Update,
            "delete" => Operation::Delete,
            "query" => Operation::Query,
            "response" => Operation::Response,
            "error" => Operation::Error,
            "node-connection-event" => Operation::NodeConnection,
            "meta-sync" => Operation::MetaSync,
            "function-action" => Operation::FunctionAction,
            "function-action-result" => Operation::FunctionActionResult,
            "csi-create-volume" => Operation::CsiCreateVolume,
            "csi-delete-volume" => Operation::CsiDeleteVolume,
            "csi-publish-volume" => Operation::CsiPublishVolume,
            "csi-unpublish-volume" => Operation::CsiUnpublishVolume,
            "update-node-task-status" => Operation::UpdateNodeTaskStatus,
            _ => return None,
        };
        Some(op)
    }

    /// CSI volume verbs are relayed to edged synchronously.
    pub fn is_volume(&self) -> bool {
        matches!(
            self,
            Operation::CsiCreateVolume
                | Operation::CsiDeleteVolume
                | Operation::CsiPublishVolume
                | Operation::CsiUnpublishVolume
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
