//! Upstream node-task status messages.

use chrono::{SecondsFormat, Utc};
use edgegrid_bus::{Content, Message, MessageBus};
use edgegrid_core::modules::TASK_MANAGER;
use edgegrid_core::{CloudConnection, Operation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{TaskError, TaskResult};
use crate::resource::NodeTaskResource;

/// Body of an `update-node-task-status` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamMessage {
    pub action: String,
    pub succ: bool,
    #[serde(default)]
    pub reason: String,
    /// RFC 3339, UTC.
    pub finish_time: String,
    #[serde(default)]
    pub extend: String,
}

impl UpstreamMessage {
    pub fn new(action: impl Into<String>, error: Option<&str>, extend: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            succ: error.is_none(),
            reason: error.unwrap_or_default().to_string(),
            finish_time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            extend: extend.into(),
        }
    }
}

/// `from->to` version annotation for backup, upgrade and rollback reports.
pub fn format_extend(from_version: &str, to_version: &str) -> String {
    format!("{from_version}->{to_version}")
}

/// Sends task status to the cloud group, but only over a live link.
#[derive(Clone)]
pub struct StatusReporter {
    bus: MessageBus,
    connection: CloudConnection,
    cloud_group: String,
}

impl StatusReporter {
    pub fn new(bus: MessageBus, connection: CloudConnection, cloud_group: impl Into<String>) -> Self {
        Self {
            bus,
            connection,
            cloud_group: cloud_group.into(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Send one status report. Fails unless at least one cloud module took it.
    pub async fn report(&self, resource: &NodeTaskResource, body: &UpstreamMessage) -> TaskResult<()> {
        if !self.connection.is_connected() {
            return Err(TaskError::Disconnected);
        }
        let msg = Message::new()
            .build_router(
                TASK_MANAGER,
                self.cloud_group.clone(),
                resource.to_string(),
                Operation::UpdateNodeTaskStatus.as_str(),
            )
            .fill_body(Content::json(body)?);
        let delivered = self.bus.send_to_group(&self.cloud_group, msg).await?;
        if delivered == 0 {
            return Err(TaskError::Bus(edgegrid_bus::BusError::UnknownModule(format!(
                "group {}",
                self.cloud_group
            ))));
        }
        info!(%resource, action = %body.action, succ = body.succ, "task status reported");
        Ok(())
    }

    /// Report if connected; otherwise just log.
    pub async fn report_if_connected(&self, resource: &NodeTaskResource, body: &UpstreamMessage) {
        if !self.connection.is_connected() {
            debug!(%resource, action = %body.action, succ = body.succ, "offline, task status not reported");
            return;
        }
        if let Err(e) = self.report(resource, body).await {
            warn!(%resource, action = %body.action, error = %e, "task status report failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgegrid_core::modules::{EDGE_HUB, HUB_GROUP};

    fn resource() -> NodeTaskResource {
        NodeTaskResource::new("v1", "nodeupgradejob", "job1", "node1")
    }

    #[test]
    fn body_shape() {
        let body = UpstreamMessage::new("upgrade", Some("boom"), format_extend("1.20", "1.21"));
        let wire = serde_json::to_value(&body).unwrap();
        assert_eq!(wire["action"], "upgrade");
        assert_eq!(wire["succ"], false);
        assert_eq!(wire["reason"], "boom");
        assert_eq!(wire["extend"], "1.20->1.21");
        let finish = wire["finishTime"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(finish).is_ok());
    }

    #[tokio::test]
    async fn report_requires_connection() {
        let bus = MessageBus::new();
        bus.register(EDGE_HUB, HUB_GROUP).await;
        let connection = CloudConnection::new();
        let reporter = StatusReporter::new(bus.clone(), connection.clone(), HUB_GROUP);
        let body = UpstreamMessage::new("check", None, "");

        assert!(matches!(
            reporter.report(&resource(), &body).await,
            Err(TaskError::Disconnected)
        ));
        assert_eq!(bus.enqueued(), 0);

        connection.set_connected(true);
        reporter.report(&resource(), &body).await.unwrap();
        let sent = bus.receive(EDGE_HUB).await.unwrap();
        assert_eq!(sent.operation, "update-node-task-status");
        assert_eq!(sent.source, "taskmanager");
        assert_eq!(sent.resource, "v1/nodeupgradejob/job1/nodes/node1");
    }

    #[tokio::test]
    async fn report_without_cloud_module_fails() {
        let bus = MessageBus::new();
        let connection = CloudConnection::new();
        connection.set_connected(true);
        let reporter = StatusReporter::new(bus, connection, HUB_GROUP);

        let body = UpstreamMessage::new("upgrade", None, "");
        assert!(reporter.report(&resource(), &body).await.is_err());
    }
}
