//! TaskManager: receive loop for cloud-issued node tasks.

use std::sync::Arc;

use edgegrid_bus::{Message, MessageBus};
use edgegrid_core::CloudConnection;
use edgegrid_core::modules::{TASK_GROUP, TASK_MANAGER};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::TaskResult;
use crate::reconciler::TaskReconciler;
use crate::resource::NodeTaskResource;
use crate::runner::ActionRegistry;

#[derive(Clone)]
pub struct TaskManager {
    bus: MessageBus,
    registry: ActionRegistry,
    reconciler: Arc<TaskReconciler>,
    connection: CloudConnection,
}

impl TaskManager {
    pub fn new(
        bus: MessageBus,
        registry: ActionRegistry,
        reconciler: Arc<TaskReconciler>,
        connection: CloudConnection,
    ) -> Self {
        Self {
            bus,
            registry,
            reconciler,
            connection,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        self.bus.register(TASK_MANAGER, TASK_GROUP).await;
        info!("task manager started");

        loop {
            tokio::select! {
                received = self.bus.receive(TASK_MANAGER) => match received {
                    Ok(msg) => {
                        if let Err(e) = self.handle(&msg).await {
                            error!(msg_id = %msg.id, resource = %msg.resource, error = %e, "node task failed");
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "task manager inbox failed");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    info!("task manager shutting down");
                    break;
                }
            }
        }
    }

    /// Run one node-task message to completion, then flush any report
    /// it left behind if the cloud is reachable.
    pub async fn handle(&self, msg: &Message) -> TaskResult<()> {
        debug!(
            msg_id = %msg.id,
            source = %msg.source,
            resource = %msg.resource,
            operation = %msg.operation,
            "node task received"
        );
        let task = NodeTaskResource::parse(&msg.resource)?;
        let spec = msg.content.payload();
        self.registry
            .run_action(
                &task.resource_type,
                &task.job_name,
                &task.node_name,
                &msg.operation,
                &spec,
            )
            .await?;

        if self.connection.is_connected() {
            self.reconciler.reconcile().await?;
        }
        Ok(())
    }
}
