//! Per-operation handlers.

use edgegrid_bus::{Content, Message};
use edgegrid_core::modules::{
    CLOUD_CONTROLLER, CLOUD_FUNCTION, DYNAMIC_CONTROLLER, EDGE_FUNCTION, EDGED,
};
use edgegrid_core::resource::status_key_for_pod;
use edgegrid_core::{ConnectionEvent, Operation, ParsedResource, ResourceType, parse_resource};
use edgegrid_state::Record;
use tracing::{debug, error, info, warn};

use crate::error::{MetaError, MetaResult};
use crate::manager::MetaManager;

impl MetaManager {
    /// Dispatch one message. Failures become error replies; nothing
    /// here ever stops the loop.
    pub async fn handle(&self, msg: Message) {
        debug!(
            msg_id = %msg.id,
            source = %msg.source,
            resource = %msg.resource,
            operation = %msg.operation,
            "processing message"
        );

        let result = match msg.operation_kind() {
            Some(Operation::Insert) => self.process_insert(&msg).await,
            Some(Operation::Update) => self.process_update(&msg).await,
            Some(Operation::Delete) => self.process_delete(&msg).await,
            Some(Operation::Query) => self.process_query(&msg).await,
            Some(Operation::Response) => self.process_response(&msg).await,
            Some(Operation::NodeConnection) => {
                self.process_node_connection(&msg);
                Ok(())
            }
            Some(Operation::MetaSync) => {
                if let Err(e) = self.sync_pod_status().await {
                    error!(error = %e, "pod status sync failed");
                }
                Ok(())
            }
            Some(Operation::FunctionAction) => self.process_function_action(&msg).await,
            Some(Operation::FunctionActionResult) => {
                self.process_function_action_result(&msg).await
            }
            Some(op) if op.is_volume() => {
                self.process_volume(msg.clone());
                Ok(())
            }
            _ => {
                warn!(operation = %msg.operation, msg_id = %msg.id, "no handler for operation");
                Ok(())
            }
        };

        if let Err(e) = result {
            error!(msg_id = %msg.id, resource = %msg.resource, error = %e, "message processing failed");
            self.feedback_error(&e, &msg).await;
        }
    }

    async fn process_insert(&self, msg: &Message) -> MetaResult<()> {
        let parsed = legal_resource(msg)?;
        let value = body_value(&msg.content)?;
        self.store
            .insert(&Record::new(parsed.key, parsed.res_type, value))?;

        self.send_to_edged(msg.clone()).await;
        self.ok_to_cloud(msg).await;
        Ok(())
    }

    async fn process_update(&self, msg: &Message) -> MetaResult<()> {
        let parsed = legal_resource(msg)?;
        let value = body_value(&msg.content)?;

        if parsed.is(ResourceType::PodStatus) && self.resource_unchanged(&parsed.key, &value)? {
            debug!(key = %parsed.key, "pod status unchanged");
            self.ok_to_edged(msg).await;
            return Ok(());
        }

        let is_pod_status = parsed.is(ResourceType::PodStatus);
        self.store
            .insert_or_update(&Record::new(parsed.key, parsed.res_type, value))?;

        match msg.source.as_str() {
            EDGED => {
                self.send_to_cloud(msg.clone()).await;
                // The cloud's answer to a pod status update reaches edged on its own.
                if !is_pod_status {
                    self.ok_to_edged(msg).await;
                }
            }
            CLOUD_CONTROLLER | DYNAMIC_CONTROLLER => {
                self.send_to_edged(msg.clone()).await;
                self.ok_to_cloud(msg).await;
            }
            CLOUD_FUNCTION => self.send_to_edge_function(msg.clone()).await,
            EDGE_FUNCTION => self.send_to_cloud(msg.clone()).await,
            other => warn!(source = %other, resource = %msg.resource, "unsupported update source"),
        }
        Ok(())
    }

    fn resource_unchanged(&self, key: &str, value: &str) -> MetaResult<bool> {
        Ok(self
            .store
            .query_by_key(key)?
            .is_some_and(|stored| stored.value == value))
    }

    async fn process_delete(&self, msg: &Message) -> MetaResult<()> {
        let parsed = legal_resource(msg)?;
        self.store.delete_by_key(&parsed.key)?;

        let is_pod = parsed.is(ResourceType::Pod);
        if is_pod {
            self.store.delete_by_key(&status_key_for_pod(&parsed.key))?;
        }

        if is_pod && msg.source == EDGED {
            self.send_to_cloud(msg.clone()).await;
        } else {
            self.send_to_edged(msg.clone()).await;
            self.ok_to_cloud(msg).await;
        }
        Ok(())
    }

    async fn process_query(&self, msg: &Message) -> MetaResult<()> {
        let parsed = legal_resource(msg)?;

        if let Some(ty) = parsed.resource_type().filter(|t| t.requires_remote_query())
            && self.connection.is_connected()
        {
            let cached = self.store.query_by_key(&parsed.key)?;
            match cached {
                Some(record) if !ty.always_fresh() => {
                    self.reply_with_values(msg, vec![record.value]).await;
                }
                _ => self.spawn_remote_query(msg.clone()).await,
            }
            return Ok(());
        }

        let values = if parsed.res_id.is_empty() {
            self.store
                .query_by_type(&parsed.res_type)?
                .into_iter()
                .map(|r| r.value)
                .collect()
        } else {
            self.store
                .query_by_key(&parsed.key)?
                .map(|r| r.value)
                .into_iter()
                .collect()
        };
        self.reply_with_values(msg, values).await;
        Ok(())
    }

    async fn reply_with_values(&self, msg: &Message, values: Vec<String>) {
        let body = serde_json::Value::Array(values.into_iter().map(serde_json::Value::String).collect());
        let reply = msg.new_response(Content::Json(body));
        self.reply_to_source(msg, reply).await;
    }

    async fn process_response(&self, msg: &Message) -> MetaResult<()> {
        let parsed = legal_resource(msg)?;
        let value = body_value(&msg.content)?;
        self.store
            .insert_or_update(&Record::new(parsed.key, parsed.res_type, value))?;

        match msg.source.as_str() {
            CLOUD_CONTROLLER | DYNAMIC_CONTROLLER => self.send_to_edged(msg.clone()).await,
            _ => self.send_to_cloud(msg.clone()).await,
        }
        Ok(())
    }

    fn process_node_connection(&self, msg: &Message) {
        let Some(event) = msg.content.as_str().and_then(ConnectionEvent::parse) else {
            warn!(content = ?msg.content, "unrecognized connection event");
            return;
        };
        let came_up = self.connection.apply(event);
        info!(event = event.as_str(), came_up, "cloud connection changed");
        if event == ConnectionEvent::Connected {
            self.run_connected_hooks();
        }
    }

    async fn process_function_action(&self, msg: &Message) -> MetaResult<()> {
        let parsed = legal_resource(msg)?;
        let value = body_value(&msg.content)?;
        self.store
            .insert_or_update(&Record::new(parsed.key, parsed.res_type, value))?;
        self.send_to_edge_function(msg.clone()).await;
        Ok(())
    }

    async fn process_function_action_result(&self, msg: &Message) -> MetaResult<()> {
        let parsed = legal_resource(msg)?;
        let value = body_value(&msg.content)?;
        self.store
            .insert_or_update(&Record::new(parsed.key, parsed.res_type, value))?;
        self.send_to_cloud(msg.clone()).await;
        Ok(())
    }

    /// Relay a CSI call to edged and its answer to the cloud, off the loop.
    fn process_volume(&self, msg: Message) {
        let this = self.clone();
        tokio::spawn(async move {
            let deadline = this.config.csi_deadline();
            match this.bus.send_sync(EDGED, msg.clone(), deadline).await {
                Ok(resp) => {
                    debug!(msg_id = %msg.id, operation = %msg.operation, "volume call answered");
                    this.send_to_cloud(resp.with_parent_id(msg.id.clone())).await;
                }
                Err(e) => {
                    error!(msg_id = %msg.id, operation = %msg.operation, error = %e, "volume call failed");
                }
            }
        });
    }
}

fn legal_resource(msg: &Message) -> MetaResult<ParsedResource> {
    let parsed = parse_resource(&msg.resource);
    if parsed.is_legal() {
        Ok(parsed)
    } else {
        Err(MetaError::Route(msg.resource.clone()))
    }
}

/// The body as the JSON text to cache. Rejects anything that is not JSON.
pub(crate) fn body_value(content: &Content) -> MetaResult<String> {
    if let Content::Json(value) = content
        && !value.is_string()
    {
        return Ok(value.to_string());
    }
    let data = content.payload();
    serde_json::from_slice::<serde::de::IgnoredAny>(&data)
        .map_err(|e| MetaError::ContentDecode(e.to_string()))?;
    String::from_utf8(data).map_err(|e| MetaError::ContentDecode(e.to_string()))
}
