//! Periodic pod-status sync.
//!
//! A ticker posts `meta-sync` into the meta-manager inbox; the loop
//! then garbage-collects orphaned pod-status records and pushes the
//! rest upstream, one batched update per namespace.

use std::collections::BTreeMap;
use std::time::Duration;

use edgegrid_bus::{Content, Message, MessageBus};
use edgegrid_core::modules::{META_GROUP, META_MANAGER, RESOURCE_GROUP};
use edgegrid_core::resource::pod_key_for_status;
use edgegrid_core::{Operation, ResourceType, parse_resource};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::MetaResult;
use crate::manager::MetaManager;

impl MetaManager {
    /// Run one sync pass. Returns the number of namespaces reported.
    pub async fn sync_pod_status(&self) -> MetaResult<usize> {
        let statuses = self
            .store
            .query_by_type(ResourceType::PodStatus.as_str())?;

        let mut by_namespace: BTreeMap<String, Vec<serde_json::Value>> = BTreeMap::new();
        for record in statuses {
            let pod_key = pod_key_for_status(&record.key);
            if self.store.query_by_key(&pod_key)?.is_none() {
                self.store.delete_by_key(&record.key)?;
                debug!(key = %record.key, "pod gone, status record removed");
                continue;
            }
            match serde_json::from_str(&record.value) {
                Ok(status) => {
                    let namespace = parse_resource(&record.key).namespace().to_string();
                    by_namespace.entry(namespace).or_default().push(status);
                }
                Err(e) => warn!(key = %record.key, error = %e, "skipping undecodable pod status"),
            }
        }

        let batches = by_namespace.len();
        for (namespace, statuses) in by_namespace {
            let count = statuses.len();
            let msg = Message::new()
                .build_router(
                    META_MANAGER,
                    RESOURCE_GROUP,
                    ResourceType::PodStatus.resource(&namespace, ""),
                    Operation::Update.as_str(),
                )
                .fill_body(Content::Json(serde_json::Value::Array(statuses)));
            debug!(%namespace, count, "reporting pod status batch");
            self.send_to_cloud(msg).await;
        }
        Ok(batches)
    }
}

/// Post a `meta-sync` message to the meta-manager every `period`
/// until `shutdown` flips.
pub fn spawn_sync_ticker(
    bus: MessageBus,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(?period, "pod status sync ticker started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(period) => {
                    let msg = Message::new().build_router(
                        META_MANAGER,
                        META_GROUP,
                        ResourceType::PodStatus.as_str(),
                        Operation::MetaSync.as_str(),
                    );
                    if let Err(e) = bus.send(META_MANAGER, msg).await {
                        warn!(error = %e, "failed to post meta-sync");
                    }
                }
                _ = shutdown.changed() => {
                    debug!("pod status sync ticker stopping");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;
    use edgegrid_core::modules::EDGE_HUB;
    use serde_json::json;

    #[tokio::test]
    async fn orphaned_statuses_are_collected() {
        let h = Harness::new().await;
        h.seed("a/pod/live", "{}");
        h.seed("a/pod-status/live", r#"{"phase":"Running"}"#);
        h.seed("a/pod-status/dead", r#"{"phase":"Failed"}"#);

        let batches = h.meta.sync_pod_status().await.unwrap();

        assert_eq!(batches, 1);
        assert!(h.store.query_by_key("a/pod-status/dead").unwrap().is_none());
        assert!(h.store.query_by_key("a/pod-status/live").unwrap().is_some());
        let batch = h.next(EDGE_HUB).await;
        assert_eq!(batch.content, Content::Json(json!([{"phase": "Running"}])));
    }

    #[tokio::test]
    async fn nothing_to_report_sends_nothing() {
        let h = Harness::new().await;
        assert_eq!(h.meta.sync_pod_status().await.unwrap(), 0);
        h.assert_idle(EDGE_HUB).await;
    }

    #[tokio::test]
    async fn ticker_posts_meta_sync_until_shutdown() {
        let bus = MessageBus::new();
        bus.register(META_MANAGER, META_GROUP).await;
        let (tx, rx) = watch::channel(false);

        let handle = spawn_sync_ticker(bus.clone(), Duration::from_millis(10), rx);
        let first = bus.receive(META_MANAGER).await.unwrap();
        assert_eq!(first.operation, "meta-sync");

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
