//! Remote-query continuation.
//!
//! A cache miss (or an always-fresh type) spawns a task that asks the
//! cloud connector and answers the requester. Concurrent misses for
//! the same resource share one round trip: later requests join the
//! in-flight entry and are answered from the same cloud reply.

use edgegrid_bus::Message;
use edgegrid_core::parse_resource;
use edgegrid_state::Record;
use tracing::{debug, error, warn};

use crate::error::MetaError;
use crate::manager::MetaManager;
use crate::process::body_value;

impl MetaManager {
    pub(crate) async fn spawn_remote_query(&self, msg: Message) {
        {
            let mut inflight = self.inflight.lock().await;
            if let Some(waiters) = inflight.get_mut(&msg.resource) {
                debug!(resource = %msg.resource, msg_id = %msg.id, "joined in-flight remote query");
                waiters.push(msg);
                return;
            }
            inflight.insert(msg.resource.clone(), Vec::new());
        }

        let this = self.clone();
        tokio::spawn(async move { this.remote_query(msg).await });
    }

    async fn remote_query(&self, msg: Message) {
        let target = &self.config.context_send_module;
        let deadline = self.config.remote_query_deadline();
        debug!(resource = %msg.resource, msg_id = %msg.id, %target, "remote query started");

        let outcome = self.bus.send_sync(target, msg.clone(), deadline).await;
        let waiters = self
            .inflight
            .lock()
            .await
            .remove(&msg.resource)
            .unwrap_or_default();
        let requests = std::iter::once(&msg).chain(waiters.iter());

        let resp = match outcome {
            Ok(resp) => resp,
            Err(e) => {
                let err = MetaError::from(e);
                error!(resource = %msg.resource, error = %err, "remote query failed");
                for request in requests {
                    self.feedback_error(&err, request).await;
                }
                return;
            }
        };

        if resp.is_error() {
            let reason = resp.content.as_str().unwrap_or("remote query failed").to_string();
            warn!(resource = %msg.resource, %reason, "cloud rejected remote query");
            for request in requests {
                self.reply_to_source(request, request.new_error(reason.clone()))
                    .await;
            }
            return;
        }

        self.cache_remote_body(&msg, &resp);

        for request in requests {
            let reply = resp.renewed().with_parent_id(request.id.clone());
            self.reply_to_source(request, reply).await;
        }
        self.ok_to_cloud(&resp).await;
    }

    fn cache_remote_body(&self, request: &Message, resp: &Message) {
        let parsed = parse_resource(&request.resource);
        if parsed.res_id.is_empty() {
            return;
        }
        let value = match body_value(&resp.content) {
            Ok(value) => value,
            Err(e) => {
                warn!(resource = %request.resource, error = %e, "remote query result not cached");
                return;
            }
        };
        let record = Record::new(parsed.key, parsed.res_type, value);
        if let Err(e) = self.store.insert_or_update(&record) {
            error!(key = %record.key, error = %e, "caching remote query result failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use edgegrid_bus::Content;
    use edgegrid_core::config::MetaManagerConfig;
    use edgegrid_core::modules::{EDGE_HUB, EDGED, OK};
    use serde_json::json;

    use crate::test_util::*;

    #[tokio::test]
    async fn miss_goes_remote_and_caches() {
        let h = Harness::new().await;
        h.connect();
        let query = edged_msg("ns/secret/s", "query", Content::Empty);

        h.meta.handle(query.clone()).await;

        let remote = h.next(EDGE_HUB).await;
        assert!(remote.is_sync());
        assert_ne!(remote.id, query.id);
        h.bus
            .send_resp(remote.new_response(json!({"data": {"k": "v2"}})))
            .await
            .unwrap();

        let answer = h.next(EDGED).await;
        assert_eq!(answer.parent_id, query.id);
        assert_eq!(answer.content, Content::Json(json!({"data": {"k": "v2"}})));

        let ack = h.next(EDGE_HUB).await;
        assert_eq!(ack.content.as_str(), Some(OK));

        let cached = h.store.query_by_key("ns/secret/s").unwrap().unwrap();
        assert_eq!(cached.value, r#"{"data":{"k":"v2"}}"#);
        assert!(h.meta.inflight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn non_json_remote_body_is_relayed_but_not_cached() {
        let h = Harness::new().await;
        h.connect();
        let query = edged_msg("ns/secret/s", "query", Content::Empty);

        h.meta.handle(query.clone()).await;
        let remote = h.next(EDGE_HUB).await;
        h.bus
            .send_resp(remote.new_response("not json"))
            .await
            .unwrap();

        let answer = h.next(EDGED).await;
        assert_eq!(answer.parent_id, query.id);
        assert_eq!(answer.content.as_str(), Some("not json"));
        assert!(h.store.query_by_key("ns/secret/s").unwrap().is_none());
    }

    #[tokio::test]
    async fn always_fresh_types_ignore_cache() {
        let h = Harness::new().await;
        h.connect();
        h.seed("ns/volume-attachment/va", r#"{"old":true}"#);

        h.meta
            .handle(edged_msg("ns/volume-attachment/va", "query", Content::Empty))
            .await;

        let remote = h.next(EDGE_HUB).await;
        assert_eq!(remote.resource, "ns/volume-attachment/va");
        h.assert_idle(EDGED).await;
    }

    #[tokio::test]
    async fn cache_hit_on_remote_type_stays_local() {
        let h = Harness::new().await;
        h.connect();
        h.seed("ns/configmap/cm", r#"{"k":"v"}"#);

        h.meta
            .handle(edged_msg("ns/configmap/cm", "query", Content::Empty))
            .await;

        let resp = h.next(EDGED).await;
        assert_eq!(resp.content, Content::Json(json!([r#"{"k":"v"}"#])));
        h.assert_idle(EDGE_HUB).await;
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_round_trip() {
        let h = Harness::new().await;
        h.connect();
        let first = edged_msg("ns/configmap/cm", "query", Content::Empty);
        let second = edged_msg("ns/configmap/cm", "query", Content::Empty);

        h.meta.handle(first.clone()).await;
        let remote = h.next(EDGE_HUB).await;
        h.meta.handle(second.clone()).await;
        h.assert_idle(EDGE_HUB).await;

        h.bus
            .send_resp(remote.new_response(json!({"k": "v"})))
            .await
            .unwrap();

        let a = h.next(EDGED).await;
        let b = h.next(EDGED).await;
        let mut parents = vec![a.parent_id, b.parent_id];
        parents.sort();
        let mut want = vec![first.id, second.id];
        want.sort();
        assert_eq!(parents, want);
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn timeout_becomes_error_reply() {
        let config = MetaManagerConfig {
            remote_query_timeout: 0,
            ..MetaManagerConfig::default()
        };
        let h = Harness::with_config(config).await;
        h.connect();
        let query = edged_msg("ns/node/n", "query", Content::Empty);

        h.meta.handle(query.clone()).await;

        let err = tokio::time::timeout(Duration::from_secs(1), h.bus.receive(EDGED))
            .await
            .unwrap()
            .unwrap();
        assert!(err.is_error());
        assert_eq!(err.parent_id, query.id);
        assert!(h.store.query_by_key("ns/node/n").unwrap().is_none());
    }

    #[tokio::test]
    async fn cloud_error_is_relayed() {
        let h = Harness::new().await;
        h.connect();
        let query = edged_msg("ns/secret/missing", "query", Content::Empty);

        h.meta.handle(query.clone()).await;
        let remote = h.next(EDGE_HUB).await;
        h.bus.send_resp(remote.new_error("secret not found")).await.unwrap();

        let err = h.next(EDGED).await;
        assert!(err.is_error());
        assert_eq!(err.parent_id, query.id);
        assert_eq!(err.content.as_str(), Some("secret not found"));
        assert!(h.store.query_by_key("ns/secret/missing").unwrap().is_none());
    }
}
