//! Shared fixtures for the meta-manager unit tests.

use std::time::Duration;

use edgegrid_bus::{Content, Message, MessageBus};
use edgegrid_core::CloudConnection;
use edgegrid_core::config::MetaManagerConfig;
use edgegrid_core::modules::*;
use edgegrid_state::{Record, StateStore};

use crate::manager::{ConnectedHook, MetaManager};

pub(crate) struct Harness {
    pub bus: MessageBus,
    pub store: StateStore,
    pub connection: CloudConnection,
    pub meta: MetaManager,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(None, MetaManagerConfig::default()).await
    }

    pub async fn with_hook(hook: ConnectedHook) -> Self {
        Self::build(Some(hook), MetaManagerConfig::default()).await
    }

    pub async fn with_config(config: MetaManagerConfig) -> Self {
        Self::build(None, config).await
    }

    async fn build(hook: Option<ConnectedHook>, config: MetaManagerConfig) -> Self {
        let bus = MessageBus::new();
        bus.register(META_MANAGER, META_GROUP).await;
        bus.register(EDGED, EDGED_GROUP).await;
        bus.register(EDGE_HUB, HUB_GROUP).await;
        bus.register(EDGE_FUNCTION, EDGE_FUNCTION).await;

        let store = StateStore::open_in_memory().unwrap();
        let connection = CloudConnection::new();
        let mut meta = MetaManager::new(bus.clone(), store.clone(), connection.clone(), config);
        if let Some(hook) = hook {
            meta = meta.with_connected_hook(hook);
        }
        Self {
            bus,
            store,
            connection,
            meta,
        }
    }

    pub fn connect(&self) {
        self.connection.set_connected(true);
    }

    pub fn seed(&self, key: &str, value: &str) {
        self.store
            .insert_or_update(&Record::from_key(key, value))
            .unwrap();
    }

    /// Next message in `module`'s inbox, failing the test after a second.
    pub async fn next(&self, module: &str) -> Message {
        tokio::time::timeout(Duration::from_secs(1), self.bus.receive(module))
            .await
            .unwrap_or_else(|_| panic!("nothing arrived for {module}"))
            .unwrap()
    }

    pub async fn assert_idle(&self, module: &str) {
        let queued = self.bus.try_receive(module).await.unwrap();
        assert!(queued.is_none(), "unexpected message for {module}: {queued:?}");
    }
}

pub(crate) fn cloud_msg(resource: &str, operation: &str, content: impl Into<Content>) -> Message {
    Message::new()
        .build_router(CLOUD_CONTROLLER, RESOURCE_GROUP, resource, operation)
        .fill_body(content)
}

pub(crate) fn edged_msg(resource: &str, operation: &str, content: impl Into<Content>) -> Message {
    Message::new()
        .build_router(EDGED, META_GROUP, resource, operation)
        .fill_body(content)
}

pub(crate) fn connection_msg(event: &str) -> Message {
    Message::new()
        .build_router(NODE_CONNECTION, META_GROUP, "node/connection", "node-connection-event")
        .fill_body(event)
}
