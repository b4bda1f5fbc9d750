//! MetaManager: the receive loop and its shared handles.

use std::collections::HashMap;
use std::sync::Arc;

use edgegrid_bus::{Message, MessageBus};
use edgegrid_core::CloudConnection;
use edgegrid_core::config::MetaManagerConfig;
use edgegrid_core::modules::{META_GROUP, META_MANAGER};
use edgegrid_state::StateStore;
use tokio::sync::{Mutex, watch};
use tracing::{error, info};

pub type BoxFuture = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

/// Hook run on its own task each time the cloud link reports connected.
pub type ConnectedHook = Arc<dyn Fn() -> BoxFuture + Send + Sync>;

/// Remote queries in flight: resource → requests waiting on the same answer.
pub(crate) type InFlight = Arc<Mutex<HashMap<String, Vec<Message>>>>;

/// The meta-manager. Cloning shares every handle, so spawned
/// continuations see the same store, bus, and connection flag.
#[derive(Clone)]
pub struct MetaManager {
    pub(crate) bus: MessageBus,
    pub(crate) store: StateStore,
    pub(crate) connection: CloudConnection,
    pub(crate) config: Arc<MetaManagerConfig>,
    pub(crate) inflight: InFlight,
    hooks: Vec<ConnectedHook>,
}

impl MetaManager {
    pub fn new(
        bus: MessageBus,
        store: StateStore,
        connection: CloudConnection,
        config: MetaManagerConfig,
    ) -> Self {
        Self {
            bus,
            store,
            connection,
            config: Arc::new(config),
            inflight: Arc::new(Mutex::new(HashMap::new())),
            hooks: Vec::new(),
        }
    }

    /// Register a hook for connection-up events.
    pub fn with_connected_hook(mut self, hook: ConnectedHook) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn connection(&self) -> &CloudConnection {
        &self.connection
    }

    /// Run the receive loop until `shutdown` flips. Messages already
    /// queued when shutdown arrives are still handled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        self.bus.register(META_MANAGER, META_GROUP).await;
        info!("meta manager started");

        loop {
            tokio::select! {
                received = self.bus.receive(META_MANAGER) => match received {
                    Ok(msg) => self.handle(msg).await,
                    Err(e) => {
                        error!(error = %e, "meta manager inbox failed");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    self.drain().await;
                    info!("meta manager shutting down");
                    break;
                }
            }
        }
    }

    async fn drain(&self) {
        while let Ok(Some(msg)) = self.bus.try_receive(META_MANAGER).await {
            self.handle(msg).await;
        }
    }

    pub(crate) fn run_connected_hooks(&self) {
        for hook in &self.hooks {
            tokio::spawn(hook());
        }
    }
}
