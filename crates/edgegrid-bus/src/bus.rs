//! MessageBus: named module inboxes, groups, and correlated replies.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{BusError, BusResult};
use crate::message::Message;

/// Default bound on each module's inbox.
pub const DEFAULT_INBOX_CAPACITY: usize = 1024;

struct Inbox {
    group: String,
    tx: mpsc::Sender<Message>,
    rx: Arc<Mutex<mpsc::Receiver<Message>>>,
}

struct Inner {
    capacity: usize,
    /// module name → inbox.
    modules: RwLock<HashMap<String, Inbox>>,
    /// request id → waiter blocked in `send_sync`.
    pending: Mutex<HashMap<String, oneshot::Sender<Message>>>,
    enqueued: AtomicU64,
}

/// In-process message dispatcher. Cloning shares the same bus.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<Inner>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INBOX_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity: capacity.max(1),
                modules: RwLock::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                enqueued: AtomicU64::new(0),
            }),
        }
    }

    /// Declare a consumer. Registering an existing module is a no-op.
    pub async fn register(&self, module: &str, group: &str) {
        let mut modules = self.inner.modules.write().await;
        if modules.contains_key(module) {
            debug!(%module, "module already registered");
            return;
        }
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        modules.insert(
            module.to_string(),
            Inbox {
                group: group.to_string(),
                tx,
                rx: Arc::new(Mutex::new(rx)),
            },
        );
        debug!(%module, %group, "module registered");
    }

    pub async fn is_registered(&self, module: &str) -> bool {
        self.inner.modules.read().await.contains_key(module)
    }

    /// Block until the next message for `module` arrives.
    pub async fn receive(&self, module: &str) -> BusResult<Message> {
        let rx = self.receiver(module).await?;
        let mut rx = rx.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| BusError::Closed(module.to_string()))
    }

    /// Take the next queued message for `module` without waiting.
    pub async fn try_receive(&self, module: &str) -> BusResult<Option<Message>> {
        let rx = self.receiver(module).await?;
        let mut rx = rx.lock().await;
        match rx.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(BusError::Closed(module.to_string())),
        }
    }

    /// Non-blocking enqueue. A full inbox drops the message.
    pub async fn send(&self, module: &str, msg: Message) -> BusResult<()> {
        let tx = self.sender(module).await?;
        self.try_enqueue(module, &tx, msg)
    }

    /// Fan out a copy to every module in `group`. Returns how many
    /// inboxes accepted it.
    pub async fn send_to_group(&self, group: &str, msg: Message) -> BusResult<usize> {
        let targets: Vec<(String, mpsc::Sender<Message>)> = {
            let modules = self.inner.modules.read().await;
            modules
                .iter()
                .filter(|(_, inbox)| inbox.group == group)
                .map(|(name, inbox)| (name.clone(), inbox.tx.clone()))
                .collect()
        };
        if targets.is_empty() {
            debug!(%group, msg_id = %msg.id, "no modules in group, message dropped");
            return Ok(0);
        }

        let mut delivered = 0;
        for (module, tx) in &targets {
            match self.try_enqueue(module, tx, msg.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(%group, %module, error = %e, "group delivery failed"),
            }
        }
        Ok(delivered)
    }

    /// Send `msg` under a fresh id and wait for the reply whose
    /// `parent_id` equals that id. The whole exchange shares `timeout`.
    pub async fn send_sync(
        &self,
        module: &str,
        mut msg: Message,
        timeout: Duration,
    ) -> BusResult<Message> {
        let tx = self.sender(module).await?;
        msg = msg.renewed();
        msg.mark_sync();
        let id = msg.id.clone();

        let (resp_tx, resp_rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(id.clone(), resp_tx);

        let exchange = async {
            tx.send(msg)
                .await
                .map_err(|_| BusError::Closed(module.to_string()))?;
            self.inner.enqueued.fetch_add(1, Ordering::Relaxed);
            resp_rx
                .await
                .map_err(|_| BusError::NoWaiter(id.clone()))
        };

        let result = match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(BusError::Timeout {
                module: module.to_string(),
                timeout,
            }),
        };
        if result.is_err() {
            self.inner.pending.lock().await.remove(&id);
        }
        result
    }

    /// Deliver a reply to the `send_sync` caller waiting on `parent_id`.
    pub async fn send_resp(&self, msg: Message) -> BusResult<()> {
        let waiter = self.inner.pending.lock().await.remove(&msg.parent_id);
        match waiter {
            Some(waiter) => {
                let parent = msg.parent_id.clone();
                waiter.send(msg).map_err(|_| BusError::NoWaiter(parent))
            }
            None => Err(BusError::NoWaiter(msg.parent_id)),
        }
    }

    /// Total messages accepted into any inbox since creation.
    pub fn enqueued(&self) -> u64 {
        self.inner.enqueued.load(Ordering::Relaxed)
    }

    /// Number of `send_sync` callers currently waiting.
    pub async fn pending_waiters(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    async fn receiver(&self, module: &str) -> BusResult<Arc<Mutex<mpsc::Receiver<Message>>>> {
        let modules = self.inner.modules.read().await;
        modules
            .get(module)
            .map(|inbox| Arc::clone(&inbox.rx))
            .ok_or_else(|| BusError::UnknownModule(module.to_string()))
    }

    async fn sender(&self, module: &str) -> BusResult<mpsc::Sender<Message>> {
        let modules = self.inner.modules.read().await;
        modules
            .get(module)
            .map(|inbox| inbox.tx.clone())
            .ok_or_else(|| BusError::UnknownModule(module.to_string()))
    }

    fn try_enqueue(
        &self,
        module: &str,
        tx: &mpsc::Sender<Message>,
        msg: Message,
    ) -> BusResult<()> {
        let msg_id = msg.id.clone();
        match tx.try_send(msg) {
            Ok(()) => {
                self.inner.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%module, %msg_id, "inbox full, message dropped");
                Err(BusError::QueueFull(module.to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(BusError::Closed(module.to_string()))
            }
        }
    }
}
