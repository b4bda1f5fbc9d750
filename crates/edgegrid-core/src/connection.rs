//! The process-wide cloud connection flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Content carried by a `node-connection-event` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
}

impl ConnectionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionEvent::Connected => "connected",
            ConnectionEvent::Disconnected => "disconnected",
        }
    }

    pub fn parse(content: &str) -> Option<Self> {
        match content {
            "connected" => Some(ConnectionEvent::Connected),
            "disconnected" => Some(ConnectionEvent::Disconnected),
            _ => None,
        }
    }
}

/// Shared "cloud connected" flag.
///
/// Cloning shares the same flag. Starts disconnected; only the
/// meta-manager loop writes it.
#[derive(Debug, Clone, Default)]
pub struct CloudConnection {
    connected: Arc<AtomicBool>,
}

impl CloudConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Set the flag, returning the previous value.
    pub fn set_connected(&self, connected: bool) -> bool {
        self.connected.swap(connected, Ordering::AcqRel)
    }

    /// Apply an event. Returns true if this was a down → up transition.
    pub fn apply(&self, event: ConnectionEvent) -> bool {
        let up = event == ConnectionEvent::Connected;
        let was = self.set_connected(up);
        up && !was
    }
}
