//! edgegrid-meta: the edge node's meta-manager.
//!
//! A single receive loop on the `metamanager` inbox dispatches every
//! message by operation. Handlers read and write the local record
//! store and route results to edged, the cloud group, or the edge
//! function runtime depending on where the message came from.
//!
//! ```text
//!                 ┌──────────── metamanager inbox ◀── edged / cloud / sync ticker
//!                 ▼
//!          MetaManager::handle ── insert/update/delete/query/response ──▶ StateStore
//!                 │
//!                 ├── cache miss on a remote-required type
//!                 │      └── spawned remote query ──send_sync──▶ cloud connector
//!                 ├── CSI verbs ── spawned round trip ──▶ edged
//!                 └── node-connection-event ──▶ CloudConnection + reconnect hooks
//! ```
//!
//! Handler errors never leave the loop: they become `error` replies
//! addressed to whoever sent the failing message.

pub mod error;
pub mod manager;
mod process;
mod remote;
mod routing;
pub mod sync;

#[cfg(test)]
mod test_util;

pub use error::{MetaError, MetaResult};
pub use manager::{BoxFuture, ConnectedHook, MetaManager};
pub use sync::spawn_sync_ticker;
