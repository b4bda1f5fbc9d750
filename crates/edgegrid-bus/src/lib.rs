//! edgegrid-bus: in-process message routing between edge modules.
//!
//! Every subsystem on the edge node talks through [`MessageBus`]:
//!
//! ```text
//!   client ──send_sync──▶ [metamanager inbox] ──▶ meta loop
//!                                                   │
//!   client ◀──send_resp (parentID = request id) ────┘
//!
//!   meta loop ──send_to_group("hub")──▶ [websocket inbox] ──▶ cloud
//! ```
//!
//! Modules register under a name and a group. Each module has a bounded
//! inbox; messages from one producer to one module arrive in order.
//! Synchronous requests are correlated by message id through a table of
//! pending one-shot waiters.

pub mod bus;
pub mod error;
pub mod message;

pub use bus::{DEFAULT_INBOX_CAPACITY, MessageBus};
pub use error::{BusError, BusResult};
pub use message::{Content, Message};
