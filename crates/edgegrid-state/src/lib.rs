//! edgegrid-state: the edge node's local metadata cache.
//!
//! Backed by [redb](https://docs.rs/redb). Every cached control-plane
//! object is a [`Record`] `(key, type, value)` where `key` is the
//! resource string (`<namespace>/<type>[/<name>]`) and `value` is the
//! object's JSON text, stored exactly as received.
//!
//! # Layout
//!
//! ```text
//!   records          key ──────────────▶ Record JSON
//!   records_by_type  "{type}\0{key}" ──▶ (empty)
//!   task_records     resource type ────▶ TaskRecord JSON
//! ```
//!
//! The type index is written in the same transaction as the record, so
//! every single-record operation is atomic and query-by-type is a
//! range scan. `StateStore` is `Clone + Send + Sync` and can be shared
//! across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
