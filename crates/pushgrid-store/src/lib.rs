//! pushgrid-store — the grouped metric store.
//!
//! One serializer task owns the group table. Every other task talks to it
//! through a cloneable [`MetricStore`] handle over a bounded queue, which
//! gives push, delete, snapshot and shutdown a single total order.
//!
//! # Architecture
//!
//! ```text
//! MetricStore (handle, Clone)
//!   ├── push() / delete() / snapshot() / flush() / shutdown()
//!   └── mpsc queue ──▶ Serializer task
//!                        ├── GroupTable   (key → Arc<MetricGroup>)
//!                        └── Persister    (redb snapshot file)
//!                              ▲
//!        debounce timer ───────┘ (enqueues Persist requests)
//! ```
//!
//! Persistence is best effort: load and write failures are logged and the
//! in-memory table stays authoritative.

pub mod error;
pub mod persist;
mod serializer;
pub mod store;
pub mod table;
pub mod tables;

pub use error::{PersistError, PersistResult, StoreError, StoreResult};
pub use store::{MetricStore, StoreOptions};
pub use table::{GroupTable, Snapshot};
