//! pushgrid-metrics — scrape-side view of the pushed metric groups.
//!
//! Combines every stored group into one ordered, label-augmented list of
//! metric families and renders it in the Prometheus text exposition
//! format.
//!
//! # Architecture
//!
//! ```text
//! Snapshot of groups
//!   └── merge() → Exposition { families, conflicts }
//!         └── render_prometheus() → text/plain for /metrics
//! ```

pub mod merge;
pub mod prometheus;

pub use merge::{merge, Conflict, ConflictKind, Exposition};
pub use prometheus::{render_prometheus, CONTENT_TYPE};
