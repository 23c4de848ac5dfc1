//! redb table definitions for the snapshot file.
//!
//! Groups are keyed by the grouping key's canonical rendering
//! (`instance="i",job="j"`) and hold the JSON-serialized `MetricGroup`.

use redb::TableDefinition;

/// Snapshot metadata keyed by name.
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Metric groups keyed by canonical grouping key.
pub const GROUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("groups");

/// `META` key holding the snapshot format version.
pub const FORMAT_VERSION_KEY: &str = "format_version";

/// Format written by this build.
pub const FORMAT_VERSION: u64 = 1;
