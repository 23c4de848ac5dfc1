//! The group table: grouping key → current metric group.
//!
//! Plain data structure with no synchronization of its own; the
//! serializer task is its only owner.

use std::collections::BTreeMap;
use std::sync::Arc;

use pushgrid_core::{GroupingKey, MetricFamily, MetricGroup, ValidationResult};

/// Point-in-time view of every group, in grouping-key order.
///
/// Groups are shared with the table, so taking a snapshot copies pointers,
/// not payloads. A later push replaces the table's entry and leaves the
/// snapshot untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    groups: Vec<Arc<MetricGroup>>,
}

impl Snapshot {
    pub fn groups(&self) -> impl Iterator<Item = &MetricGroup> {
        self.groups.iter().map(|g| g.as_ref())
    }

    pub fn get(&self, key: &GroupingKey) -> Option<&MetricGroup> {
        self.groups
            .binary_search_by(|g| g.key.cmp(key))
            .ok()
            .map(|i| self.groups[i].as_ref())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub(crate) fn shared(&self) -> &[Arc<MetricGroup>] {
        &self.groups
    }
}

#[derive(Debug, Default)]
pub struct GroupTable {
    groups: BTreeMap<GroupingKey, Arc<MetricGroup>>,
    /// Sequence number handed to the next accepted push.
    next_seq: u64,
}

impl GroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table from restored groups.
    ///
    /// Push sequence numbers continue after the highest restored one so
    /// first-seen ordering survives a restart.
    pub fn from_groups(groups: Vec<MetricGroup>) -> Self {
        let next_seq = groups.iter().map(|g| g.push_seq + 1).max().unwrap_or(0);
        let groups = groups
            .into_iter()
            .map(|g| (g.key.clone(), Arc::new(g)))
            .collect();
        Self { groups, next_seq }
    }

    /// Install `families` as the whole content of `key`, replacing any
    /// previous group. Returns whether a group was replaced.
    ///
    /// On a validation error the table is left exactly as it was.
    pub fn push(
        &mut self,
        key: GroupingKey,
        families: Vec<MetricFamily>,
        now_ms: u64,
    ) -> ValidationResult<bool> {
        let group = MetricGroup::new(key, families, now_ms, self.next_seq)?;
        self.next_seq += 1;
        let replaced = self
            .groups
            .insert(group.key.clone(), Arc::new(group))
            .is_some();
        Ok(replaced)
    }

    /// Remove the group at exactly `key`. Returns whether one existed.
    pub fn delete(&mut self, key: &GroupingKey) -> bool {
        self.groups.remove(key).is_some()
    }

    pub fn get(&self, key: &GroupingKey) -> Option<&MetricGroup> {
        self.groups.get(key).map(|g| g.as_ref())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            groups: self.groups.values().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
