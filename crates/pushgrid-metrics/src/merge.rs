//! Merge engine: folds all pushed groups into one list of families.
//!
//! Every sample gets its group's key labels. Samples for one family name
//! are pooled across groups. The group pushed first decides the family's
//! type and help; disagreeing groups are reported as [`Conflict`]s and
//! their samples still emitted under the winning definition.
//!
//! A series (family name plus final label set) is emitted once. When two
//! groups produce the same series, the earlier push keeps it and the later
//! one is reported and dropped.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use pushgrid_core::{GroupingKey, Labels, MetricFamily, MetricGroup, MetricType, Sample};

/// What a later group disagreed about.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictKind {
    Type { first: MetricType, found: MetricType },
    Help { first: String, found: String },
    /// The group's sample duplicates a series another group already emits.
    DuplicateSeries { labels: Labels },
}

/// Something a later push lost to an earlier group.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub family: String,
    pub group: GroupingKey,
    pub kind: ConflictKind,
}

/// Result of a merge: families sorted by name, plus detected conflicts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exposition {
    pub families: Vec<MetricFamily>,
    pub conflicts: Vec<Conflict>,
}

/// Merge `groups`, which must be given in grouping-key order.
///
/// Output is deterministic: families by name, samples by grouping key
/// and then payload order.
pub fn merge<'a, I>(groups: I) -> Exposition
where
    I: IntoIterator<Item = &'a MetricGroup>,
{
    let groups: Vec<&MetricGroup> = groups.into_iter().collect();

    // Definitions come from the earliest push.
    let mut by_seq = groups.clone();
    by_seq.sort_by(|a, b| a.push_seq.cmp(&b.push_seq).then_with(|| a.key.cmp(&b.key)));

    let mut merged: BTreeMap<&str, MetricFamily> = BTreeMap::new();
    let mut conflicts = Vec::new();
    for group in &by_seq {
        for family in group.families.values() {
            let first = match merged.get(family.name.as_str()) {
                Some(first) => first,
                None => {
                    merged.insert(
                        &family.name,
                        MetricFamily::new(&family.name, &family.help, family.metric_type),
                    );
                    continue;
                }
            };
            if first.metric_type != family.metric_type {
                conflicts.push(Conflict {
                    family: family.name.clone(),
                    group: group.key.clone(),
                    kind: ConflictKind::Type {
                        first: first.metric_type,
                        found: family.metric_type,
                    },
                });
            }
            if first.help != family.help {
                conflicts.push(Conflict {
                    family: family.name.clone(),
                    group: group.key.clone(),
                    kind: ConflictKind::Help {
                        first: first.help.clone(),
                        found: family.help.clone(),
                    },
                });
            }
        }
    }

    // Owner of each series, again by push order.
    let mut owners: HashMap<(&str, Labels), &GroupingKey> = HashMap::new();
    for group in &by_seq {
        for family in group.families.values() {
            for sample in &family.samples {
                owners
                    .entry((family.name.as_str(), with_key_labels(sample, &group.key).labels))
                    .or_insert(&group.key);
            }
        }
    }

    for group in &groups {
        for family in group.families.values() {
            let Some(target) = merged.get_mut(family.name.as_str()) else {
                continue;
            };
            for sample in &family.samples {
                let sample = with_key_labels(sample, &group.key);
                let series = (family.name.as_str(), sample.labels);
                if let Some(&owner) = owners.get(&series)
                    && owner != &group.key
                {
                    conflicts.push(Conflict {
                        family: family.name.clone(),
                        group: group.key.clone(),
                        kind: ConflictKind::DuplicateSeries { labels: series.1 },
                    });
                    continue;
                }
                target.samples.push(Sample {
                    labels: series.1,
                    ..sample
                });
            }
        }
    }

    for conflict in &conflicts {
        match &conflict.kind {
            ConflictKind::Type { first, found } => warn!(
                family = %conflict.family,
                group = %conflict.group,
                %first,
                %found,
                "metric family pushed with conflicting types; keeping first"
            ),
            ConflictKind::Help { .. } => warn!(
                family = %conflict.family,
                group = %conflict.group,
                "metric family pushed with conflicting help; keeping first"
            ),
            ConflictKind::DuplicateSeries { labels } => warn!(
                family = %conflict.family,
                group = %conflict.group,
                ?labels,
                "series already pushed by another group; dropping it"
            ),
        }
    }

    Exposition {
        families: merged.into_values().collect(),
        conflicts,
    }
}

fn with_key_labels(sample: &Sample, key: &GroupingKey) -> Sample {
    let mut sample = sample.clone();
    for (name, value) in key.pairs() {
        sample.labels.insert(name.clone(), value.clone());
    }
    sample
}
