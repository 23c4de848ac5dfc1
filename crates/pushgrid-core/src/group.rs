//! Metric groups: one grouping key's current payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};
use crate::key::GroupingKey;
use crate::types::MetricFamily;

/// Everything pushed under one grouping key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricGroup {
    pub key: GroupingKey,
    /// Families by name.
    pub families: BTreeMap<String, MetricFamily>,
    /// Unix timestamp (milliseconds) of the push that installed this group.
    pub last_push_ms: u64,
    /// Store-wide push sequence number; orders groups by first sight.
    #[serde(default)]
    pub push_seq: u64,
}

impl MetricGroup {
    /// Validate `families` against `key` and build the group.
    ///
    /// Rejects duplicate family names, internally inconsistent families,
    /// and any sample label that collides with a grouping key label.
    pub fn new(
        key: GroupingKey,
        families: Vec<MetricFamily>,
        last_push_ms: u64,
        push_seq: u64,
    ) -> ValidationResult<Self> {
        let mut by_name = BTreeMap::new();
        for family in families {
            family.validate()?;
            check_collisions(&key, &family)?;
            if by_name.contains_key(&family.name) {
                return Err(ValidationError::DuplicateFamily(family.name));
            }
            by_name.insert(family.name.clone(), family);
        }
        Ok(Self {
            key,
            families: by_name,
            last_push_ms,
            push_seq,
        })
    }

    pub fn family(&self, name: &str) -> Option<&MetricFamily> {
        self.families.get(name)
    }

    pub fn sample_count(&self) -> usize {
        self.families.values().map(|f| f.samples.len()).sum()
    }
}

fn check_collisions(key: &GroupingKey, family: &MetricFamily) -> ValidationResult<()> {
    for sample in &family.samples {
        if let Some(label) = sample.labels.keys().find(|l| key.contains_label(l)) {
            return Err(ValidationError::LabelCollision {
                family: family.name.clone(),
                label: label.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Labels, MetricType, Sample, SampleValue};

    fn gauge_family(name: &str, label: Option<(&str, &str)>) -> MetricFamily {
        let mut labels = Labels::new();
        if let Some((k, v)) = label {
            labels.insert(k.to_string(), v.to_string());
        }
        MetricFamily::new(name, "help", MetricType::Gauge)
            .with_sample(Sample::new(labels, SampleValue::Gauge { value: 1.0 }))
    }

    #[test]
    fn builds_group_keyed_by_family_name() {
        let key = GroupingKey::job("batch").unwrap();
        let group = MetricGroup::new(
            key.clone(),
            vec![gauge_family("b", None), gauge_family("a", None)],
            1000,
            1,
        )
        .unwrap();
        assert_eq!(group.key, key);
        assert_eq!(group.families.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(group.sample_count(), 2);
    }

    #[test]
    fn rejects_duplicate_family() {
        let key = GroupingKey::job("batch").unwrap();
        let err = MetricGroup::new(
            key,
            vec![gauge_family("a", None), gauge_family("a", Some(("x", "y")))],
            1000,
            1,
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::DuplicateFamily("a".to_string()));
    }

    #[test]
    fn rejects_label_colliding_with_key() {
        let key = GroupingKey::job_instance("batch", "host").unwrap();
        let err = MetricGroup::new(
            key,
            vec![gauge_family("a", Some(("instance", "other")))],
            1000,
            1,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::LabelCollision {
                family: "a".to_string(),
                label: "instance".to_string(),
            }
        );
    }
}
