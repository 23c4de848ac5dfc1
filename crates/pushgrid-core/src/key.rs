//! Grouping key codec.
//!
//! A grouping key is the label set a push is filed under (`job`, and
//! optionally `instance`). Keys are canonicalized by sorting on label
//! name, so two keys are equal exactly when their sorted pairs match,
//! empty values included. Keys of different shapes never compare equal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KeyError, KeyResult};
use crate::labels::{
    escape_label_value, is_reserved_label_name, is_valid_label_name, BUCKET_LABEL, QUANTILE_LABEL,
};

pub const JOB_LABEL: &str = "job";
pub const INSTANCE_LABEL: &str = "instance";

/// Canonical, validated grouping key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<(String, String)>", into = "Vec<(String, String)>")]
pub struct GroupingKey {
    pairs: Vec<(String, String)>,
}

impl GroupingKey {
    /// Build a key from caller-supplied label pairs in any order.
    pub fn new<I, N, V>(labels: I) -> KeyResult<Self>
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        let mut pairs: Vec<(String, String)> = labels
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        if pairs.is_empty() {
            return Err(KeyError::Empty);
        }
        for (name, _) in &pairs {
            check_key_label(name)?;
        }
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(dup) = pairs.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(KeyError::DuplicateLabel(dup[0].0.clone()));
        }
        Ok(Self { pairs })
    }

    /// Key for the `/metrics/job/:job` route.
    pub fn job(job: impl Into<String>) -> KeyResult<Self> {
        Self::new([(JOB_LABEL, job.into())])
    }

    /// Key for the `/metrics/job/:job/instance/:instance` route.
    pub fn job_instance(job: impl Into<String>, instance: impl Into<String>) -> KeyResult<Self> {
        Self::new([(JOB_LABEL, job.into()), (INSTANCE_LABEL, instance.into())])
    }

    /// Sorted label pairs.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_label(&self, name: &str) -> bool {
        self.pairs.iter().any(|(n, _)| n == name)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

fn check_key_label(name: &str) -> KeyResult<()> {
    if !is_valid_label_name(name) {
        return Err(KeyError::InvalidLabelName(name.to_string()));
    }
    // `le` and `quantile` are injected by the renderer for bucket/quantile lines.
    if is_reserved_label_name(name) || name == BUCKET_LABEL || name == QUANTILE_LABEL {
        return Err(KeyError::ReservedLabel(name.to_string()));
    }
    Ok(())
}

impl TryFrom<Vec<(String, String)>> for GroupingKey {
    type Error = KeyError;

    fn try_from(pairs: Vec<(String, String)>) -> KeyResult<Self> {
        Self::new(pairs)
    }
}

impl From<GroupingKey> for Vec<(String, String)> {
    fn from(key: GroupingKey) -> Self {
        key.pairs
    }
}

/// Renders as `instance="i",job="j"`, which is also the persistence row key.
impl fmt::Display for GroupingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{name}=\"{}\"", escape_label_value(value))?;
        }
        Ok(())
    }
}
