//! Metric family types.
//!
//! A family is a named, typed collection of samples. The sample payload
//! is a closed enum over the five metric kinds, so every consumer
//! (validation, merge, rendering, persistence) matches exhaustively.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};
use crate::labels::{
    is_reserved_label_name, is_valid_label_name, is_valid_metric_name, BUCKET_LABEL,
    QUANTILE_LABEL,
};

/// Label set of one sample, sorted by name.
pub type Labels = BTreeMap<String, String>;

/// Declared kind of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Histogram => "histogram",
            MetricType::Summary => "summary",
            MetricType::Untyped => "untyped",
        }
    }

    /// Parse the type token of a `# TYPE` line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "counter" => Some(MetricType::Counter),
            "gauge" => Some(MetricType::Gauge),
            "histogram" => Some(MetricType::Histogram),
            "summary" => Some(MetricType::Summary),
            "untyped" => Some(MetricType::Untyped),
            _ => None,
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One summary quantile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantile {
    #[serde(with = "float")]
    pub quantile: f64,
    #[serde(with = "float")]
    pub value: f64,
}

/// One cumulative histogram bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    #[serde(with = "float")]
    pub upper_bound: f64,
    #[serde(with = "float")]
    pub cumulative_count: f64,
}

/// The numeric payload of a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SampleValue {
    Counter {
        #[serde(with = "float")]
        value: f64,
    },
    Gauge {
        #[serde(with = "float")]
        value: f64,
    },
    Untyped {
        #[serde(with = "float")]
        value: f64,
    },
    Summary {
        quantiles: Vec<Quantile>,
        #[serde(with = "float")]
        sum: f64,
        #[serde(with = "float")]
        count: f64,
    },
    Histogram {
        buckets: Vec<Bucket>,
        #[serde(with = "float")]
        sum: f64,
        #[serde(with = "float")]
        count: f64,
    },
}

impl SampleValue {
    /// Single-valued sample of the given simple kind.
    ///
    /// Histogram and summary kinds fall back to untyped; they carry more
    /// than one value and are built explicitly.
    pub fn scalar(metric_type: MetricType, value: f64) -> Self {
        match metric_type {
            MetricType::Counter => SampleValue::Counter { value },
            MetricType::Gauge => SampleValue::Gauge { value },
            MetricType::Untyped | MetricType::Histogram | MetricType::Summary => {
                SampleValue::Untyped { value }
            }
        }
    }

    pub fn metric_type(&self) -> MetricType {
        match self {
            SampleValue::Counter { .. } => MetricType::Counter,
            SampleValue::Gauge { .. } => MetricType::Gauge,
            SampleValue::Untyped { .. } => MetricType::Untyped,
            SampleValue::Summary { .. } => MetricType::Summary,
            SampleValue::Histogram { .. } => MetricType::Histogram,
        }
    }
}

/// A labeled sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub labels: Labels,
    pub value: SampleValue,
    /// Optional explicit timestamp (milliseconds since the epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<i64>,
}

impl Sample {
    pub fn new(labels: Labels, value: SampleValue) -> Self {
        Self {
            labels,
            value,
            timestamp_ms: None,
        }
    }
}

/// A named, typed collection of samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFamily {
    pub name: String,
    #[serde(default)]
    pub help: String,
    pub metric_type: MetricType,
    pub samples: Vec<Sample>,
}

impl MetricFamily {
    pub fn new(name: impl Into<String>, help: impl Into<String>, metric_type: MetricType) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            metric_type,
            samples: Vec::new(),
        }
    }

    /// Builder-style sample append.
    pub fn with_sample(mut self, sample: Sample) -> Self {
        self.samples.push(sample);
        self
    }

    /// Check internal consistency: a valid name, every sample of the
    /// declared kind, valid non-reserved label names, and no two samples
    /// sharing one label set.
    pub fn validate(&self) -> ValidationResult<()> {
        if !is_valid_metric_name(&self.name) {
            return Err(ValidationError::InvalidMetricName(self.name.clone()));
        }

        let mut seen: HashSet<&Labels> = HashSet::with_capacity(self.samples.len());
        for sample in &self.samples {
            let found = sample.value.metric_type();
            if found != self.metric_type {
                return Err(ValidationError::TypeMismatch {
                    family: self.name.clone(),
                    declared: self.metric_type,
                    found,
                });
            }
            for label in sample.labels.keys() {
                self.check_label(label)?;
            }
            if !seen.insert(&sample.labels) {
                return Err(ValidationError::DuplicateLabelSet {
                    family: self.name.clone(),
                    labels: format_labels(&sample.labels),
                });
            }
        }
        Ok(())
    }

    fn check_label(&self, label: &str) -> ValidationResult<()> {
        if !is_valid_label_name(label) {
            return Err(ValidationError::InvalidLabelName {
                family: self.name.clone(),
                label: label.to_string(),
            });
        }
        let shadows_series_label = match self.metric_type {
            MetricType::Histogram => label == BUCKET_LABEL,
            MetricType::Summary => label == QUANTILE_LABEL,
            MetricType::Counter | MetricType::Gauge | MetricType::Untyped => false,
        };
        if is_reserved_label_name(label) || shadows_series_label {
            return Err(ValidationError::ReservedLabel {
                family: self.name.clone(),
                label: label.to_string(),
            });
        }
        Ok(())
    }
}

fn format_labels(labels: &Labels) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v:?}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Serde adapter for `f64` that survives JSON: non-finite values are
/// written as the strings `NaN`, `+Inf` and `-Inf`.
pub mod float {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::text::{format_float, parse_float};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_str(&format_float(*value))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Ok(v),
            Repr::Text(s) => {
                parse_float(&s).ok_or_else(|| D::Error::custom(format!("invalid float {s:?}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn gauge(value: f64, pairs: &[(&str, &str)]) -> Sample {
        Sample::new(labels(pairs), SampleValue::Gauge { value })
    }

    #[test]
    fn type_names_round_trip() {
        for t in [
            MetricType::Counter,
            MetricType::Gauge,
            MetricType::Histogram,
            MetricType::Summary,
            MetricType::Untyped,
        ] {
            assert_eq!(MetricType::from_name(t.as_str()), Some(t));
        }
        assert_eq!(MetricType::from_name("info"), None);
    }

    #[test]
    fn validate_accepts_consistent_family() {
        let family = MetricFamily::new("temp_celsius", "Temperature.", MetricType::Gauge)
            .with_sample(gauge(21.5, &[("room", "a")]))
            .with_sample(gauge(19.0, &[("room", "b")]));
        assert!(family.validate().is_ok());
    }

    #[test]
    fn validate_rejects_type_mismatch() {
        let family = MetricFamily::new("jobs_total", "", MetricType::Counter)
            .with_sample(gauge(1.0, &[]));
        assert_eq!(
            family.validate(),
            Err(ValidationError::TypeMismatch {
                family: "jobs_total".to_string(),
                declared: MetricType::Counter,
                found: MetricType::Gauge,
            })
        );
    }

    #[test]
    fn validate_rejects_duplicate_label_sets() {
        let family = MetricFamily::new("temp_celsius", "", MetricType::Gauge)
            .with_sample(gauge(1.0, &[("room", "a")]))
            .with_sample(gauge(2.0, &[("room", "a")]));
        assert!(matches!(
            family.validate(),
            Err(ValidationError::DuplicateLabelSet { .. })
        ));
    }

    #[test]
    fn validate_rejects_reserved_labels() {
        let family = MetricFamily::new("x", "", MetricType::Gauge)
            .with_sample(gauge(1.0, &[("__name__", "y")]));
        assert!(matches!(
            family.validate(),
            Err(ValidationError::ReservedLabel { .. })
        ));

        let histogram = MetricFamily::new("h", "", MetricType::Histogram).with_sample(
            Sample::new(
                labels(&[("le", "1")]),
                SampleValue::Histogram {
                    buckets: vec![],
                    sum: 0.0,
                    count: 0.0,
                },
            ),
        );
        assert!(matches!(
            histogram.validate(),
            Err(ValidationError::ReservedLabel { .. })
        ));
    }

    #[test]
    fn validate_rejects_bad_metric_name() {
        let family = MetricFamily::new("1bad", "", MetricType::Gauge);
        assert_eq!(
            family.validate(),
            Err(ValidationError::InvalidMetricName("1bad".to_string()))
        );
    }

    #[test]
    fn non_finite_values_survive_json() {
        let sample = Sample::new(
            Labels::new(),
            SampleValue::Histogram {
                buckets: vec![
                    Bucket {
                        upper_bound: 0.5,
                        cumulative_count: 3.0,
                    },
                    Bucket {
                        upper_bound: f64::INFINITY,
                        cumulative_count: 4.0,
                    },
                ],
                sum: 1.25,
                count: 4.0,
            },
        );
        let json = serde_json::to_string(&sample).unwrap();
        assert!(json.contains("\"+Inf\""));
        let back: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample);

        let nan = SampleValue::Gauge { value: f64::NAN };
        let json = serde_json::to_string(&nan).unwrap();
        match serde_json::from_str::<SampleValue>(&json).unwrap() {
            SampleValue::Gauge { value } => assert!(value.is_nan()),
            other => panic!("unexpected {other:?}"),
        }
    }
}
