//! Error types for grouping keys, payload parsing, and push validation.

use thiserror::Error;

use crate::types::MetricType;

/// Result type alias for grouping key construction.
pub type KeyResult<T> = Result<T, KeyError>;

/// Result type alias for text payload parsing.
pub type ParseResult<T> = Result<T, ParseError>;

/// Result type alias for push validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Errors raised while building a grouping key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("grouping key has no labels")]
    Empty,

    #[error("invalid label name in grouping key: {0:?}")]
    InvalidLabelName(String),

    #[error("reserved label name in grouping key: {0:?}")]
    ReservedLabel(String),

    #[error("duplicate label name in grouping key: {0:?}")]
    DuplicateLabel(String),
}

/// A malformed text payload, pointing at the offending line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    /// 1-based line number.
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Structural problems in a set of pushed metric families.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid metric name: {0:?}")]
    InvalidMetricName(String),

    #[error("metric family {0:?} appears more than once")]
    DuplicateFamily(String),

    #[error("metric family {family:?} is declared {declared} but holds a {found} sample")]
    TypeMismatch {
        family: String,
        declared: MetricType,
        found: MetricType,
    },

    #[error("metric family {family:?} uses invalid label name {label:?}")]
    InvalidLabelName { family: String, label: String },

    #[error("metric family {family:?} uses reserved label name {label:?}")]
    ReservedLabel { family: String, label: String },

    #[error("metric family {family:?} has more than one sample with labels {{{labels}}}")]
    DuplicateLabelSet { family: String, labels: String },

    #[error("metric family {family:?} sets label {label:?}, which is part of the grouping key")]
    LabelCollision { family: String, label: String },
}

/// Errors raised while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid duration {0:?} (expected e.g. 500ms, 30s, 5m, 1h)")]
    InvalidDuration(String),
}
