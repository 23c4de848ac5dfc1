//! pushgrid-core — shared model for the Pushgrid push gateway.
//!
//! Holds everything that does not depend on a runtime: the grouping key
//! codec, metric family types, push-time validation, the text exposition
//! parser for pushed payloads, and the TOML configuration model.

pub mod config;
pub mod error;
pub mod group;
pub mod key;
pub mod labels;
pub mod text;
pub mod types;

pub use config::PushgridConfig;
pub use error::{
    ConfigError, KeyError, KeyResult, ParseError, ParseResult, ValidationError, ValidationResult,
};
pub use group::MetricGroup;
pub use key::GroupingKey;
pub use text::parse_text;
pub use types::*;
