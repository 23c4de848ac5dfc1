//! Metric and label name rules shared by the parser, the key codec, and
//! the exposition renderer.

use std::sync::LazyLock;

use regex::Regex;

static METRIC_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").expect("valid metric name regex"));

static LABEL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid label name regex"));

/// Label carrying a histogram bucket's upper bound.
pub const BUCKET_LABEL: &str = "le";

/// Label carrying a summary quantile.
pub const QUANTILE_LABEL: &str = "quantile";

pub fn is_valid_metric_name(name: &str) -> bool {
    METRIC_NAME.is_match(name)
}

pub fn is_valid_label_name(name: &str) -> bool {
    LABEL_NAME.is_match(name)
}

/// Names starting with `__` belong to the monitoring system (`__name__` among them).
pub fn is_reserved_label_name(name: &str) -> bool {
    name.starts_with("__")
}

/// Escape a label value for the text exposition format.
pub fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

/// Escape a HELP docstring. Quotes are left alone here.
pub fn escape_help(help: &str) -> String {
    let mut out = String::with_capacity(help.len());
    for c in help.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}
