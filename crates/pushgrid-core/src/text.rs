//! Text exposition format (0.0.4) parser for pushed payloads.
//!
//! Produces one [`MetricFamily`] per metric block. Histogram and summary
//! series (`_bucket`, `_sum`, `_count`, quantile lines) are folded into a
//! single sample per distinct label set.

use std::collections::{HashMap, HashSet};

use crate::error::{ParseError, ParseResult};
use crate::labels::{
    is_reserved_label_name, is_valid_label_name, is_valid_metric_name, BUCKET_LABEL,
    QUANTILE_LABEL,
};
use crate::types::{Bucket, Labels, MetricFamily, MetricType, Quantile, Sample, SampleValue};

/// Parse a complete text payload.
pub fn parse_text(input: &str) -> ParseResult<Vec<MetricFamily>> {
    let mut parser = TextParser::default();
    for (idx, raw) in input.lines().enumerate() {
        parser.line(idx + 1, raw)?;
    }
    parser.finish()
}

/// Parse a sample value. The only non-numeric spellings are `NaN`,
/// `+Inf` and `-Inf`.
pub fn parse_float(s: &str) -> Option<f64> {
    match s {
        "NaN" => Some(f64::NAN),
        "+Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        // `str::parse` would also take `inf`, `infinity` and `nan` in any case.
        _ if !s
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E')) =>
        {
            None
        }
        _ => s.parse().ok(),
    }
}

/// Format a value the way the exposition format expects.
pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else if v != 0.0 && (v.abs() >= 1e21 || v.abs() < 1e-6) {
        format!("{v:e}")
    } else {
        v.to_string()
    }
}

/// Which series of a family a sample line feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Plain,
    Bucket,
    Quantile,
    Sum,
    Count,
}

/// A histogram or summary series being assembled.
struct Composite {
    labels: Labels,
    points: Vec<(f64, f64)>,
    sum: Option<f64>,
    count: Option<f64>,
    timestamp_ms: Option<i64>,
}

struct FamilyBuilder {
    name: String,
    start_line: usize,
    help: Option<String>,
    metric_type: Option<MetricType>,
    samples: Vec<Sample>,
    composites: Vec<Composite>,
    composite_index: HashMap<Labels, usize>,
}

impl FamilyBuilder {
    fn new(name: &str, start_line: usize) -> Self {
        Self {
            name: name.to_string(),
            start_line,
            help: None,
            metric_type: None,
            samples: Vec::new(),
            composites: Vec::new(),
            composite_index: HashMap::new(),
        }
    }

    fn kind(&self) -> MetricType {
        self.metric_type.unwrap_or(MetricType::Untyped)
    }

    fn has_samples(&self) -> bool {
        !self.samples.is_empty() || !self.composites.is_empty()
    }

    /// Map a sample line's metric name onto this family, if it belongs here.
    fn role_of(&self, metric: &str) -> Option<Role> {
        let suffix = metric.strip_prefix(self.name.as_str())?;
        match (self.kind(), suffix) {
            (_, "") => Some(if self.kind() == MetricType::Summary {
                Role::Quantile
            } else {
                Role::Plain
            }),
            (MetricType::Histogram, "_bucket") => Some(Role::Bucket),
            (MetricType::Histogram | MetricType::Summary, "_sum") => Some(Role::Sum),
            (MetricType::Histogram | MetricType::Summary, "_count") => Some(Role::Count),
            _ => None,
        }
    }

    fn composite(&mut self, labels: Labels) -> &mut Composite {
        let idx = match self.composite_index.get(&labels) {
            Some(&idx) => idx,
            None => {
                let idx = self.composites.len();
                self.composite_index.insert(labels.clone(), idx);
                self.composites.push(Composite {
                    labels,
                    points: Vec::new(),
                    sum: None,
                    count: None,
                    timestamp_ms: None,
                });
                idx
            }
        };
        &mut self.composites[idx]
    }

    fn add(
        &mut self,
        line: usize,
        role: Role,
        mut labels: Labels,
        value: f64,
        timestamp_ms: Option<i64>,
    ) -> ParseResult<()> {
        let kind = self.kind();
        match (kind, role) {
            (MetricType::Counter | MetricType::Gauge | MetricType::Untyped, Role::Plain) => {
                self.samples.push(Sample {
                    labels,
                    value: SampleValue::scalar(kind, value),
                    timestamp_ms,
                });
            }
            (MetricType::Histogram, Role::Bucket) => {
                let bound = take_bound(line, &mut labels, BUCKET_LABEL)?;
                let series = self.composite(labels);
                series.points.push((bound, value));
                series.timestamp_ms = timestamp_ms.or(series.timestamp_ms);
            }
            (MetricType::Summary, Role::Quantile) => {
                let quantile = take_bound(line, &mut labels, QUANTILE_LABEL)?;
                let series = self.composite(labels);
                series.points.push((quantile, value));
                series.timestamp_ms = timestamp_ms.or(series.timestamp_ms);
            }
            (MetricType::Histogram | MetricType::Summary, Role::Sum | Role::Count) => {
                let suffix = if role == Role::Sum { "_sum" } else { "_count" };
                let series = self.composite(labels);
                let slot = if role == Role::Sum {
                    &mut series.sum
                } else {
                    &mut series.count
                };
                let duplicate = slot.replace(value).is_some();
                series.timestamp_ms = timestamp_ms.or(series.timestamp_ms);
                if duplicate {
                    return Err(ParseError::new(
                        line,
                        format!("duplicate {}{suffix} line", self.name),
                    ));
                }
            }
            _ => {
                return Err(ParseError::new(
                    line,
                    format!("unexpected sample for {kind} family {}", self.name),
                ));
            }
        }
        Ok(())
    }

    fn build(self) -> ParseResult<MetricFamily> {
        let metric_type = self.kind();
        let start = self.start_line;
        let samples = match metric_type {
            MetricType::Histogram => self
                .composites
                .into_iter()
                .map(|c| {
                    let points = sorted_unique(start, &self.name, c.points, BUCKET_LABEL)?;
                    Ok(Sample {
                        labels: c.labels,
                        value: SampleValue::Histogram {
                            buckets: points
                                .into_iter()
                                .map(|(upper_bound, cumulative_count)| Bucket {
                                    upper_bound,
                                    cumulative_count,
                                })
                                .collect(),
                            sum: c.sum.unwrap_or(0.0),
                            count: c.count.unwrap_or(0.0),
                        },
                        timestamp_ms: c.timestamp_ms,
                    })
                })
                .collect::<ParseResult<Vec<_>>>()?,
            MetricType::Summary => self
                .composites
                .into_iter()
                .map(|c| {
                    let points = sorted_unique(start, &self.name, c.points, QUANTILE_LABEL)?;
                    Ok(Sample {
                        labels: c.labels,
                        value: SampleValue::Summary {
                            quantiles: points
                                .into_iter()
                                .map(|(quantile, value)| Quantile { quantile, value })
                                .collect(),
                            sum: c.sum.unwrap_or(0.0),
                            count: c.count.unwrap_or(0.0),
                        },
                        timestamp_ms: c.timestamp_ms,
                    })
                })
                .collect::<ParseResult<Vec<_>>>()?,
            MetricType::Counter | MetricType::Gauge | MetricType::Untyped => self.samples,
        };

        let family = MetricFamily {
            name: self.name,
            help: self.help.unwrap_or_default(),
            metric_type,
            samples,
        };
        family
            .validate()
            .map_err(|e| ParseError::new(start, e.to_string()))?;
        Ok(family)
    }
}

fn take_bound(line: usize, labels: &mut Labels, label: &str) -> ParseResult<f64> {
    let raw = labels
        .remove(label)
        .ok_or_else(|| ParseError::new(line, format!("missing {label:?} label")))?;
    parse_float(&raw).ok_or_else(|| ParseError::new(line, format!("invalid {label} value {raw:?}")))
}

fn sorted_unique(
    line: usize,
    family: &str,
    mut points: Vec<(f64, f64)>,
    label: &str,
) -> ParseResult<Vec<(f64, f64)>> {
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    if points.windows(2).any(|w| w[0].0 == w[1].0) {
        return Err(ParseError::new(
            line,
            format!("duplicate {label} value in family {family}"),
        ));
    }
    Ok(points)
}

#[derive(Default)]
struct TextParser {
    families: Vec<MetricFamily>,
    seen: HashSet<String>,
    current: Option<FamilyBuilder>,
}

impl TextParser {
    fn line(&mut self, line: usize, raw: &str) -> ParseResult<()> {
        let text = raw.trim();
        if text.is_empty() {
            return Ok(());
        }
        match text.strip_prefix('#') {
            Some(comment) => self.comment(line, comment.trim_start()),
            None => self.sample(line, text),
        }
    }

    fn comment(&mut self, line: usize, comment: &str) -> ParseResult<()> {
        let Some((keyword, rest)) = comment.split_once(char::is_whitespace) else {
            return Ok(());
        };
        let rest = rest.trim_start();
        let (name, tail) = rest
            .split_once(char::is_whitespace)
            .map(|(n, t)| (n, t.trim_start()))
            .unwrap_or((rest, ""));

        match keyword {
            "HELP" => {
                check_metric_name(line, name)?;
                let help = unescape_help(line, tail)?;
                let family = self.family(line, name)?;
                if family.help.replace(help).is_some() {
                    return Err(ParseError::new(line, format!("second HELP line for {name}")));
                }
            }
            "TYPE" => {
                check_metric_name(line, name)?;
                let metric_type = MetricType::from_name(tail)
                    .ok_or_else(|| ParseError::new(line, format!("unknown metric type {tail:?}")))?;
                let family = self.family(line, name)?;
                if family.has_samples() {
                    return Err(ParseError::new(
                        line,
                        format!("TYPE line for {name} after its samples"),
                    ));
                }
                if family.metric_type.replace(metric_type).is_some() {
                    return Err(ParseError::new(line, format!("second TYPE line for {name}")));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn sample(&mut self, line: usize, text: &str) -> ParseResult<()> {
        let name_end = text
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == ':'))
            .unwrap_or(text.len());
        let metric = &text[..name_end];
        check_metric_name(line, metric)?;

        let mut rest = text[name_end..].trim_start();
        let mut labels = Labels::new();
        if let Some(inner) = rest.strip_prefix('{') {
            rest = parse_labels(line, inner, &mut labels)?;
        }

        let mut fields = rest.split_whitespace();
        let raw_value = fields
            .next()
            .ok_or_else(|| ParseError::new(line, "missing sample value"))?;
        let value = parse_float(raw_value)
            .ok_or_else(|| ParseError::new(line, format!("invalid sample value {raw_value:?}")))?;
        let timestamp_ms = match fields.next() {
            Some(ts) => Some(
                ts.parse::<i64>()
                    .map_err(|_| ParseError::new(line, format!("invalid timestamp {ts:?}")))?,
            ),
            None => None,
        };
        if fields.next().is_some() {
            return Err(ParseError::new(line, "unexpected text after timestamp"));
        }

        let current_role = self.current.as_ref().and_then(|f| f.role_of(metric));
        let (family_name, role) = match (&self.current, current_role) {
            (Some(family), Some(role)) => (family.name.clone(), role),
            _ => (metric.to_string(), Role::Plain),
        };
        let family = self.family(line, &family_name)?;
        let role = if role == Role::Plain {
            family.role_of(metric).unwrap_or(Role::Plain)
        } else {
            role
        };
        family.add(line, role, labels, value, timestamp_ms)
    }

    /// The builder for `name`, finishing the current block if `name` starts a new one.
    fn family(&mut self, line: usize, name: &str) -> ParseResult<&mut FamilyBuilder> {
        let switching = self.current.as_ref().is_none_or(|f| f.name != name);
        if switching {
            if self.seen.contains(name) {
                return Err(ParseError::new(
                    line,
                    format!("metric family {name} appears in more than one block"),
                ));
            }
            self.finish_current()?;
            self.seen.insert(name.to_string());
        }
        Ok(self
            .current
            .get_or_insert_with(|| FamilyBuilder::new(name, line)))
    }

    fn finish_current(&mut self) -> ParseResult<()> {
        if let Some(builder) = self.current.take() {
            self.families.push(builder.build()?);
        }
        Ok(())
    }

    fn finish(mut self) -> ParseResult<Vec<MetricFamily>> {
        self.finish_current()?;
        Ok(self.families)
    }
}

fn check_metric_name(line: usize, name: &str) -> ParseResult<()> {
    if is_valid_metric_name(name) {
        Ok(())
    } else {
        Err(ParseError::new(line, format!("invalid metric name {name:?}")))
    }
}

/// Parse `name="value",...}` and return what follows the closing brace.
fn parse_labels<'a>(line: usize, input: &'a str, labels: &mut Labels) -> ParseResult<&'a str> {
    let mut rest = input;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix('}') {
            return Ok(after);
        }

        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let name = &rest[..end];
        if !is_valid_label_name(name) {
            return Err(ParseError::new(line, format!("invalid label name {name:?}")));
        }
        if is_reserved_label_name(name) {
            return Err(ParseError::new(line, format!("reserved label name {name:?}")));
        }

        rest = rest[end..].trim_start();
        rest = rest
            .strip_prefix('=')
            .ok_or_else(|| ParseError::new(line, format!("expected '=' after label {name}")))?
            .trim_start();
        rest = rest
            .strip_prefix('"')
            .ok_or_else(|| ParseError::new(line, format!("expected '\"' for label {name}")))?;

        let (value, after) = parse_quoted(line, rest)?;
        if labels.insert(name.to_string(), value).is_some() {
            return Err(ParseError::new(line, format!("duplicate label {name:?}")));
        }

        rest = after.trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after;
        } else if !rest.starts_with('}') {
            return Err(ParseError::new(line, "expected ',' or '}' in label set"));
        }
    }
}

/// Read an escaped label value up to its closing quote.
fn parse_quoted(line: usize, input: &str) -> ParseResult<(String, &str)> {
    let mut out = String::new();
    let mut chars = input.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((out, &input[idx + 1..])),
            '\\' => match chars.next() {
                Some((_, '\\')) => out.push('\\'),
                Some((_, '"')) => out.push('"'),
                Some((_, 'n')) => out.push('\n'),
                Some((_, other)) => {
                    return Err(ParseError::new(
                        line,
                        format!("invalid escape sequence \\{other} in label value"),
                    ));
                }
                None => break,
            },
            _ => out.push(c),
        }
    }
    Err(ParseError::new(line, "unterminated label value"))
}

fn unescape_help(line: usize, input: &str) -> ParseResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some(other) => {
                return Err(ParseError::new(
                    line,
                    format!("invalid escape sequence \\{other} in HELP"),
                ));
            }
            None => return Err(ParseError::new(line, "dangling backslash in HELP")),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(input: &str) -> MetricFamily {
        let mut families = parse_text(input).unwrap();
        assert_eq!(families.len(), 1, "families: {families:?}");
        families.remove(0)
    }

    #[test]
    fn parses_typed_gauge() {
        let family = single(
            "# HELP temp_celsius Room temperature.\n\
             # TYPE temp_celsius gauge\n\
             temp_celsius{room=\"a\"} 21.5\n\
             temp_celsius{room=\"b\"} 19\n",
        );
        assert_eq!(family.name, "temp_celsius");
        assert_eq!(family.help, "Room temperature.");
        assert_eq!(family.metric_type, MetricType::Gauge);
        assert_eq!(family.samples.len(), 2);
        assert_eq!(family.samples[0].labels["room"], "a");
        assert_eq!(family.samples[1].value, SampleValue::Gauge { value: 19.0 });
    }

    #[test]
    fn untyped_without_type_line() {
        let family = single("some_metric 3 1700000000000\n");
        assert_eq!(family.metric_type, MetricType::Untyped);
        assert_eq!(family.samples[0].timestamp_ms, Some(1_700_000_000_000));
        assert!(family.samples[0].labels.is_empty());
    }

    #[test]
    fn multiple_families_keep_order() {
        let families = parse_text(
            "# TYPE b_total counter\nb_total 1\n# TYPE a gauge\na 2\n",
        )
        .unwrap();
        let names: Vec<_> = families.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["b_total", "a"]);
    }

    #[test]
    fn folds_histogram_series() {
        let family = single(
            "# TYPE rpc_seconds histogram\n\
             rpc_seconds_bucket{method=\"get\",le=\"0.1\"} 2\n\
             rpc_seconds_bucket{method=\"get\",le=\"+Inf\"} 3\n\
             rpc_seconds_sum{method=\"get\"} 0.45\n\
             rpc_seconds_count{method=\"get\"} 3\n",
        );
        assert_eq!(family.samples.len(), 1);
        let sample = &family.samples[0];
        assert_eq!(sample.labels.len(), 1);
        match &sample.value {
            SampleValue::Histogram {
                buckets,
                sum,
                count,
            } => {
                assert_eq!(buckets.len(), 2);
                assert_eq!(buckets[0].upper_bound, 0.1);
                assert_eq!(buckets[1].upper_bound, f64::INFINITY);
                assert_eq!(buckets[1].cumulative_count, 3.0);
                assert_eq!(*sum, 0.45);
                assert_eq!(*count, 3.0);
            }
            other => panic!("expected histogram, got {other:?}"),
        }
    }

    #[test]
    fn folds_summary_series() {
        let family = single(
            "# TYPE rpc_latency summary\n\
             rpc_latency{quantile=\"0.5\"} 0.2\n\
             rpc_latency{quantile=\"0.99\"} 0.9\n\
             rpc_latency_sum 12\n\
             rpc_latency_count 40\n",
        );
        match &family.samples[0].value {
            SampleValue::Summary {
                quantiles,
                sum,
                count,
            } => {
                assert_eq!(quantiles.len(), 2);
                assert_eq!(quantiles[1].quantile, 0.99);
                assert_eq!(*sum, 12.0);
                assert_eq!(*count, 40.0);
            }
            other => panic!("expected summary, got {other:?}"),
        }
    }

    #[test]
    fn unescapes_labels_and_help() {
        let family = single(
            "# HELP m A \\\\ backslash\\nand newline\n\
             m{path=\"C:\\\\tmp\",msg=\"say \\\"hi\\\"\"} 1\n",
        );
        assert_eq!(family.help, "A \\ backslash\nand newline");
        assert_eq!(family.samples[0].labels["path"], "C:\\tmp");
        assert_eq!(family.samples[0].labels["msg"], "say \"hi\"");
    }

    #[test]
    fn special_values() {
        let families = parse_text("a NaN\nb +Inf\nc -Inf\n").unwrap();
        match families[0].samples[0].value {
            SampleValue::Untyped { value } => assert!(value.is_nan()),
            ref other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            families[1].samples[0].value,
            SampleValue::Untyped {
                value: f64::INFINITY
            }
        );
    }

    #[test]
    fn rejects_family_in_two_blocks() {
        let err = parse_text("a 1\nb 2\na{x=\"y\"} 3\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("more than one block"));
    }

    #[test]
    fn rejects_type_after_samples() {
        let err = parse_text("a 1\n# TYPE a gauge\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn rejects_duplicate_type_and_help() {
        assert!(parse_text("# TYPE a gauge\n# TYPE a counter\n").is_err());
        assert!(parse_text("# HELP a x\n# HELP a y\n").is_err());
    }

    #[test]
    fn rejects_duplicate_label_set() {
        let err = parse_text("# TYPE a gauge\na{x=\"1\"} 1\na{x=\"1\"} 2\n").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_text("a{x=\"1\" 1\n").is_err());
        assert!(parse_text("a{x=1} 1\n").is_err());
        assert!(parse_text("a{x=\"1\",x=\"2\"} 1\n").is_err());
        assert!(parse_text("a{__name__=\"b\"} 1\n").is_err());
        assert!(parse_text("a notanumber\n").is_err());
        assert!(parse_text("a 1 2 3\n").is_err());
        assert!(parse_text("a\n").is_err());
        assert!(parse_text("# TYPE a bogus\n").is_err());
        assert!(parse_text("# TYPE h histogram\nh_bucket 1\n").is_err());
    }

    #[test]
    fn plain_comments_and_blank_lines_are_ignored() {
        let families = parse_text("\n# just a note\n\na 1\n").unwrap();
        assert_eq!(families.len(), 1);
    }

    #[test]
    fn trailing_comma_in_labels() {
        let family = single("a{x=\"1\",} 1\n");
        assert_eq!(family.samples[0].labels["x"], "1");
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(1.0), "1");
        assert_eq!(format_float(0.25), "0.25");
        assert_eq!(format_float(-3.5), "-3.5");
        assert_eq!(format_float(f64::NAN), "NaN");
        assert_eq!(format_float(f64::INFINITY), "+Inf");
        assert_eq!(format_float(f64::NEG_INFINITY), "-Inf");
        assert_eq!(format_float(1e300), "1e300");
        assert_eq!(parse_float(&format_float(1.2345e-9)), Some(1.2345e-9));
    }

    #[test]
    fn only_canonical_special_values_parse() {
        assert_eq!(parse_float("+Inf"), Some(f64::INFINITY));
        assert_eq!(parse_float("-Inf"), Some(f64::NEG_INFINITY));
        assert!(parse_float("NaN").is_some_and(f64::is_nan));
        assert_eq!(parse_float("-1.5e3"), Some(-1500.0));
        for bad in ["Inf", "inf", "+inf", "Infinity", "-infinity", "nan", "NAN", "0x10"] {
            assert_eq!(parse_float(bad), None, "{bad:?} should not parse");
        }
    }

    #[test]
    fn lowercase_inf_sample_is_rejected() {
        assert!(parse_text("m inf\n").is_err());
    }
}
