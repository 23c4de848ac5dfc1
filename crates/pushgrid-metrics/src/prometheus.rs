//! Prometheus text exposition format.
//!
//! Renders merged metric families for scraping by a Prometheus server or
//! compatible agent. Output depends only on its input, so unchanged state
//! scrapes to byte-identical bodies.

use pushgrid_core::labels::{escape_help, escape_label_value, BUCKET_LABEL, QUANTILE_LABEL};
use pushgrid_core::text::format_float;
use pushgrid_core::{Labels, MetricFamily, Sample, SampleValue};

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render families into Prometheus text format.
///
/// Each family gets one HELP line, one TYPE line, and one line per
/// series. Histogram and summary samples expand into their `_bucket` /
/// quantile, `_sum` and `_count` series.
pub fn render_prometheus(families: &[MetricFamily]) -> String {
    let mut out = String::new();

    for family in families {
        if family.help.is_empty() {
            out.push_str(&format!("# HELP {}\n", family.name));
        } else {
            out.push_str(&format!(
                "# HELP {} {}\n",
                family.name,
                escape_help(&family.help)
            ));
        }
        out.push_str(&format!("# TYPE {} {}\n", family.name, family.metric_type));

        for sample in &family.samples {
            write_sample(&mut out, &family.name, sample);
        }
    }

    out
}

fn write_sample(out: &mut String, name: &str, sample: &Sample) {
    let ts = sample.timestamp_ms;
    match &sample.value {
        SampleValue::Counter { value }
        | SampleValue::Gauge { value }
        | SampleValue::Untyped { value } => {
            write_line(out, name, &sample.labels, None, *value, ts);
        }
        SampleValue::Summary {
            quantiles,
            sum,
            count,
        } => {
            for q in quantiles {
                let quantile = format_float(q.quantile);
                write_line(
                    out,
                    name,
                    &sample.labels,
                    Some((QUANTILE_LABEL, quantile.as_str())),
                    q.value,
                    ts,
                );
            }
            write_line(out, &format!("{name}_sum"), &sample.labels, None, *sum, ts);
            write_line(out, &format!("{name}_count"), &sample.labels, None, *count, ts);
        }
        SampleValue::Histogram {
            buckets,
            sum,
            count,
        } => {
            let bucket_name = format!("{name}_bucket");
            for b in buckets {
                let le = format_float(b.upper_bound);
                write_line(
                    out,
                    &bucket_name,
                    &sample.labels,
                    Some((BUCKET_LABEL, le.as_str())),
                    b.cumulative_count,
                    ts,
                );
            }
            // Scrapers require the +Inf bucket; synthesize it from the count.
            if !buckets.iter().any(|b| b.upper_bound == f64::INFINITY) {
                write_line(
                    out,
                    &bucket_name,
                    &sample.labels,
                    Some((BUCKET_LABEL, "+Inf")),
                    *count,
                    ts,
                );
            }
            write_line(out, &format!("{name}_sum"), &sample.labels, None, *sum, ts);
            write_line(out, &format!("{name}_count"), &sample.labels, None, *count, ts);
        }
    }
}

fn write_line(
    out: &mut String,
    name: &str,
    labels: &Labels,
    extra: Option<(&str, &str)>,
    value: f64,
    timestamp_ms: Option<i64>,
) {
    out.push_str(name);
    out.push('{');
    let pairs = labels
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .chain(extra);
    for (i, (k, v)) in pairs.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format!("{k}=\"{}\"", escape_label_value(v)));
    }
    out.push_str("} ");
    out.push_str(&format_float(value));
    if let Some(ts) = timestamp_ms {
        out.push_str(&format!(" {ts}"));
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use pushgrid_core::{Bucket, MetricType, Quantile};

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn render_empty() {
        assert_eq!(render_prometheus(&[]), "");
    }

    #[test]
    fn render_gauge_family() {
        let family = MetricFamily::new("temp_celsius", "Room temperature.", MetricType::Gauge)
            .with_sample(Sample::new(
                labels(&[("job", "sensors"), ("room", "a")]),
                SampleValue::Gauge { value: 21.5 },
            ));
        assert_eq!(
            render_prometheus(&[family]),
            "# HELP temp_celsius Room temperature.\n\
             # TYPE temp_celsius gauge\n\
             temp_celsius{job=\"sensors\",room=\"a\"} 21.5\n"
        );
    }

    #[test]
    fn render_empty_help_and_timestamp() {
        let mut sample = Sample::new(labels(&[("job", "x")]), SampleValue::Untyped { value: 3.0 });
        sample.timestamp_ms = Some(1_700_000_000_000);
        let family = MetricFamily::new("m", "", MetricType::Untyped).with_sample(sample);
        assert_eq!(
            render_prometheus(&[family]),
            "# HELP m\n# TYPE m untyped\nm{job=\"x\"} 3 1700000000000\n"
        );
    }

    #[test]
    fn render_histogram_adds_inf_bucket() {
        let family = MetricFamily::new("rpc_seconds", "RPC latency.", MetricType::Histogram)
            .with_sample(Sample::new(
                labels(&[("job", "api")]),
                SampleValue::Histogram {
                    buckets: vec![Bucket {
                        upper_bound: 0.5,
                        cumulative_count: 2.0,
                    }],
                    sum: 0.7,
                    count: 3.0,
                },
            ));
        let output = render_prometheus(&[family]);
        assert!(output.contains("rpc_seconds_bucket{job=\"api\",le=\"0.5\"} 2\n"));
        assert!(output.contains("rpc_seconds_bucket{job=\"api\",le=\"+Inf\"} 3\n"));
        assert!(output.contains("rpc_seconds_sum{job=\"api\"} 0.7\n"));
        assert!(output.contains("rpc_seconds_count{job=\"api\"} 3\n"));
    }

    #[test]
    fn render_summary() {
        let family = MetricFamily::new("lat", "", MetricType::Summary).with_sample(Sample::new(
            labels(&[("job", "api")]),
            SampleValue::Summary {
                quantiles: vec![Quantile {
                    quantile: 0.99,
                    value: 0.25,
                }],
                sum: 10.0,
                count: 40.0,
            },
        ));
        let output = render_prometheus(&[family]);
        assert!(output.contains("lat{job=\"api\",quantile=\"0.99\"} 0.25\n"));
        assert!(output.contains("lat_sum{job=\"api\"} 10\n"));
        assert!(output.contains("lat_count{job=\"api\"} 40\n"));
    }

    #[test]
    fn render_escapes() {
        let family = MetricFamily::new("m", "a\\b\nc", MetricType::Gauge).with_sample(
            Sample::new(labels(&[("path", "say \"hi\"")]), SampleValue::Gauge { value: 1.0 }),
        );
        let output = render_prometheus(&[family]);
        assert!(output.starts_with("# HELP m a\\\\b\\nc\n"));
        assert!(output.contains("m{path=\"say \\\"hi\\\"\"} 1\n"));
    }

    #[test]
    fn render_format_is_prometheus_compatible() {
        let family = MetricFamily::new("x", "", MetricType::Counter).with_sample(Sample::new(
            labels(&[("job", "j")]),
            SampleValue::Counter { value: 1.0 },
        ));
        let output = render_prometheus(&[family]);

        // Every non-comment line should match: metric_name{labels} value
        for line in output.lines() {
            if line.starts_with('#') {
                continue;
            }
            assert!(
                line.contains('{') && line.contains('}'),
                "line should have labels: {line}"
            );
        }
    }

    #[test]
    fn output_reparses() {
        let family = MetricFamily::new("rpc_seconds", "RPC latency.", MetricType::Histogram)
            .with_sample(Sample::new(
                labels(&[("job", "api")]),
                SampleValue::Histogram {
                    buckets: vec![
                        Bucket {
                            upper_bound: 0.5,
                            cumulative_count: 2.0,
                        },
                        Bucket {
                            upper_bound: f64::INFINITY,
                            cumulative_count: 3.0,
                        },
                    ],
                    sum: 0.7,
                    count: 3.0,
                },
            ));
        let text = render_prometheus(std::slice::from_ref(&family));
        let parsed = pushgrid_core::parse_text(&text).unwrap();
        assert_eq!(parsed, vec![family]);
    }
}
