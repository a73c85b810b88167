//! Text renderings of query outcomes.

use super::value::{Labels, QueryOutcome, ResultValue};

/// Output mode selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One `timestamp<delim>value` row per sample.
    Delimited(char),
    /// Human-readable rendering with label sets.
    Text,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Delimited(';')
    }
}

impl OutputFormat {
    pub fn render(&self, outcome: &QueryOutcome) -> String {
        match self {
            OutputFormat::Delimited(delim) => to_delimited(outcome, *delim),
            OutputFormat::Text => to_text(outcome),
        }
    }
}

/// Render a float in shortest round-trip form, with `NaN`, `+Inf` and `-Inf`
/// for the special values.
pub fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}

/// Delimited form. Field 0 is the timestamp and field 1 the value; labels are
/// dropped. Empty outcomes render as the empty string.
pub fn to_delimited(outcome: &QueryOutcome, delim: char) -> String {
    let mut out = String::new();
    let mut row = |ts: f64, v: f64| {
        out.push_str(&format!("{}{}{}\n", format_value(ts), delim, format_value(v)));
    };

    match outcome {
        QueryOutcome::Empty => {}
        QueryOutcome::Value(ResultValue::Scalar { timestamp, value }) => row(*timestamp, *value),
        QueryOutcome::Value(ResultValue::Vector(samples)) => {
            for s in samples {
                row(s.timestamp, s.value);
            }
        }
        QueryOutcome::Value(ResultValue::Matrix(series)) => {
            for p in series.iter().flat_map(|s| s.points.iter()) {
                row(p.timestamp, p.value);
            }
        }
    }

    out
}

/// Text form. Vector samples and matrix series are prefixed by their label
/// set in `{key="value", ...}` notation.
pub fn to_text(outcome: &QueryOutcome) -> String {
    let mut out = String::new();

    match outcome {
        QueryOutcome::Empty => {}
        QueryOutcome::Value(ResultValue::Scalar { timestamp, value }) => {
            out.push_str(&format!("{} @[{}]\n", format_value(*value), format_value(*timestamp)));
        }
        QueryOutcome::Value(ResultValue::Vector(samples)) => {
            for s in samples {
                out.push_str(&format!(
                    "{} => {} @[{}]\n",
                    format_labels(&s.labels),
                    format_value(s.value),
                    format_value(s.timestamp)
                ));
            }
        }
        QueryOutcome::Value(ResultValue::Matrix(series)) => {
            for s in series {
                out.push_str(&format!("{} =>\n", format_labels(&s.labels)));
                for p in &s.points {
                    out.push_str(&format!("{} @[{}]\n", format_value(p.value), format_value(p.timestamp)));
                }
            }
        }
    }

    out
}

/// Render a label set as `{a="1", b="2"}`, keys in sorted order.
pub fn format_labels(labels: &Labels) -> String {
    let pairs: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();
    format!("{{{}}}", pairs.join(", "))
}

fn escape_label_value(v: &str) -> String {
    let mut out = String::with_capacity(v.len());
    for c in v.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}
