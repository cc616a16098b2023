//! Encoding of field sets into InfluxDB line protocol.
//!
//! A point is written as
//! `measurement[,tag=value...] field=value[,field=value...]` with no
//! timestamp; the database stamps points on arrival.

use crate::core::{FieldSet, FieldValue};

/// Encodes a single point.
///
/// The caller is responsible for never passing an empty field set; such a
/// cycle must be dropped before encoding.
pub fn encode(measurement: &str, tags: &[(&str, &str)], fields: &FieldSet) -> String {
    let mut line = escape_measurement(measurement);
    for (key, value) in tags {
        line.push(',');
        line.push_str(&escape_tag(key));
        line.push('=');
        line.push_str(&escape_tag(value));
    }
    line.push(' ');

    let encoded: Vec<String> = fields
        .iter()
        .map(|(name, value)| {
            let key = escape_tag(&sanitize_field_name(name));
            format!("{}={}", key, format_value(value))
        })
        .collect();
    line.push_str(&encoded.join(","));
    line
}

/// Replaces characters that are reserved inside unquoted tokens.
pub fn sanitize_field_name(name: &str) -> String {
    name.replace('-', "_")
}

/// Formats a field value according to its type.
pub fn format_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Float(v) => format_float(*v),
        FieldValue::Integer(v) => v.to_string(),
        FieldValue::Text(s) if is_numeric(s) => s.clone(),
        FieldValue::Text(s) => format!("\"{}\"", escape_string(s)),
    }
}

fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

/// A string is stored as a number when it parses as a finite decimal.
fn is_numeric(s: &str) -> bool {
    s.trim() == s && s.parse::<f64>().map(f64::is_finite).unwrap_or(false)
}

/// Backslashes are escaped first.
fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_tag(s: &str) -> String {
    s.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}
