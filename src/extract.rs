//! Field extraction from JSON documents.
//!
//! Paths are RFC 9535 JSONPath expressions evaluated with `serde_json_path`.
//! Whatever the path yields is normalized to a display string; a path that
//! does not parse or does not match yields the empty string, which the
//! collector treats as "field absent this cycle".

use serde_json::{Number, Value};
use serde_json_path::JsonPath;

/// Evaluates `path` against `document` and renders the result as a string.
pub fn extract(document: &Value, path: &str) -> String {
    match JsonPath::parse(path) {
        Ok(path) => extract_with(document, &path),
        Err(_) => String::new(),
    }
}

/// Same as [`extract`], for a path that has already been compiled.
pub fn extract_with(document: &Value, path: &JsonPath) -> String {
    let nodes = path.query(document);
    match nodes.first() {
        Some(node) => render(node),
        None => String::new(),
    }
}

/// Renders a single JSON value. Sequences collapse to their first element.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => render_number(n),
        Value::Array(items) => items.first().map(render).unwrap_or_default(),
        Value::Null | Value::Bool(_) | Value::Object(_) => String::new(),
    }
}

fn render_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    // f64's Display is the shortest round-trip form and never switches to
    // exponent notation.
    n.as_f64().map(|f| f.to_string()).unwrap_or_default()
}
