pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::{Map, Value};

/// Result fields that hold dated rows rather than scalars, in display order.
pub const ROW_FIELDS: [&str; 2] = ["cash_flows", "rows"];

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// The `result` object of a computation envelope, or the value itself.
pub fn result_of(value: &Value) -> &Value {
    value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value)
}

/// Scalar fields of a result, nested objects flattened to `outer.inner`.
/// Row arrays are left out.
pub fn flatten_scalars(map: &Map<String, Value>) -> Vec<(String, String)> {
    let mut out = Vec::new();
    flatten_into("", map, &mut out);
    out
}

fn flatten_into(prefix: &str, map: &Map<String, Value>, out: &mut Vec<(String, String)>) {
    for (key, val) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match val {
            Value::Object(inner) => flatten_into(&name, inner, out),
            Value::Array(items) if items.iter().any(Value::is_object) => {}
            _ => out.push((name, format_scalar(val))),
        }
    }
}

/// `net_flow` -> `Net Flow`
pub fn column_title(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn format_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(arr) => arr.iter().map(format_scalar).collect::<Vec<_>>().join(", "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Headers and cells of an array of row objects.
pub fn row_grid(rows: &[Value]) -> Option<(Vec<String>, Vec<Vec<String>>)> {
    let Some(Value::Object(first)) = rows.first() else {
        return None;
    };
    let keys: Vec<&String> = first.keys().collect();
    let cells = rows
        .iter()
        .filter_map(Value::as_object)
        .map(|row| {
            keys.iter()
                .map(|k| row.get(k.as_str()).map(format_scalar).unwrap_or_default())
                .collect()
        })
        .collect();
    Some((keys.iter().map(|k| column_title(k)).collect(), cells))
}
