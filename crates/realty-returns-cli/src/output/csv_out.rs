use serde_json::Value;
use std::io;

use super::{flatten_scalars, result_of, row_grid, ROW_FIELDS};

/// Write the dated rows as CSV, or `field,value` pairs when the result
/// has no rows (EMI, loan balance, XIRR).
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());
    let result = result_of(value);

    if let Value::Object(map) = result {
        let rows = ROW_FIELDS.iter().find_map(|f| match map.get(*f) {
            Some(Value::Array(rows)) if !rows.is_empty() => Some(rows),
            _ => None,
        });
        match rows.and_then(|r| row_grid(r)) {
            Some((headers, cells)) => {
                let _ = wtr.write_record(&headers);
                for row in cells {
                    let _ = wtr.write_record(&row);
                }
            }
            None => {
                let _ = wtr.write_record(["field", "value"]);
                for (key, val) in flatten_scalars(map) {
                    let _ = wtr.write_record([key, val]);
                }
            }
        }
    } else {
        let _ = wtr.write_record([super::format_scalar(result)]);
    }

    let _ = wtr.flush();
}
