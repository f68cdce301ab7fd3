use serde_json::Value;
use tabled::{builder::Builder, Table};

use super::{flatten_scalars, result_of, row_grid, ROW_FIELDS};

/// Summary table of scalar results, then one table per row array
/// (the cash-flow ledger, carry rows, amortization rows).
pub fn print_table(value: &Value) {
    let result = result_of(value);
    let Value::Object(map) = result else {
        println!("{}", result);
        return;
    };

    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in flatten_scalars(map) {
        builder.push_record([key, val]);
    }
    println!("{}", Table::from(builder));

    for field in ROW_FIELDS {
        if let Some(Value::Array(rows)) = map.get(field) {
            print_rows(field, rows);
        }
    }
    if let Some(Value::Object(schedule)) = map.get("amortization") {
        if let Some(Value::Array(rows)) = schedule.get("rows") {
            print_rows("amortization", rows);
        }
    }

    if let Some(Value::Array(warnings)) = value.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }

    if let Some(Value::String(meth)) = value.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_rows(title: &str, rows: &[Value]) {
    let Some((headers, cells)) = row_grid(rows) else {
        return;
    };
    let mut builder = Builder::default();
    builder.push_record(headers);
    for row in cells {
        builder.push_record(row);
    }
    println!("\n{}:", title);
    println!("{}", Table::from(builder));
}
