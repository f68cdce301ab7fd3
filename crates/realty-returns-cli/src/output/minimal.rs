use serde_json::Value;

use super::{format_scalar, result_of};

/// Headline figures, most specific first.
const PRIORITY_KEYS: [&str; 6] = [
    "nominal_xirr",
    "xirr",
    "post_tax",
    "outstanding_balance",
    "emi",
    "nominal_profit",
];

/// Print just the key answer value from the output.
pub fn print_minimal(value: &Value) {
    let result = result_of(value);

    if let Value::Object(map) = result {
        for key in PRIORITY_KEYS {
            if let Some(val) = map.get(key).filter(|v| !v.is_null()) {
                println!("{}", headline(val));
                return;
            }
        }

        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_scalar(val));
            return;
        }
    }

    println!("{}", format_scalar(result));
}

/// A rate outcome prints its rate, or its status when unsolved.
fn headline(value: &Value) -> String {
    match value {
        Value::Object(obj) => {
            if let Some(inner) = obj.get("nominal_xirr") {
                return headline(inner);
            }
            if let Some(rate) = obj.get("rate") {
                return format_scalar(rate);
            }
            match (obj.get("status"), obj.get("reason")) {
                (Some(status), Some(reason)) => {
                    format!("{}: {}", format_scalar(status), format_scalar(reason))
                }
                (Some(status), None) => format_scalar(status),
                _ => format_scalar(value),
            }
        }
        other => format_scalar(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_headline_prefers_solved_rate() {
        let solved = json!({ "status": "solved", "rate": "0.1834", "iterations": 5 });
        assert_eq!(headline(&solved), "0.1834");

        let failed = json!({ "status": "not_computable", "reason": "no sign change" });
        assert_eq!(headline(&failed), "not_computable: no sign change");
    }

    #[test]
    fn test_headline_descends_into_basis_returns() {
        let basis = json!({ "nominal_xirr": { "status": "solved", "rate": "0.07" } });
        assert_eq!(headline(&basis), "0.07");
    }
}
