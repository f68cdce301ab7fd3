use serde_json::Value;
use std::io::{self, Read};

/// Scenario JSON piped on stdin, if any.
/// Returns None when stdin is an interactive terminal or empty.
pub fn read_stdin() -> Result<Option<Value>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;

    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let scenario: Value = serde_json::from_str(trimmed)
        .map_err(|e| format!("Invalid scenario on stdin: {e}"))?;
    Ok(Some(scenario))
}
