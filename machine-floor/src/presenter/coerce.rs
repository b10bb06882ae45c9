//! Coercion of loosely typed backend values.
//!
//! The backend sends flags as booleans, `0`/`1` or `"true"`/`"false"`, and
//! quantities as numbers or pre-formatted strings. These rules decide how
//! each shape is read. Malformed values never raise errors; they coerce to
//! `false` or NaN and the formatters turn that into a placeholder.

use serde_json::Value;

/// Read a boolean-like flag.
///
/// | Input | Result |
/// |-------|--------|
/// | `true` / `false` | itself |
/// | number | `== 1` |
/// | numeric string (trimmed, empty is 0) | `== 1` |
/// | `"true"` (any case, trimmed) | `true` |
/// | anything else | `false` |
pub fn flag_is_true(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() == Some(1.0),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return false;
            }
            match trimmed.parse::<f64>() {
                Ok(n) if n.is_finite() => n == 1.0,
                _ => trimmed.eq_ignore_ascii_case("true"),
            }
        }
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

/// Read a number, or NaN if the value has no numeric reading.
///
/// Strings keep only digits, `.` and `-` before parsing, so `"1,234"` reads
/// as 1234 and `"12 pcs"` as 12.
pub fn coerce_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => parse_cleaned(s),
        _ => f64::NAN,
    }
}

fn parse_cleaned(s: &str) -> f64 {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    if cleaned.is_empty() || cleaned == "-" || cleaned == "." {
        return f64::NAN;
    }

    cleaned
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .unwrap_or(f64::NAN)
}

/// Loose truthiness: `null`, `false`, `0`, and `""` are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Text of a value as shown to the operator: strings verbatim, everything
/// else as its JSON text.
pub fn display_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Read a positive integer id (`47`, `"47"`, `47.0`).
pub fn coerce_machine_id(value: &Value) -> Option<u32> {
    let n = coerce_number(value);
    (n.is_finite() && n > 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64).then_some(n as u32)
}
