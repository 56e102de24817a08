//! Record payload helpers
//!
//! Payloads arrive as flat JSON objects (usually decoded form input), so
//! values follow form semantics: `"5"` and `5` are the same key, `"0"` is
//! empty, and so on.

use serde_json::{Map, Value};

/// A flat field name → value mapping for one row
pub type Record = Map<String, Value>;

/// Check whether a value counts as "not filled in"
///
/// `null`, `""`, `"0"`, `0`, `false`, `[]` and `{}` are empty.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map(|f| f == 0.0).unwrap_or(false),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}

/// Check whether a record field is missing or empty
pub fn field_is_empty(record: &Record, field: &str) -> bool {
    record.get(field).map(is_empty_value).unwrap_or(true)
}

/// Canonical text of a primary key value, used as a map key
///
/// Returns None for empty keys and for values that cannot be keys.
pub fn key_text(value: &Value) -> Option<String> {
    if is_empty_value(value) {
        return None;
    }
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Scalar text used for loose comparisons
fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Compare two values the way submitted form data compares to stored data
///
/// Numbers are compared numerically when both sides parse as numbers, so
/// `"1"`, `1` and `1.0` are equal.
pub fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    let (left, right) = (scalar_text(a), scalar_text(b));
    if let (Ok(l), Ok(r)) = (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
        return l == r;
    }
    left == right
}

/// Short description of a value's kind, for error messages
pub fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_values() {
        for value in [json!(null), json!(""), json!("0"), json!(0), json!(false), json!([]), json!({})] {
            assert!(is_empty_value(&value), "{value} should be empty");
        }
        for value in [json!("x"), json!(1), json!(true), json!([1]), json!(" ")] {
            assert!(!is_empty_value(&value), "{value} should not be empty");
        }
    }

    #[test]
    fn test_key_text() {
        assert_eq!(key_text(&json!(5)), Some("5".to_string()));
        assert_eq!(key_text(&json!("5")), Some("5".to_string()));
        assert_eq!(key_text(&json!("")), None);
        assert_eq!(key_text(&json!(null)), None);
        assert_eq!(key_text(&json!(true)), None);
    }

    #[test]
    fn test_loose_equality() {
        assert!(loosely_equal(&json!("1"), &json!(1)));
        assert!(loosely_equal(&json!(1.0), &json!(1)));
        assert!(loosely_equal(&json!(null), &json!("")));
        assert!(!loosely_equal(&json!("x"), &json!("y")));
        assert!(!loosely_equal(&json!("1"), &json!(2)));
    }
}
