use serde_json::Value;

/// Flags threaded through `setValue` calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetValueFlags {
    /// Suppress the change emission for this mutation.
    pub no_change_event: bool,
}

/// Look up a dotted path (`"data.address.city"`) in a JSON value.
/// Returns `None` if any segment is missing or a non-object is traversed.
pub fn value_at_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = data;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// JSON-logic truthiness: `false`, `0`, `""`, `null` and `[]` are falsy;
/// everything else (including `{}`) is truthy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Loose equality in the spirit of JSON-logic's `==`: strings and numbers
/// compare across types, everything else compares structurally.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.parse::<f64>().ok() == n.as_f64()
        }
        (Value::Bool(x), other) | (other, Value::Bool(x)) => *x == truthy(other),
        _ => false,
    }
}

/// Whether a value counts as "empty" for reset-to-default purposes.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_lookup() {
        let data = json!({"data": {"address": {"city": "Oslo"}, "age": 7}});
        assert_eq!(value_at_path(&data, "data.address.city"), Some(&json!("Oslo")));
        assert_eq!(value_at_path(&data, "data.age"), Some(&json!(7)));
        assert_eq!(value_at_path(&data, "data.missing"), None);
        assert_eq!(value_at_path(&data, "data.age.nested"), None);
    }

    #[test]
    fn truthiness() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!([])));
        assert!(truthy(&json!({})));
        assert!(truthy(&json!("x")));
        assert!(truthy(&json!(0.5)));
        assert!(truthy(&json!([0])));
    }

    #[test]
    fn loose_equality() {
        assert!(loose_eq(&json!(1), &json!("1")));
        assert!(loose_eq(&json!("2.5"), &json!(2.5)));
        assert!(loose_eq(&json!(true), &json!("yes")));
        assert!(loose_eq(&json!(false), &json!("")));
        assert!(!loose_eq(&json!(1), &json!("2")));
        assert!(loose_eq(&json!({"a": 1}), &json!({"a": 1})));
    }

    #[test]
    fn empty_values() {
        assert!(is_empty_value(&json!(null)));
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!([])));
        assert!(is_empty_value(&json!({})));
        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!(false)));
    }
}
