//! Structural JSON comparison.
//!
//! Used by the optimistic write layer to decide whether an expected value
//! still matches the stored one. Comparison is purely structural: object key
//! order is irrelevant, and whitespace never matters because both sides are
//! already parsed.

use serde_json::Value;

/// Compare two JSON values structurally.
///
/// Arrays compare element-wise in order; objects compare by size and then by
/// key lookup, so `{"a":1,"b":2}` equals `{"b":2,"a":1}`. Numbers compare by
/// [`serde_json::Number`] equality.
#[must_use]
pub fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(va, vb)| json_equal(va, vb))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, va)| y.get(k).is_some_and(|vb| json_equal(va, vb)))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_primitives() {
        assert!(json_equal(&json!(null), &json!(null)));
        assert!(json_equal(&json!(true), &json!(true)));
        assert!(json_equal(&json!("x"), &json!("x")));
        assert!(!json_equal(&json!(true), &json!(false)));
        assert!(!json_equal(&json!(1), &json!("1")));
        assert!(!json_equal(&json!(null), &json!(0)));
    }

    #[test]
    fn test_object_key_order_ignored() {
        let a: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b": 2, "a":1}"#).unwrap();
        assert!(json_equal(&a, &b));
    }

    #[test]
    fn test_object_value_mismatch() {
        assert!(!json_equal(&json!({"a":1,"b":2}), &json!({"a":1,"b":3})));
    }

    #[test]
    fn test_object_size_mismatch() {
        assert!(!json_equal(&json!({"a":1}), &json!({"a":1,"b":2})));
        assert!(!json_equal(&json!({"a":1,"b":2}), &json!({"a":1})));
    }

    #[test]
    fn test_array_order_matters() {
        assert!(json_equal(&json!([1, 2, 3]), &json!([1, 2, 3])));
        assert!(!json_equal(&json!([1, 2, 3]), &json!([3, 2, 1])));
        assert!(!json_equal(&json!([1, 2]), &json!([1, 2, 3])));
    }

    #[test]
    fn test_nested_structures() {
        let a = json!({"pay": {"amount": 21, "routes": [{"hop": 1}, {"hop": 2}]}});
        let b = json!({"pay": {"routes": [{"hop": 1}, {"hop": 2}], "amount": 21}});
        assert!(json_equal(&a, &b));
    }
}
