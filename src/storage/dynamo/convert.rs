//! JSON <-> DynamoDB attribute value conversion.

use std::collections::HashMap;

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use serde_json::{Number, Value};

use crate::storage::Record;

/// Convert a record into a DynamoDB item.
pub fn to_attribute_map(record: &Record) -> HashMap<String, AttributeValue> {
    record
        .iter()
        .map(|(name, value)| (name.clone(), to_attribute_value(value)))
        .collect()
}

/// Convert a DynamoDB item into a record.
pub fn from_attribute_map(item: &HashMap<String, AttributeValue>) -> Record {
    item.iter()
        .map(|(name, value)| (name.clone(), from_attribute_value(value)))
        .collect()
}

fn to_attribute_value(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute_value).collect()),
        Value::Object(map) => AttributeValue::M(to_attribute_map(map)),
    }
}

fn from_attribute_value(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => parse_number(n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(items) => Value::Array(items.iter().map(from_attribute_value).collect()),
        AttributeValue::M(map) => Value::Object(from_attribute_map(map)),
        AttributeValue::Ss(items) => {
            Value::Array(items.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Ns(items) => Value::Array(items.iter().map(|n| parse_number(n)).collect()),
        AttributeValue::B(blob) => blob_to_value(blob),
        AttributeValue::Bs(blobs) => Value::Array(blobs.iter().map(blob_to_value).collect()),
        _ => Value::Null,
    }
}

/// DynamoDB numbers arrive as strings; keep integers integral.
fn parse_number(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(u) = raw.parse::<u64>() {
        return Value::Number(u.into());
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

fn blob_to_value(blob: &Blob) -> Value {
    Value::Array(
        blob.as_ref()
            .iter()
            .map(|byte| Value::Number((*byte).into()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_conversion() {
        assert_eq!(to_attribute_value(&json!("x")), AttributeValue::S("x".to_string()));
        assert_eq!(to_attribute_value(&json!(42)), AttributeValue::N("42".to_string()));
        assert_eq!(to_attribute_value(&json!(true)), AttributeValue::Bool(true));
        assert_eq!(to_attribute_value(&Value::Null), AttributeValue::Null(true));
    }

    #[test]
    fn test_nested_record_survives_conversion() {
        let record = match json!({
            "id": "b-1",
            "seats": [1, 2, 3],
            "price": 12.5,
            "meta": {"vip": false, "note": null}
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        let item = to_attribute_map(&record);
        assert_eq!(from_attribute_map(&item), record);
    }

    #[test]
    fn test_number_parsing_prefers_integers() {
        assert_eq!(parse_number("7"), json!(7));
        assert_eq!(parse_number("-3"), json!(-3));
        assert_eq!(parse_number("1.25"), json!(1.25));
        assert_eq!(parse_number("18446744073709551615"), json!(u64::MAX));
    }

    #[test]
    fn test_string_sets_become_arrays() {
        let value = AttributeValue::Ss(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(from_attribute_value(&value), json!(["a", "b"]));
    }
}
