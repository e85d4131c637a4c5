//! Conversion between JSON documents and store attribute values.

use std::collections::BTreeMap;

use docstack_model::AttributeValue;
use serde_json::{Map, Number, Value};

use crate::error::{DocumentError, DocumentResult};

/// Convert a JSON value into its store representation.
#[must_use]
pub fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute).collect()),
        Value::Object(fields) => AttributeValue::M(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), to_attribute(v)))
                .collect(),
        ),
    }
}

/// Convert a stored attribute value back into JSON.
pub fn from_attribute(value: &AttributeValue) -> DocumentResult<Value> {
    Ok(match value {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::N(n) => Value::Number(parse_number(n)?),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::L(items) => Value::Array(
            items
                .iter()
                .map(from_attribute)
                .collect::<DocumentResult<Vec<_>>>()?,
        ),
        AttributeValue::M(fields) => Value::Object(from_attribute_map(fields)?),
    })
}

/// Convert a stored attribute map back into a JSON object.
pub fn from_attribute_map(
    fields: &BTreeMap<String, AttributeValue>,
) -> DocumentResult<Map<String, Value>> {
    fields
        .iter()
        .map(|(k, v)| Ok((k.clone(), from_attribute(v)?)))
        .collect()
}

fn parse_number(n: &str) -> DocumentResult<Number> {
    if let Ok(i) = n.parse::<i64>() {
        return Ok(Number::from(i));
    }
    if let Ok(u) = n.parse::<u64>() {
        return Ok(Number::from(u));
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| DocumentError::Marshal(format!("'{n}' is not a valid number")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_should_convert_nested_document() {
        let doc = json!({"name": "Ada", "age": 36, "tags": ["a", true, null], "addr": {"zip": 12.5}});
        let attr = to_attribute(&doc);
        let AttributeValue::M(fields) = &attr else {
            panic!("expected map");
        };
        assert_eq!(fields["age"], AttributeValue::N("36".to_owned()));
        assert_eq!(
            fields["tags"],
            AttributeValue::L(vec![
                AttributeValue::S("a".to_owned()),
                AttributeValue::Bool(true),
                AttributeValue::Null(true),
            ])
        );
        assert_eq!(from_attribute(&attr).unwrap(), doc);
    }

    #[test]
    fn test_should_reject_malformed_stored_number() {
        let err = from_attribute(&AttributeValue::N("twelve".to_owned())).unwrap_err();
        assert!(matches!(err, DocumentError::Marshal(_)));
    }

    #[test]
    fn test_should_keep_large_unsigned_numbers() {
        let value = from_attribute(&AttributeValue::N(u64::MAX.to_string())).unwrap();
        assert_eq!(value, json!(u64::MAX));
    }
}
