//! Conversion between plain JSON and Firestore's typed value encoding.

use anyhow::Context as _;
use serde_json::{Map, Value, json};

pub type Fields = Map<String, Value>;

pub fn encode(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

pub fn encode_fields(map: &Map<String, Value>) -> Fields {
    map.iter().map(|(k, v)| (k.clone(), encode(v))).collect()
}

/// Decodes one typed value. Unknown kinds (timestamps, references, ...) become
/// their raw payload.
pub fn decode(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|obj| obj.iter().next()) else {
        return Value::Null;
    };
    match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" | "doubleValue" | "stringValue" => inner.clone(),
        "integerValue" => match inner {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            other => other.clone(),
        },
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(
            inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .unwrap_or_default(),
        ),
        _ => inner.clone(),
    }
}

pub fn decode_fields(fields: &Fields) -> Map<String, Value> {
    fields.iter().map(|(k, v)| (k.clone(), decode(v))).collect()
}

pub fn to_fields<T: serde::Serialize>(value: &T) -> anyhow::Result<Fields> {
    match serde_json::to_value(value).context("serialize document")? {
        Value::Object(map) => Ok(encode_fields(&map)),
        other => anyhow::bail!("document must serialize to an object, got {other}"),
    }
}

pub fn from_fields<T: serde::de::DeserializeOwned>(fields: &Fields) -> anyhow::Result<T> {
    serde_json::from_value(Value::Object(decode_fields(fields))).context("decode document fields")
}
