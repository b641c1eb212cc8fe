//! Conversion between plain JSON and Firestore's typed value encoding
//! (`{"stringValue": "..."}`, `{"mapValue": {"fields": {...}}}`, ...).

use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Map, Number, Value};

/// Encode a plain JSON value.
pub fn encode_value(value: &Value) -> Value {
  match value {
    Value::Null => json!({ "nullValue": null }),
    Value::Bool(b) => json!({ "booleanValue": b }),
    // Integers travel as decimal strings
    Value::Number(n) => match n.as_i64() {
      Some(i) => json!({ "integerValue": i.to_string() }),
      None => json!({ "doubleValue": n }),
    },
    Value::String(s) => json!({ "stringValue": s }),
    Value::Array(items) => {
      let values: Vec<Value> = items.iter().map(encode_value).collect();
      json!({ "arrayValue": { "values": values } })
    }
    Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
  }
}

pub fn encode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
  fields
    .iter()
    .map(|(name, value)| (name.clone(), encode_value(value)))
    .collect()
}

/// Decode a typed value into plain JSON.
///
/// Timestamps, references and bytes come back as their string form;
/// geo points as `{latitude, longitude}`.
pub fn decode_value(value: &Value) -> Result<Value> {
  let (kind, inner) = value
    .as_object()
    .and_then(|map| map.iter().next())
    .map(|(kind, inner)| (kind.as_str(), inner))
    .ok_or_else(|| eyre!("Malformed document value: {}", value))?;

  let decoded = match (kind, inner) {
    ("nullValue", _) => Value::Null,
    ("booleanValue", v) => Value::Bool(v.as_bool().unwrap_or_default()),
    ("integerValue", Value::String(s)) => s
      .parse::<i64>()
      .map(|i| Value::Number(i.into()))
      .map_err(|e| eyre!("Failed to parse integer value {:?}: {}", s, e))?,
    ("integerValue", v @ Value::Number(_)) => v.clone(),
    ("doubleValue", Value::Number(n)) => Value::Number(n.clone()),
    // NaN and infinities arrive as strings and have no JSON form
    ("doubleValue", Value::String(s)) => s
      .parse::<f64>()
      .ok()
      .and_then(Number::from_f64)
      .map(Value::Number)
      .unwrap_or(Value::Null),
    ("stringValue", v) | ("timestampValue", v) | ("referenceValue", v) | ("bytesValue", v) => {
      v.clone()
    }
    ("geoPointValue", v) => v.clone(),
    ("arrayValue", v) => {
      let values = match v.get("values").and_then(Value::as_array) {
        Some(values) => values.iter().map(decode_value).collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
      };
      Value::Array(values)
    }
    ("mapValue", v) => {
      let fields = match v.get("fields").and_then(Value::as_object) {
        Some(fields) => decode_fields(fields)?,
        None => Map::new(),
      };
      Value::Object(fields)
    }
    (kind, _) => return Err(eyre!("Unsupported document value type: {}", kind)),
  };

  Ok(decoded)
}

pub fn decode_fields(fields: &Map<String, Value>) -> Result<Map<String, Value>> {
  fields
    .iter()
    .map(|(name, value)| {
      decode_value(value)
        .map(|decoded| (name.clone(), decoded))
        .map_err(|e| eyre!("Field {}: {}", name, e))
    })
    .collect()
}
