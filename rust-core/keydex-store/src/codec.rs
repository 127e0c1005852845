// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document codec for KeyDex.
//
// Records are stored as CBOR blobs. For index construction and query
// matching a record is projected into a field map through serde, so the
// usual serde attributes (`rename`, `skip`, `skip_serializing_if`,
// `flatten`) decide which columns a record exposes and under which name.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::error::{StoreError, StoreResult};
use crate::key::Key;

/// A record projected into `{column: value}` form.
pub type FieldMap = Map<String, Value>;

/// Project a record into its field map.
///
/// Maps pass through unchanged; structs yield one entry per serialized
/// field. Anything that does not serialize to an object is rejected.
pub fn project<T: Serialize + ?Sized>(value: &T) -> StoreResult<FieldMap> {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(StoreError::NotProjectable(format!(
            "expected a struct or map, got {}",
            kind_of(&other)
        ))),
        Err(err) => Err(StoreError::NotProjectable(err.to_string())),
    }
}

/// Look up a column, treating `null` as absent.
pub fn field<'a>(fields: &'a FieldMap, name: &str) -> Option<&'a Value> {
    fields.get(name).filter(|value| !value.is_null())
}

/// Convert a predicate operand into a field value.
pub fn to_field_value<T: Serialize + ?Sized>(value: &T) -> StoreResult<Value> {
    serde_json::to_value(value)
        .map_err(|err| StoreError::BadRequest(format!("unsupported filter value: {err}")))
}

/// Serialize a record into its stored form.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> StoreResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|err| StoreError::Codec(format!("failed to encode record: {err}")))?;
    Ok(bytes)
}

/// Deserialize a stored record.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    ciborium::from_reader(bytes)
        .map_err(|err| StoreError::Corrupted(format!("failed to decode record: {err}")))
}

/// Decode a stored record without committing to a destination type.
///
/// Any well-formed CBOR item decodes, including maps with integer keys
/// and byte strings, so a failure here always means malformed bytes.
pub fn decode_stored(bytes: &[u8]) -> StoreResult<ciborium::Value> {
    decode(bytes)
}

/// Project a decoded record into its field map.
///
/// Produces the same columns [`project`] produced when the record was
/// written: integer and boolean map keys become their decimal or literal
/// text, byte strings become arrays of numbers and tags are unwrapped.
/// Map entries keyed by anything else are not addressable as columns and
/// are left out. Returns `None` for records that are not maps.
pub fn stored_fields(record: &ciborium::Value) -> Option<FieldMap> {
    let ciborium::Value::Map(entries) = untagged(record) else {
        return None;
    };
    Some(
        entries
            .iter()
            .filter_map(|(name, value)| Some((column_name(name)?, from_stored(value))))
            .collect(),
    )
}

/// The column name a stored map key is addressed by.
pub fn column_name(key: &ciborium::Value) -> Option<String> {
    match untagged(key) {
        ciborium::Value::Text(text) => Some(text.clone()),
        ciborium::Value::Integer(int) => Some(i128::from(*int).to_string()),
        ciborium::Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn untagged(mut value: &ciborium::Value) -> &ciborium::Value {
    while let ciborium::Value::Tag(_, inner) = value {
        value = inner;
    }
    value
}

fn from_stored(value: &ciborium::Value) -> Value {
    match untagged(value) {
        ciborium::Value::Integer(int) => {
            let int = i128::from(*int);
            if let Ok(int) = i64::try_from(int) {
                Value::from(int)
            } else if let Ok(int) = u64::try_from(int) {
                Value::from(int)
            } else {
                Number::from_f64(int as f64).map_or(Value::Null, Value::Number)
            }
        }
        ciborium::Value::Float(float) => Number::from_f64(*float).map_or(Value::Null, Value::Number),
        ciborium::Value::Text(text) => Value::String(text.clone()),
        ciborium::Value::Bool(flag) => Value::Bool(*flag),
        ciborium::Value::Bytes(bytes) => bytes.iter().map(|byte| Value::from(*byte)).collect(),
        ciborium::Value::Array(items) => items.iter().map(from_stored).collect(),
        ciborium::Value::Map(_) => stored_fields(value).map_or(Value::Null, Value::Object),
        _ => Value::Null,
    }
}

/// Canonical form of a field value for hashing and equality.
///
/// A float with no fractional part that fits a 64-bit integer becomes
/// that integer, so `1` and `1.0` hash and compare alike. Arrays and
/// objects are canonicalized element by element.
pub fn canonical(value: &Value) -> Value {
    match value {
        Value::Number(number) => Value::Number(canonical_number(number)),
        Value::Array(items) => items.iter().map(canonical).collect(),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), canonical(value)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn canonical_number(number: &Number) -> Number {
    const TWO_63: f64 = 9_223_372_036_854_775_808.0;
    const TWO_64: f64 = 18_446_744_073_709_551_616.0;
    match number.as_f64() {
        Some(float) if number.is_f64() && float.is_finite() && float.fract() == 0.0 => {
            if (-TWO_63..TWO_63).contains(&float) {
                Number::from(float as i64)
            } else if (0.0..TWO_64).contains(&float) {
                Number::from(float as u64)
            } else {
                number.clone()
            }
        }
        _ => number.clone(),
    }
}

/// Serialize the list of index keys kept under an attribute key.
pub fn encode_keys(keys: &[Key]) -> StoreResult<Vec<u8>> {
    let list = ciborium::Value::Array(
        keys.iter()
            .map(|key| ciborium::Value::Bytes(key.as_bytes().to_vec()))
            .collect(),
    );
    encode(&list)
}

/// Deserialize the list of index keys kept under an attribute key.
pub fn decode_keys(bytes: &[u8]) -> StoreResult<Vec<Key>> {
    let list: ciborium::Value = ciborium::from_reader(bytes)
        .map_err(|err| StoreError::Corrupted(format!("failed to decode index list: {err}")))?;
    let ciborium::Value::Array(items) = list else {
        return Err(StoreError::Corrupted(
            "index list is not an array".to_string(),
        ));
    };
    items
        .into_iter()
        .map(|item| match item {
            ciborium::Value::Bytes(bytes) => Ok(Key::from(bytes)),
            _ => Err(StoreError::Corrupted(
                "index list entry is not a byte string".to_string(),
            )),
        })
        .collect()
}

/// Human-readable kind name of a field value.
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        #[serde(rename = "user_name")]
        name: String,
        age: u32,
        #[serde(skip)]
        session: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        nickname: Option<String>,
    }

    #[test]
    fn test_project_struct_honors_serde_attributes() {
        let user = User {
            name: "Alice".into(),
            age: 30,
            session: Some("secret".into()),
            nickname: None,
        };
        let fields = project(&user).unwrap();
        assert_eq!(fields.get("user_name"), Some(&json!("Alice")));
        assert_eq!(fields.get("age"), Some(&json!(30)));
        assert!(!fields.contains_key("name"));
        assert!(!fields.contains_key("session"));
        assert!(!fields.contains_key("nickname"));
    }

    #[test]
    fn test_project_map_passes_through() {
        let value = json!({"name": "bar", "count": 1});
        let fields = project(&value).unwrap();
        assert_eq!(Value::Object(fields), value);
    }

    #[test]
    fn test_project_rejects_non_records() {
        assert!(matches!(project(&42), Err(StoreError::NotProjectable(_))));
        assert!(matches!(
            project(&vec![1, 2]),
            Err(StoreError::NotProjectable(_))
        ));
    }

    #[test]
    fn test_field_treats_null_as_absent() {
        let fields = project(&json!({"a": null, "b": 1})).unwrap();
        assert_eq!(field(&fields, "a"), None);
        assert_eq!(field(&fields, "b"), Some(&json!(1)));
        assert_eq!(field(&fields, "c"), None);
    }

    #[test]
    fn test_encode_decode_struct() {
        let user = User {
            name: "Bob".into(),
            age: 41,
            session: None,
            nickname: Some("bobby".into()),
        };
        let bytes = encode(&user).unwrap();
        let back: User = decode(&bytes).unwrap();
        assert_eq!(back, user);

        // The same bytes decode as a plain map.
        let map: Value = decode(&bytes).unwrap();
        assert_eq!(map["user_name"], json!("Bob"));
    }

    #[test]
    fn test_decode_garbage_is_corruption() {
        let result: StoreResult<User> = decode(b"\xff\x00not-cbor");
        assert!(matches!(result, Err(StoreError::Corrupted(_))));
    }

    #[derive(Serialize)]
    struct Scored {
        name: String,
        scores: std::collections::BTreeMap<u32, String>,
        #[serde(serialize_with = "as_byte_string")]
        blob: Vec<u8>,
    }

    fn as_byte_string<S: serde::Serializer>(bytes: &Vec<u8>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    #[test]
    fn test_stored_fields_accept_non_json_maps() {
        let record = Scored {
            name: "bar".into(),
            scores: [(7, "x".to_string())].into_iter().collect(),
            blob: vec![1, 2],
        };
        let bytes = encode(&record).unwrap();
        assert!(decode::<Value>(&bytes).is_err());

        let stored = decode_stored(&bytes).unwrap();
        let fields = stored_fields(&stored).unwrap();
        assert_eq!(fields, project(&record).unwrap());
        assert_eq!(fields["scores"], json!({"7": "x"}));
        assert_eq!(fields["blob"], json!([1, 2]));
    }

    #[test]
    fn test_stored_fields_of_scalar_is_none() {
        let stored = decode_stored(&encode(&42u32).unwrap()).unwrap();
        assert!(stored_fields(&stored).is_none());
    }

    #[test]
    fn test_canonical_numbers() {
        assert_eq!(canonical(&json!(1.0)), json!(1));
        assert_eq!(canonical(&json!(-3.0)), json!(-3));
        assert_eq!(canonical(&json!(1.5)), json!(1.5));
        assert_eq!(canonical(&json!(1e19)), json!(10_000_000_000_000_000_000u64));
        assert_eq!(canonical(&json!(1e300)), json!(1e300));
        assert_eq!(canonical(&json!([2.0, {"a": 4.0}])), json!([2, {"a": 4}]));
        assert_eq!(canonical(&json!("1.0")), json!("1.0"));
    }

    #[test]
    fn test_key_list_codec() {
        let keys = vec![Key::from(vec![1, 2, 3]), Key::from(vec![9; 17])];
        let bytes = encode_keys(&keys).unwrap();
        assert_eq!(decode_keys(&bytes).unwrap(), keys);
        assert!(decode_keys(&encode_keys(&[]).unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_key_list_rejects_wrong_shape() {
        let bytes = encode(&json!({"not": "a list"})).unwrap();
        assert!(matches!(decode_keys(&bytes), Err(StoreError::Corrupted(_))));
        let bytes = encode(&json!(["text"])).unwrap();
        assert!(matches!(decode_keys(&bytes), Err(StoreError::Corrupted(_))));
    }
}
