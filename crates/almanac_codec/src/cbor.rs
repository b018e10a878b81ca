//! CBOR encoding and the serde bridge for typed records.

use crate::error::{CodecError, CodecResult};
use crate::record::{Fields, Record};
use crate::value::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value to CBOR bytes.
pub fn to_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let raw: ciborium::Value = value.clone().into();
    let mut out = Vec::new();
    ciborium::ser::into_writer(&raw, &mut out).map_err(|e| CodecError::encoding(e.to_string()))?;
    Ok(out)
}

/// Decodes a value from CBOR bytes.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let raw: ciborium::Value =
        ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding(e.to_string()))?;
    Value::try_from(raw)
}

/// Converts a serializable struct into record fields.
///
/// The struct must serialize as a map. An `id` entry, if any, is kept; use
/// [`Fields::without_id`] to drop it.
pub fn to_fields<T: Serialize + ?Sized>(value: &T) -> CodecResult<Fields> {
    let raw = ciborium::Value::serialized(value).map_err(|e| CodecError::encoding(e.to_string()))?;
    match Value::try_from(raw)? {
        Value::Map(map) => Ok(Fields::from(map)),
        _ => Err(CodecError::invalid_structure(
            "typed records must serialize as a map",
        )),
    }
}

/// Converts a record (including its id) into a deserializable struct.
pub fn from_record<T: DeserializeOwned>(record: &Record) -> CodecResult<T> {
    let raw: ciborium::Value = record.clone().into_value().into();
    raw.deserialized()
        .map_err(|e| CodecError::decoding(e.to_string()))
}
