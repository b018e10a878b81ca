//! JSON conversion for command input and output.

use almanac_codec::{Fields, Record, Value};
use almanac_core::Query;
use serde_json::{Map, Number, Value as Json};
use thiserror::Error;

/// Errors converting JSON input.
#[derive(Debug, Error)]
pub enum JsonError {
    /// The input is not valid JSON.
    #[error("invalid JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    /// The input is not a JSON object.
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// A number has no exact integer representation.
    #[error("field values must be integers, got {0}")]
    NotAnInteger(Number),
}

fn kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

/// Converts a JSON value into a field value.
pub fn to_value(json: Json) -> Result<Value, JsonError> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => Value::Integer(n.as_i64().ok_or(JsonError::NotAnInteger(n))?),
        Json::String(s) => Value::Text(s),
        Json::Array(items) => Value::Array(
            items
                .into_iter()
                .map(to_value)
                .collect::<Result<_, _>>()?,
        ),
        Json::Object(map) => Value::Map(map.into_iter().map(entry).collect::<Result<_, _>>()?),
    })
}

fn entry((name, json): (String, Json)) -> Result<(String, Value), JsonError> {
    Ok((name, to_value(json)?))
}

/// Parses a JSON object into record fields.
pub fn parse_fields(input: &str) -> Result<Fields, JsonError> {
    match serde_json::from_str::<Json>(input)? {
        Json::Object(map) => map.into_iter().map(entry).collect(),
        other => Err(JsonError::NotAnObject(kind(&other))),
    }
}

/// Parses a JSON object into a query.
pub fn parse_query(input: &str) -> Result<Query, JsonError> {
    Ok(Query::from(parse_fields(input)?))
}

/// Converts a field value to JSON.
pub fn from_value(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Integer(i) => Json::from(*i),
        Value::Text(s) => Json::String(s.clone()),
        Value::Bytes(bytes) => Json::Array(bytes.iter().map(|&b| Json::from(b)).collect()),
        Value::Array(items) => Json::Array(items.iter().map(from_value).collect()),
        Value::Map(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_value(v)))
                .collect(),
        ),
    }
}

/// Converts a record, id included, to a JSON object.
pub fn from_record(record: &Record) -> Json {
    let mut object = Map::new();
    object.insert("id".to_string(), Json::String(record.id().to_string()));
    for (name, value) in record.fields().iter() {
        object.insert(name.clone(), from_value(value));
    }
    Json::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_objects() {
        let fields = parse_fields(r#"{"calendar_id": "c1", "startDate": 100, "allDay": true}"#)
            .unwrap();
        assert_eq!(
            fields,
            Fields::new()
                .with("calendar_id", "c1")
                .with("startDate", 100)
                .with("allDay", true)
        );
        assert!(parse_query("{}").unwrap().is_empty());
    }

    #[test]
    fn rejects_non_objects_and_floats() {
        assert!(matches!(parse_fields("[1]"), Err(JsonError::NotAnObject("an array"))));
        assert!(matches!(
            parse_fields(r#"{"t": 1.5}"#),
            Err(JsonError::NotAnInteger(_))
        ));
        assert!(matches!(parse_fields("{"), Err(JsonError::Syntax(_))));
    }

    #[test]
    fn records_include_their_id() {
        let record = Record::new("e1", Fields::new().with("title", "Standup"));
        assert_eq!(
            from_record(&record),
            serde_json::json!({"id": "e1", "title": "Standup"})
        );
    }
}
