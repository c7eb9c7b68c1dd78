use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::log_entry::{HttpRequest, SourceLocation};

pub const JSON_NULL: &str = "null";
pub const JSON_EMPTY_OBJECT: &str = "{}";

/// A variable-shaped part of a log entry, destined for a JSON column.
///
/// Every shape the warehouse can receive is a variant here, so adding a new one
/// forces [`normalize`] to decide how it is rendered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubValue<'a> {
    Absent,
    Struct(&'a Map<String, Value>),
    HttpRequest(&'a HttpRequest),
    SourceLocation(&'a SourceLocation),
    Mapping(&'a BTreeMap<String, String>),
    Opaque(&'a Value),
}

impl<'a> From<Option<&'a HttpRequest>> for SubValue<'a> {
    fn from(value: Option<&'a HttpRequest>) -> Self {
        value.map_or(SubValue::Absent, SubValue::HttpRequest)
    }
}

impl<'a> From<Option<&'a SourceLocation>> for SubValue<'a> {
    fn from(value: Option<&'a SourceLocation>) -> Self {
        value.map_or(SubValue::Absent, SubValue::SourceLocation)
    }
}

impl<'a> From<Option<&'a BTreeMap<String, String>>> for SubValue<'a> {
    fn from(value: Option<&'a BTreeMap<String, String>>) -> Self {
        value.map_or(SubValue::Absent, SubValue::Mapping)
    }
}

impl<'a> From<Option<&'a Map<String, Value>>> for SubValue<'a> {
    fn from(value: Option<&'a Map<String, Value>>) -> Self {
        value.map_or(SubValue::Absent, SubValue::Struct)
    }
}

/// Renders a sub-value as JSON text that is always valid for a JSON column.
///
/// Absent values become `null`, present-but-empty values become `{}`, anything
/// else is serialized in full. Encoding problems never escape: structured
/// values fall back to `null`, opaque payloads to `{}` or an `{"error": ..}`
/// object describing the failure.
pub fn normalize(value: SubValue<'_>) -> String {
    match value {
        SubValue::Absent => JSON_NULL.to_owned(),
        SubValue::Struct(fields) if fields.is_empty() => JSON_EMPTY_OBJECT.to_owned(),
        SubValue::HttpRequest(request) if request.is_empty() => JSON_EMPTY_OBJECT.to_owned(),
        SubValue::SourceLocation(location) if location.is_empty() => {
            JSON_EMPTY_OBJECT.to_owned()
        }
        SubValue::Mapping(mapping) if mapping.is_empty() => JSON_EMPTY_OBJECT.to_owned(),
        SubValue::Struct(fields) => encode_or_null(fields),
        SubValue::HttpRequest(request) => encode_or_null(request),
        SubValue::SourceLocation(location) => encode_or_null(location),
        SubValue::Mapping(mapping) => encode_or_null(mapping),
        SubValue::Opaque(payload) => encode_opaque(payload),
    }
}

fn encode_or_null<T: Serialize + ?Sized>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(json) if !json.is_empty() => json,
        Ok(_) => {
            warn!("sub-value encoded to empty output, storing null");
            JSON_NULL.to_owned()
        }
        Err(e) => {
            warn!(error = %e, "failed to encode sub-value, storing null");
            JSON_NULL.to_owned()
        }
    }
}

fn encode_opaque(payload: &Value) -> String {
    match serde_json::to_string(payload) {
        Ok(json) if json.is_empty() || json == JSON_NULL => JSON_EMPTY_OBJECT.to_owned(),
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "failed to encode opaque payload");
            encode_error(&e.to_string())
        }
    }
}

fn encode_error(message: &str) -> String {
    let mut body = Map::new();
    body.insert("error".to_owned(), Value::String(message.to_owned()));
    Value::Object(body).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn is_valid_json(text: &str) -> bool {
        serde_json::from_str::<Value>(text).is_ok()
    }

    #[test]
    fn test_absent_is_null() {
        assert_eq!(normalize(SubValue::Absent), "null");
        assert_eq!(normalize(SubValue::from(None::<&HttpRequest>)), "null");
        assert_eq!(normalize(SubValue::from(None::<&SourceLocation>)), "null");
        assert_eq!(
            normalize(SubValue::from(None::<&BTreeMap<String, String>>)),
            "null"
        );
        assert_eq!(normalize(SubValue::from(None::<&Map<String, Value>>)), "null");
    }

    #[test]
    fn test_empty_structures_are_empty_objects() {
        let fields = Map::new();
        let mapping = BTreeMap::new();

        assert_eq!(normalize(SubValue::Struct(&fields)), "{}");
        assert_eq!(normalize(SubValue::Mapping(&mapping)), "{}");
        assert_eq!(normalize(SubValue::HttpRequest(&HttpRequest::default())), "{}");
        assert_eq!(
            normalize(SubValue::SourceLocation(&SourceLocation::default())),
            "{}"
        );
    }

    #[test]
    fn test_mapping_is_plain_object_with_sorted_keys() {
        let mapping = BTreeMap::from([
            ("zone".to_string(), "b".to_string()),
            ("app".to_string(), "a".to_string()),
        ]);

        assert_eq!(
            normalize(SubValue::Mapping(&mapping)),
            r#"{"app":"a","zone":"b"}"#
        );
    }

    #[test]
    fn test_struct_payload_keeps_nested_values() {
        let fields = json!({"message": "boom", "context": {"retries": 3, "ok": false}});
        let text = normalize(SubValue::Struct(fields.as_object().unwrap()));

        assert!(is_valid_json(&text));
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, fields);
    }

    #[test]
    fn test_populated_descriptors_use_proto_field_names() {
        let location = SourceLocation {
            file: "handler.rs".to_string(),
            line: 7,
            function: String::new(),
        };

        let parsed: Value =
            serde_json::from_str(&normalize(SubValue::SourceLocation(&location))).unwrap();
        assert_eq!(
            parsed,
            json!({"file": "handler.rs", "line": "7", "function": ""})
        );

        let request = HttpRequest {
            remote_ip: "10.0.0.1".to_string(),
            ..Default::default()
        };
        let parsed: Value =
            serde_json::from_str(&normalize(SubValue::HttpRequest(&request))).unwrap();
        assert_eq!(parsed["remote_ip"], "10.0.0.1");
        assert_eq!(parsed["request_url"], "");
    }

    #[test]
    fn test_opaque_payload() {
        let payload = json!({"@type": "type.googleapis.com/google.cloud.audit.AuditLog", "methodName": "Insert"});
        let parsed: Value =
            serde_json::from_str(&normalize(SubValue::Opaque(&payload))).unwrap();
        assert_eq!(parsed, payload);

        assert_eq!(normalize(SubValue::Opaque(&Value::Null)), "{}");
    }

    #[test]
    fn test_error_object_is_valid_json() {
        let text = encode_error(r#"bad "quote" in message"#);
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["error"], r#"bad "quote" in message"#);
    }
}
