use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConversionError;
use crate::log_entry::{LogEntry, Payload};
use crate::normalize::{normalize, SubValue, JSON_NULL};
use crate::row::WarehouseRow;

/// An entry that could not be turned into a row, as published to the error topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionFailure {
    pub error: String,
    pub service_name: String,
    pub entry: Value,
}

impl ConversionFailure {
    /// `service_name` comes from the raw resource labels when they carry one.
    pub fn new(raw: &Value, error: &ConversionError) -> Self {
        let service_name = raw
            .pointer("/resource/labels/service_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Self {
            error: error.to_string(),
            service_name,
            entry: raw.clone(),
        }
    }
}

/// Parses one raw entry as returned by the logging backend.
pub fn parse_entry(raw: &Value) -> Result<LogEntry, ConversionError> {
    if raw.is_null() {
        return Err(ConversionError::MissingEntry);
    }
    Ok(LogEntry::deserialize(raw)?)
}

/// Maps an entry onto the warehouse row shape.
///
/// `service_name` is left empty: it is a derived field that the pipeline fills
/// in from the resource labels.
pub fn convert(entry: &LogEntry) -> WarehouseRow {
    let (text_payload, json_payload) = match entry.payload() {
        Payload::Text(text) => (text.to_owned(), JSON_NULL.to_owned()),
        Payload::Json(fields) => (String::new(), normalize(SubValue::Struct(fields))),
        Payload::Proto(payload) => (String::new(), normalize(SubValue::Opaque(payload))),
        Payload::None => (String::new(), JSON_NULL.to_owned()),
    };

    WarehouseRow {
        timestamp: entry.timestamp,
        severity: entry.severity.to_string(),
        log_name: entry.log_name.clone(),
        text_payload,
        json_payload,
        insert_id: entry.insert_id.clone(),
        resource_type: entry.resource_type().to_owned(),
        resource_labels: normalize(entry.resource_labels().into()),
        http_request: normalize(entry.http_request.as_ref().into()),
        trace: entry.trace.clone(),
        span_id: entry.span_id.clone(),
        source_location: normalize(entry.source_location.as_ref().into()),
        labels: normalize(entry.labels.as_ref().into()),
        service_name: String::new(),
    }
}

/// Parses and converts in one step, filling in the derived `service_name`.
pub fn convert_raw(raw: &Value) -> Result<WarehouseRow, ConversionError> {
    let entry = parse_entry(raw)?;
    let mut row = convert(&entry);
    row.service_name = entry.service_name().to_owned();
    Ok(row)
}
