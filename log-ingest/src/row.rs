use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};

/// The warehouse row shape. This is the only place the column list is defined:
/// the ClickHouse insert, the table DDL and the message bus payload all derive
/// from it.
///
/// `json_payload`, `resource_labels`, `http_request`, `source_location` and
/// `labels` always hold valid JSON text (`null`, `{}` or an object).
#[derive(Row, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseRow {
    #[serde(with = "clickhouse::serde::chrono::datetime64::micros")]
    pub timestamp: DateTime<Utc>,
    pub severity: String,
    pub log_name: String,
    pub text_payload: String,
    pub json_payload: String,
    pub insert_id: String,
    pub resource_type: String,
    pub resource_labels: String,
    pub http_request: String,
    pub trace: String,
    pub span_id: String,
    pub source_location: String,
    pub labels: String,
    pub service_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Timestamp,
    Text,
    Json,
}

impl ColumnKind {
    fn clickhouse_type(&self) -> &'static str {
        match self {
            ColumnKind::Timestamp => "DateTime64(6, 'UTC')",
            // JSON text is stored verbatim; readers parse it with JSONExtract*
            ColumnKind::Text | ColumnKind::Json => "String",
        }
    }
}

/// Column names and kinds of [`WarehouseRow`], used for the table DDL.
pub const COLUMNS: &[(&str, ColumnKind)] = &[
    ("timestamp", ColumnKind::Timestamp),
    ("severity", ColumnKind::Text),
    ("log_name", ColumnKind::Text),
    ("text_payload", ColumnKind::Text),
    ("json_payload", ColumnKind::Json),
    ("insert_id", ColumnKind::Text),
    ("resource_type", ColumnKind::Text),
    ("resource_labels", ColumnKind::Json),
    ("http_request", ColumnKind::Json),
    ("trace", ColumnKind::Text),
    ("span_id", ColumnKind::Text),
    ("source_location", ColumnKind::Json),
    ("labels", ColumnKind::Json),
    ("service_name", ColumnKind::Text),
];

impl WarehouseRow {
    pub fn create_table_sql(database: &str, table: &str) -> String {
        let columns = COLUMNS
            .iter()
            .map(|(name, kind)| format!("    `{name}` {}", kind.clickhouse_type()))
            .collect::<Vec<_>>()
            .join(",\n");

        format!(
            "CREATE TABLE IF NOT EXISTS `{database}`.`{table}`\n(\n{columns}\n)\n\
             ENGINE = MergeTree\nORDER BY (service_name, timestamp)"
        )
    }
}
