use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::notify::BusError;
use crate::source::SourceError;
use crate::warehouse::WarehouseError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Env(#[from] envconfig::Error),

    #[error("missing required configuration value: {0}")]
    MissingParameter(&'static str),

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to construct {client} client: {reason}")]
    ClientConstruction {
        client: &'static str,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("error listing log entries for service {service}: {source}")]
    Backend {
        service: String,
        #[source]
        source: SourceError,
    },
}

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("missing log entry")]
    MissingEntry,

    #[error("malformed log entry: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum InsertError {
    #[error("missing warehouse parameter: {0}")]
    MissingParameter(&'static str),

    #[error("warehouse rejected batch of {rows} rows: {source}")]
    Rejected {
        rows: usize,
        #[source]
        source: WarehouseError,
    },
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("failed to resolve topic {topic}: {source}")]
    TopicResolution {
        topic: String,
        #[source]
        source: BusError,
    },

    #[error("failed to serialize row: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to publish message to {topic}: {source}")]
    Publish {
        topic: String,
        #[source]
        source: BusError,
    },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to fetch logs: {0}")]
    Fetch(#[from] FetchError),

    #[error("all {entries} log entries failed to convert")]
    AllConversionsFailed { entries: usize },

    #[error("failed to handle errors: {0}")]
    Notify(#[from] NotifyError),

    #[error("failed to insert logs into warehouse: {0}")]
    Insert(#[from] InsertError),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Fetch(_) => "fetch",
            PipelineError::AllConversionsFailed { .. } => "conversion",
            PipelineError::Notify(_) => "notify",
            PipelineError::Insert(_) => "insert",
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = StatusCode::INTERNAL_SERVER_ERROR;

        tracing::error!(error = %self, kind = self.kind(), "Failed to process logs");

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "code": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
