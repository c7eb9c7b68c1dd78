mod cloud_logging;

pub use cloud_logging::CloudLoggingSource;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("logging backend returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Body of an `entries:list` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntriesRequest {
    pub resource_names: Vec<String>,
    pub filter: String,
    pub order_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

/// One page of results. Entries stay as raw JSON so that a single malformed
/// entry is rejected at conversion time instead of failing the whole page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPage {
    #[serde(default)]
    pub entries: Vec<Value>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl EntryPage {
    /// The token for the following page, if there is one. The backend signals
    /// the last page with either a missing or an empty token.
    pub fn next_token(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

#[async_trait]
pub trait LogSource: Send + Sync {
    async fn list_entries(&self, request: &ListEntriesRequest) -> Result<EntryPage, SourceError>;
}
