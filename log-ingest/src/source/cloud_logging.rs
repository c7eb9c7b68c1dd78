use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::{EntryPage, ListEntriesRequest, LogSource, SourceError};
use crate::error::StartupError;

const LIST_ENTRIES_PATH: &str = "v2/entries:list";

/// Cloud Logging over its REST API.
///
/// Authentication is a pre-minted bearer token; an empty token sends no
/// `Authorization` header, which is what the local emulator expects.
pub struct CloudLoggingSource {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl CloudLoggingSource {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StartupError> {
        let endpoint = Url::parse(&format!(
            "{}/{LIST_ENTRIES_PATH}",
            base_url.trim_end_matches('/')
        ))
        .map_err(|e| StartupError::ClientConstruction {
            client: "logging",
            reason: format!("invalid base url {base_url}: {e}"),
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StartupError::ClientConstruction {
                client: "logging",
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint,
            token: token.filter(|t| !t.is_empty()),
        })
    }
}

#[async_trait]
impl LogSource for CloudLoggingSource {
    async fn list_entries(&self, request: &ListEntriesRequest) -> Result<EntryPage, SourceError> {
        let mut builder = self.client.post(self.endpoint.clone()).json(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let page: EntryPage = response.json().await?;
        debug!(
            entries = page.entries.len(),
            has_next = page.next_token().is_some(),
            "fetched log entry page"
        );
        Ok(page)
    }
}
