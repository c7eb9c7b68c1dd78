use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::FetchError;
use crate::source::{ListEntriesRequest, LogSource};

pub const RESOURCE_TYPE: &str = "cloud_run_revision";
pub const ORDER_BY: &str = "timestamp desc";

/// A closed time interval, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

pub fn service_filter(service: &str, range: &TimeRange) -> String {
    format!(
        r#"resource.type="{RESOURCE_TYPE}" AND resource.labels.service_name="{service}" AND timestamp >= "{}" AND timestamp <= "{}""#,
        range.start.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        range.end.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    )
}

pub struct Fetcher {
    source: Arc<dyn LogSource>,
    resource_scope: String,
    page_size: Option<u32>,
}

impl Fetcher {
    pub fn new(source: Arc<dyn LogSource>, project_id: &str, page_size: Option<u32>) -> Self {
        Self {
            source,
            resource_scope: format!("projects/{project_id}"),
            page_size,
        }
    }

    /// Collects every entry for each service in turn. Entries are grouped by
    /// service in input order, each group in the order the backend returned it
    /// (newest first). Any backend error discards everything fetched so far.
    pub async fn fetch(
        &self,
        services: &[String],
        range: &TimeRange,
    ) -> Result<Vec<Value>, FetchError> {
        let mut entries = Vec::new();

        for service in services {
            let mut request = ListEntriesRequest {
                resource_names: vec![self.resource_scope.clone()],
                filter: service_filter(service, range),
                order_by: ORDER_BY.to_string(),
                page_size: self.page_size,
                page_token: None,
            };

            let before = entries.len();
            loop {
                let page = self.source.list_entries(&request).await.map_err(|source| {
                    FetchError::Backend {
                        service: service.clone(),
                        source,
                    }
                })?;

                let next = page.next_token().map(str::to_string);
                entries.extend(page.entries);

                match next {
                    Some(token) => {
                        debug!(service = %service, "fetching next page");
                        request.page_token = Some(token);
                    }
                    None => break,
                }
            }

            info!(
                service = %service,
                entries = entries.len() - before,
                "fetched log entries"
            );
        }

        metrics::counter!(crate::metrics_consts::ENTRIES_FETCHED).increment(entries.len() as u64);

        Ok(entries)
    }
}
