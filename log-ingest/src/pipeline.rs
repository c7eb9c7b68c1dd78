use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::convert::{convert_raw, ConversionFailure};
use crate::error::{InsertError, PipelineError};
use crate::fetch::{Fetcher, TimeRange};
use crate::metrics_consts::{CONVERSION_FAILURES, RUNS_TOTAL, RUN_DURATION};
use crate::notify::{ErrorNotifier, NotifyMode};
use crate::row::WarehouseRow;
use crate::warehouse::BatchInserter;

const PROGRESS_INTERVAL: usize = 50;

/// Counts for one run that produced rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub fetched: usize,
    pub converted: usize,
    pub conversion_failures: usize,
    pub published: usize,
    pub inserted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The backend had nothing for the services and interval.
    NoEntries,
    Ingested(RunReport),
}

impl RunOutcome {
    pub fn processed(&self) -> usize {
        match self {
            RunOutcome::NoEntries => 0,
            RunOutcome::Ingested(report) => report.converted,
        }
    }

    pub fn conversion_failures(&self) -> usize {
        match self {
            RunOutcome::NoEntries => 0,
            RunOutcome::Ingested(report) => report.conversion_failures,
        }
    }
}

pub struct IngestionPipeline {
    fetcher: Fetcher,
    notifier: ErrorNotifier,
    inserter: BatchInserter,
    notify_mode: NotifyMode,
}

impl IngestionPipeline {
    pub fn new(
        fetcher: Fetcher,
        notifier: ErrorNotifier,
        inserter: BatchInserter,
        notify_mode: NotifyMode,
    ) -> Self {
        Self {
            fetcher,
            notifier,
            inserter,
            notify_mode,
        }
    }

    pub fn inserter(&self) -> &BatchInserter {
        &self.inserter
    }

    /// Fetch, convert, notify, insert. Each stage finishes before the next
    /// starts, and nothing is retried.
    pub async fn run(
        &self,
        services: &[String],
        range: &TimeRange,
    ) -> Result<RunOutcome, PipelineError> {
        let started = Instant::now();
        info!(
            services = ?services,
            start = %range.start(),
            end = %range.end(),
            notify_mode = %self.notify_mode,
            "starting ingestion run"
        );

        let result = self.execute(services, range).await;

        let outcome = match &result {
            Ok(RunOutcome::NoEntries) => "no_entries",
            Ok(RunOutcome::Ingested(_)) => "success",
            Err(e) => e.kind(),
        };
        metrics::counter!(RUNS_TOTAL, "outcome" => outcome).increment(1);
        metrics::histogram!(RUN_DURATION).record(started.elapsed().as_secs_f64());

        match &result {
            Ok(RunOutcome::Ingested(report)) => info!(
                fetched = report.fetched,
                converted = report.converted,
                conversion_failures = report.conversion_failures,
                published = report.published,
                inserted = report.inserted,
                "ingestion run finished"
            ),
            Ok(RunOutcome::NoEntries) => info!("no log entries to process"),
            Err(e) => error!(error = %e, kind = e.kind(), "ingestion run failed"),
        }

        result
    }

    async fn execute(
        &self,
        services: &[String],
        range: &TimeRange,
    ) -> Result<RunOutcome, PipelineError> {
        let entries = self.fetcher.fetch(services, range).await?;
        if entries.is_empty() {
            return Ok(RunOutcome::NoEntries);
        }

        let (rows, failures) = convert_batch(&entries);
        if rows.is_empty() {
            return Err(PipelineError::AllConversionsFailed {
                entries: entries.len(),
            });
        }

        let published = match self.notify_mode {
            NotifyMode::All => self.notifier.notify(&rows).await?,
            NotifyMode::Failures => self.notifier.notify_failures(&failures).await?,
        };

        if let Err(e) = self.inserter.insert(&rows).await {
            if self.notify_mode == NotifyMode::Failures
                && matches!(e, InsertError::Rejected { .. })
            {
                match self.notifier.notify(&rows).await {
                    Ok(count) => info!(
                        rows = count,
                        topic = self.notifier.topic(),
                        "published rejected batch"
                    ),
                    Err(notify_err) => error!(
                        error = %notify_err,
                        topic = self.notifier.topic(),
                        "failed to publish rejected batch"
                    ),
                }
            }
            return Err(e.into());
        }

        Ok(RunOutcome::Ingested(RunReport {
            fetched: entries.len(),
            converted: rows.len(),
            conversion_failures: failures.len(),
            published,
            inserted: rows.len(),
        }))
    }
}

/// Converts every entry on its own. A failed entry is logged, recorded and
/// left out of the rows; it never stops the rest of the batch.
fn convert_batch(entries: &[Value]) -> (Vec<WarehouseRow>, Vec<ConversionFailure>) {
    let mut rows = Vec::with_capacity(entries.len());
    let mut failures = Vec::new();

    for (index, raw) in entries.iter().enumerate() {
        match convert_raw(raw) {
            Ok(row) => rows.push(row),
            Err(e) => {
                metrics::counter!(CONVERSION_FAILURES).increment(1);
                warn!(index, error = %e, "failed to convert log entry");
                failures.push(ConversionFailure::new(raw, &e));
            }
        }

        let seen = index + 1;
        if seen % PROGRESS_INTERVAL == 0 {
            debug!(seen, total = entries.len(), "converting log entries");
        }
    }

    (rows, failures)
}
