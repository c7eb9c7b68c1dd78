pub const RUNS_TOTAL: &str = "log_ingest_runs_total";
pub const RUN_DURATION: &str = "log_ingest_run_duration_seconds";
pub const ENTRIES_FETCHED: &str = "log_ingest_entries_fetched_total";
pub const CONVERSION_FAILURES: &str = "log_ingest_conversion_failures_total";
pub const ROWS_INSERTED: &str = "log_ingest_rows_inserted_total";
pub const MESSAGES_PUBLISHED: &str = "log_ingest_messages_published_total";
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUESTS_DURATION: &str = "http_requests_duration_seconds";
