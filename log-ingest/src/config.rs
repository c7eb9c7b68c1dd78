use chrono::{DateTime, Utc};
use envconfig::Envconfig;

use crate::error::ConfigError;
use crate::fetch::TimeRange;
use crate::notify::NotifyMode;

/// Producer settings for the error topic. Every field reads the variable of
/// the same name, upper-cased.
#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    /// One of none, gzip, snappy, lz4, zstd.
    #[envconfig(default = "none")]
    pub kafka_compression_codec: String,

    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32,

    #[envconfig(default = "400")]
    pub kafka_producer_queue_mib: u32,

    #[envconfig(default = "10000000")]
    pub kafka_producer_queue_messages: u32,

    /// Delivery deadline for a single message, retries included.
    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32,

    /// How long a publish waits for room in a full producer queue.
    #[envconfig(default = "30000")]
    pub kafka_publish_timeout_ms: u64,

    /// Deadline for the broker ping at startup and each topic lookup.
    #[envconfig(default = "15000")]
    pub kafka_metadata_timeout_ms: u64,
}

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3310")]
    pub port: u16,

    #[envconfig(from = "GCP_PROJECT_ID")]
    pub project_id: String,

    #[envconfig(from = "LOGGING_API_URL", default = "https://logging.googleapis.com")]
    pub logging_api_url: String,

    #[envconfig(from = "LOGGING_API_TOKEN", default = "")]
    pub logging_api_token: String,

    #[envconfig(from = "LOGGING_PAGE_SIZE", default = "1000")]
    pub logging_page_size: u32,

    #[envconfig(from = "LOGGING_REQUEST_TIMEOUT_SECS", default = "30")]
    pub logging_request_timeout_secs: u64,

    #[envconfig(from = "SERVICES")]
    pub services: String,

    #[envconfig(from = "START_DATE", default = "2023-01-01T00:00:00Z")]
    pub start_date: String,

    #[envconfig(from = "END_DATE", default = "2023-12-31T23:59:59Z")]
    pub end_date: String,

    #[envconfig(from = "CLICKHOUSE_URL", default = "http://localhost:8123")]
    pub clickhouse_url: String,

    #[envconfig(from = "CLICKHOUSE_USER", default = "default")]
    pub clickhouse_user: String,

    #[envconfig(from = "CLICKHOUSE_PASSWORD", default = "")]
    pub clickhouse_password: String,

    #[envconfig(from = "WAREHOUSE_DATASET_ID")]
    pub dataset_id: String,

    #[envconfig(from = "WAREHOUSE_TABLE_ID")]
    pub table_id: String,

    #[envconfig(from = "WAREHOUSE_CREATE_TABLE", default = "false")]
    pub create_table: bool,

    #[envconfig(from = "ERROR_TOPIC_ID", default = "log_ingest_errors")]
    pub error_topic_id: String,

    #[envconfig(from = "NOTIFY_MODE", default = "all")]
    pub notify_mode: String,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,
}

impl Config {
    /// Reads the environment and validates the result.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::init_from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("GCP_PROJECT_ID", &self.project_id),
            ("WAREHOUSE_DATASET_ID", &self.dataset_id),
            ("WAREHOUSE_TABLE_ID", &self.table_id),
            ("ERROR_TOPIC_ID", &self.error_topic_id),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingParameter(name));
            }
        }

        if self.services().is_empty() {
            return Err(ConfigError::MissingParameter("SERVICES"));
        }

        self.time_range()?;
        self.notify_mode()?;

        Ok(())
    }

    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The comma separated service list, trimmed, with blanks dropped.
    pub fn services(&self) -> Vec<String> {
        self.services
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn time_range(&self) -> Result<TimeRange, ConfigError> {
        let start = parse_date("START_DATE", &self.start_date)?;
        let end = parse_date("END_DATE", &self.end_date)?;

        TimeRange::new(start, end).ok_or_else(|| ConfigError::InvalidValue {
            name: "START_DATE",
            reason: format!("{start} is after END_DATE {end}"),
        })
    }

    pub fn notify_mode(&self) -> Result<NotifyMode, ConfigError> {
        self.notify_mode
            .parse()
            .map_err(|reason| ConfigError::InvalidValue {
                name: "NOTIFY_MODE",
                reason,
            })
    }

    pub fn logging_token(&self) -> Option<String> {
        Some(self.logging_api_token.clone()).filter(|t| !t.is_empty())
    }

    /// Zero leaves the page size to the backend.
    pub fn page_size(&self) -> Option<u32> {
        (self.logging_page_size > 0).then_some(self.logging_page_size)
    }
}

fn parse_date(name: &'static str, value: &str) -> Result<DateTime<Utc>, ConfigError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| ConfigError::InvalidValue {
            name,
            reason: format!("{value:?} is not an RFC 3339 timestamp: {e}"),
        })
}
