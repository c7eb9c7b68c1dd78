mod kafka;

pub use kafka::KafkaMessageBus;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rdkafka::error::KafkaError;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::debug;

use crate::convert::ConversionFailure;
use crate::error::NotifyError;
use crate::metrics_consts::MESSAGES_PUBLISHED;
use crate::row::WarehouseRow;

pub const SERVICE_NAME_ATTRIBUTE: &str = "service_name";

#[derive(Error, Debug)]
pub enum BusError {
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),

    #[error("topic {topic} is not available: {reason}")]
    UnknownTopic { topic: String, reason: String },

    #[error("metadata lookup did not complete: {0}")]
    Lookup(#[from] JoinError),
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Fails when the topic does not exist or cannot be reached.
    async fn resolve_topic(&self, topic: &str) -> Result<(), BusError>;

    /// Publishes one message and waits for the broker to acknowledge it,
    /// returning the id the bus assigned to the message.
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        attributes: &BTreeMap<String, String>,
    ) -> Result<String, BusError>;
}

/// What is handed to the error topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NotifyMode {
    /// Every converted row is published before the insert.
    #[default]
    All,
    /// Entries that failed conversion are published before the insert, and a
    /// batch the warehouse rejects is published after it.
    Failures,
}

impl NotifyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyMode::All => "all",
            NotifyMode::Failures => "failures",
        }
    }
}

impl fmt::Display for NotifyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotifyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(NotifyMode::All),
            "failures" | "insert_failures" => Ok(NotifyMode::Failures),
            other => Err(format!(
                "unknown notify mode {other}, expected all or failures"
            )),
        }
    }
}

pub struct ErrorNotifier {
    bus: Arc<dyn MessageBus>,
    topic: String,
}

impl ErrorNotifier {
    pub fn new(bus: Arc<dyn MessageBus>, topic: &str) -> Self {
        Self {
            bus,
            topic: topic.to_string(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publishes each row in order, waiting for every acknowledgement before
    /// sending the next. Stops at the first failure; rows already acknowledged
    /// stay published.
    pub async fn notify(&self, rows: &[WarehouseRow]) -> Result<usize, NotifyError> {
        self.publish_each(rows, |row| &row.service_name).await
    }

    /// Same delivery rules as [`ErrorNotifier::notify`], for entries that never
    /// became rows.
    pub async fn notify_failures(
        &self,
        failures: &[ConversionFailure],
    ) -> Result<usize, NotifyError> {
        self.publish_each(failures, |failure| &failure.service_name)
            .await
    }

    async fn publish_each<T, F>(&self, items: &[T], service_name: F) -> Result<usize, NotifyError>
    where
        T: Serialize + Sync,
        F: Fn(&T) -> &String + Send,
    {
        if items.is_empty() {
            return Ok(0);
        }

        self.bus
            .resolve_topic(&self.topic)
            .await
            .map_err(|source| NotifyError::TopicResolution {
                topic: self.topic.clone(),
                source,
            })?;

        for item in items {
            let payload = serde_json::to_vec(item)?;
            let service = service_name(item);
            let attributes =
                BTreeMap::from([(SERVICE_NAME_ATTRIBUTE.to_string(), service.clone())]);

            let message_id = self
                .bus
                .publish(&self.topic, payload, &attributes)
                .await
                .map_err(|source| NotifyError::Publish {
                    topic: self.topic.clone(),
                    source,
                })?;

            metrics::counter!(MESSAGES_PUBLISHED).increment(1);
            debug!(
                topic = %self.topic,
                message_id = %message_id,
                service_name = %service,
                "published message"
            );
        }

        Ok(items.len())
    }
}
