use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use tokio::task::spawn_blocking;
use tracing::{debug, error, info};

use super::{BusError, MessageBus};
use crate::config::KafkaConfig;
use crate::error::StartupError;

pub struct KafkaMessageBus {
    producer: FutureProducer,
    publish_timeout: Duration,
    metadata_timeout: Duration,
}

impl KafkaMessageBus {
    /// Builds the producer and pings the brokers so that a bad broker list
    /// fails at startup.
    pub fn new(config: &KafkaConfig) -> Result<Self, StartupError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("linger.ms", config.kafka_producer_linger_ms.to_string())
            .set(
                "message.timeout.ms",
                config.kafka_message_timeout_ms.to_string(),
            )
            .set(
                "compression.codec",
                config.kafka_compression_codec.to_owned(),
            )
            .set(
                "queue.buffering.max.kbytes",
                (config.kafka_producer_queue_mib * 1024).to_string(),
            )
            .set(
                "queue.buffering.max.messages",
                config.kafka_producer_queue_messages.to_string(),
            );

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        debug!("rdkafka configuration: {:?}", client_config);
        let producer: FutureProducer =
            client_config
                .create()
                .map_err(|e| StartupError::ClientConstruction {
                    client: "kafka",
                    reason: e.to_string(),
                })?;

        let metadata_timeout = Duration::from_millis(config.kafka_metadata_timeout_ms);

        // A broker list nobody answers on fails here rather than on first publish.
        match producer.client().fetch_metadata(None, metadata_timeout) {
            Ok(metadata) => {
                info!(
                    topics = metadata.topics().len(),
                    "connected to kafka brokers"
                );
            }
            Err(e) => {
                error!(error = %e, hosts = %config.kafka_hosts, "kafka brokers did not answer");
                return Err(StartupError::ClientConstruction {
                    client: "kafka",
                    reason: e.to_string(),
                });
            }
        }

        Ok(Self {
            producer,
            publish_timeout: Duration::from_millis(config.kafka_publish_timeout_ms),
            metadata_timeout,
        })
    }
}

/// Blocks the calling thread for up to `timeout` while librdkafka answers.
fn topic_status(
    producer: &FutureProducer,
    topic: &str,
    timeout: Duration,
) -> Result<(), BusError> {
    let metadata = producer.client().fetch_metadata(Some(topic), timeout)?;

    match metadata.topics().iter().find(|t| t.name() == topic) {
        Some(found) => match found.error() {
            Some(err) => Err(BusError::UnknownTopic {
                topic: topic.to_string(),
                reason: format!("{err:?}"),
            }),
            None => Ok(()),
        },
        None => Err(BusError::UnknownTopic {
            topic: topic.to_string(),
            reason: "not present in broker metadata".to_string(),
        }),
    }
}

fn headers(attributes: &BTreeMap<String, String>) -> OwnedHeaders {
    attributes
        .iter()
        .fold(OwnedHeaders::new(), |headers, (key, value)| {
            headers.insert(Header {
                key,
                value: Some(value.as_bytes()),
            })
        })
}

#[async_trait]
impl MessageBus for KafkaMessageBus {
    async fn resolve_topic(&self, topic: &str) -> Result<(), BusError> {
        let producer = self.producer.clone();
        let topic = topic.to_string();
        let timeout = self.metadata_timeout;

        spawn_blocking(move || topic_status(&producer, &topic, timeout)).await?
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        attributes: &BTreeMap<String, String>,
    ) -> Result<String, BusError> {
        let record = FutureRecord::<(), _>::to(topic)
            .payload(&payload)
            .headers(headers(attributes));

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.publish_timeout))
            .await
            .map_err(|(e, _)| BusError::Kafka(e))?;

        Ok(format!("{partition}:{offset}"))
    }
}
