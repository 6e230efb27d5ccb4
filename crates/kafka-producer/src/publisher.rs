//! Broker-facing publish capability.
//!
//! A [`Connector`] opens one [`Publisher`] per connection. Each publisher
//! tracks its connection state:
//!
//! ```text
//! Connecting -> Ready -> Sending -> Ready
//!                                -> Failed (terminal)
//! ```
//!
//! A failed publisher rejects further sends; the caller opens a new one.

use crate::error::{ProducerError, Result};
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::{debug, info};

/// Where a message landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub partition: i32,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    Connecting,
    Ready,
    Sending,
    Failed,
}

/// One open connection to a broker.
#[async_trait]
pub trait Publisher: Send {
    /// Deliver one message, at most once.
    async fn publish(&mut self, topic: &str, key: &str, payload: &[u8])
        -> Result<DeliveryReceipt>;

    fn state(&self) -> PublisherState;

    /// Flush outstanding messages and release the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Opens publishers.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Publisher>>;
}

/// Move a publisher into `Sending`, rejecting anything but `Ready`.
pub(crate) fn begin_send(state: &mut PublisherState, topic: &str) -> Result<()> {
    match *state {
        PublisherState::Ready => {
            *state = PublisherState::Sending;
            Ok(())
        }
        other => Err(ProducerError::Delivery {
            topic: topic.to_string(),
            reason: format!("publisher is {other:?}"),
        }),
    }
}

/// Settle a send: `Ready` on success, `Failed` otherwise.
pub(crate) fn finish_send<T>(state: &mut PublisherState, outcome: &Result<T>) {
    *state = if outcome.is_ok() {
        PublisherState::Ready
    } else {
        PublisherState::Failed
    };
}

/// Opens rdkafka producers against a broker list.
#[derive(Debug, Clone)]
pub struct KafkaConnector {
    brokers: String,
    publish_timeout: Duration,
}

impl KafkaConnector {
    /// # Arguments
    ///
    /// * `brokers` - Kafka broker addresses (e.g., "localhost:9092")
    /// * `publish_timeout` - Upper bound for a single delivery
    pub fn new(brokers: &str, publish_timeout: Duration) -> Self {
        Self {
            brokers: brokers.to_string(),
            publish_timeout,
        }
    }

    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Create Kafka topic if it doesn't exist
    pub async fn create_topic_if_not_exists(&self, topic: &str, partitions: i32) -> Result<()> {
        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()?;

        let new_topic = NewTopic::new(topic, partitions, TopicReplication::Fixed(1));
        let opts = AdminOptions::new().operation_timeout(Some(Duration::from_secs(10)));

        let results = admin_client
            .create_topics(&[new_topic], &opts)
            .await
            .map_err(|e| ProducerError::TopicCreation(format!("Failed to create topic: {e}")))?;

        for result in results {
            match result {
                Ok(topic_name) => {
                    info!("Topic '{}' created successfully", topic_name);
                }
                Err((topic_name, err)) => {
                    let err_str = err.to_string();
                    if err_str.contains("already exists")
                        || err_str.contains("TopicExistsException")
                    {
                        info!("Topic '{}' already exists", topic_name);
                    } else {
                        return Err(ProducerError::TopicCreation(format!(
                            "Failed to create topic {topic_name}: {err}"
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Connector for KafkaConnector {
    async fn connect(&self) -> Result<Box<dyn Publisher>> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set(
                "message.timeout.ms",
                self.publish_timeout.as_millis().to_string(),
            )
            .create()
            .map_err(|e| ProducerError::ConnectionFailed(format!("{}: {e}", self.brokers)))?;
        debug!("Connected producer to {}", self.brokers);

        Ok(Box::new(KafkaPublisher {
            producer,
            timeout: self.publish_timeout,
            state: PublisherState::Ready,
        }))
    }
}

/// A `FutureProducer` wrapped in the publisher state machine.
pub struct KafkaPublisher {
    producer: FutureProducer,
    timeout: Duration,
    state: PublisherState,
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(
        &mut self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<DeliveryReceipt> {
        begin_send(&mut self.state, topic)?;

        let record = FutureRecord::to(topic).key(key).payload(payload);
        let delivery = self.producer.send(record, self.timeout);
        let outcome = match tokio::time::timeout(self.timeout, delivery).await {
            Ok(Ok((partition, offset))) => Ok(DeliveryReceipt { partition, offset }),
            Ok(Err((err, _))) => Err(ProducerError::Delivery {
                topic: topic.to_string(),
                reason: err.to_string(),
            }),
            Err(_) => Err(ProducerError::Delivery {
                topic: topic.to_string(),
                reason: format!("timed out after {:?}", self.timeout),
            }),
        };

        finish_send(&mut self.state, &outcome);
        outcome
    }

    fn state(&self) -> PublisherState {
        self.state
    }

    async fn close(&mut self) -> Result<()> {
        let producer = self.producer.clone();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| ProducerError::ConnectionFailed(format!("Flush task failed: {e}")))??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_transitions() {
        let mut state = PublisherState::Ready;
        begin_send(&mut state, "t").unwrap();
        assert_eq!(state, PublisherState::Sending);

        finish_send(&mut state, &Ok::<_, ProducerError>(()));
        assert_eq!(state, PublisherState::Ready);

        begin_send(&mut state, "t").unwrap();
        let failed: Result<()> = Err(ProducerError::Delivery {
            topic: "t".to_string(),
            reason: "broker down".to_string(),
        });
        finish_send(&mut state, &failed);
        assert_eq!(state, PublisherState::Failed);

        // Failed is terminal
        assert!(begin_send(&mut state, "t").is_err());
        assert_eq!(state, PublisherState::Failed);
    }

    #[test]
    fn test_connecting_rejects_sends() {
        let mut state = PublisherState::Connecting;
        assert!(matches!(
            begin_send(&mut state, "user-events"),
            Err(ProducerError::Delivery { .. })
        ));
    }

    #[tokio::test]
    async fn test_kafka_connector_opens_ready_publisher() {
        // Producer creation does not contact the broker
        let connector = KafkaConnector::new("localhost:9092", Duration::from_millis(500));
        let publisher = connector.connect().await.unwrap();
        assert_eq!(publisher.state(), PublisherState::Ready);
        assert_eq!(connector.brokers(), "localhost:9092");
    }
}
