//! In-process broker used for dry runs and tests.

use crate::error::{ProducerError, Result};
use crate::publisher::{
    begin_send, finish_send, Connector, DeliveryReceipt, Publisher, PublisherState,
};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// A message accepted by the [`MemoryBroker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
}

#[derive(Debug, Default)]
struct BrokerLog {
    delivered: Vec<DeliveredMessage>,
    offsets: HashMap<(String, i32), i64>,
    failing_topics: HashSet<String>,
    fail_next: usize,
    refuse_connections: bool,
    connections: usize,
    closed: usize,
}

/// Records every delivery in memory. Cloning shares the same log.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    partitions: i32,
    log: Arc<Mutex<BrokerLog>>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(1)
    }
}

impl MemoryBroker {
    pub fn new(partitions: i32) -> Self {
        Self {
            partitions: partitions.max(1),
            log: Arc::new(Mutex::new(BrokerLog::default())),
        }
    }

    fn log(&self) -> MutexGuard<'_, BrokerLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reject every delivery to `topic` until [`heal_topic`](Self::heal_topic).
    pub fn fail_topic(&self, topic: &str) {
        self.log().failing_topics.insert(topic.to_string());
    }

    pub fn heal_topic(&self, topic: &str) {
        self.log().failing_topics.remove(topic);
    }

    /// Reject the next `count` deliveries regardless of topic.
    pub fn fail_next(&self, count: usize) {
        self.log().fail_next = count;
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.log().refuse_connections = refuse;
    }

    pub fn delivered(&self) -> Vec<DeliveredMessage> {
        self.log().delivered.clone()
    }

    pub fn delivered_to(&self, topic: &str) -> Vec<DeliveredMessage> {
        self.log()
            .delivered
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Number of publishers opened so far.
    pub fn connections(&self) -> usize {
        self.log().connections
    }

    /// Number of publishers closed so far.
    pub fn closed(&self) -> usize {
        self.log().closed
    }

    fn partition_for(&self, key: &str) -> i32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions as u64) as i32
    }

    fn accept(&self, topic: &str, key: &str, payload: &[u8]) -> Result<DeliveryReceipt> {
        let partition = self.partition_for(key);
        let mut log = self.log();

        if log.fail_next > 0 {
            log.fail_next -= 1;
            return Err(ProducerError::Delivery {
                topic: topic.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        if log.failing_topics.contains(topic) {
            return Err(ProducerError::Delivery {
                topic: topic.to_string(),
                reason: "topic unavailable".to_string(),
            });
        }

        let next = log
            .offsets
            .entry((topic.to_string(), partition))
            .or_insert(0);
        let offset = *next;
        *next += 1;

        log.delivered.push(DeliveredMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_vec(),
            partition,
            offset,
        });
        Ok(DeliveryReceipt { partition, offset })
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self) -> Result<Box<dyn Publisher>> {
        let mut log = self.log();
        if log.refuse_connections {
            return Err(ProducerError::ConnectionFailed(
                "memory broker refused the connection".to_string(),
            ));
        }
        log.connections += 1;
        debug!("Opened in-memory publisher #{}", log.connections);

        Ok(Box::new(MemoryPublisher {
            broker: self.clone(),
            state: PublisherState::Ready,
        }))
    }
}

pub struct MemoryPublisher {
    broker: MemoryBroker,
    state: PublisherState,
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(
        &mut self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<DeliveryReceipt> {
        begin_send(&mut self.state, topic)?;
        let outcome = self.broker.accept(topic, key, payload);
        finish_send(&mut self.state, &outcome);
        outcome
    }

    fn state(&self) -> PublisherState {
        self.state
    }

    async fn close(&mut self) -> Result<()> {
        self.broker.log().closed += 1;
        Ok(())
    }
}
