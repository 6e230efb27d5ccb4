//! Burst-then-periodic publishing of a sample corpus.
//!
//! The whole corpus is delivered once over a single connection. After that,
//! every `interval` a fresh connection is opened, the first and the last
//! sample are sent again, and the connection is closed. Connections are
//! closed even when a send fails.
//!
//! A failed burst aborts the run. A failed periodic cycle is logged and
//! dropped; the next tick retries with a new connection. A zero interval is
//! rejected before anything is sent.

use crate::error::{ProducerError, Result};
use crate::publisher::{Connector, DeliveryReceipt, Publisher};
use crate::testdata::Sample;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_BURST_SPACING: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadenceConfig {
    /// Period between cycles after the burst
    pub interval: Duration,
    /// Pause between consecutive messages of the burst
    pub burst_spacing: Duration,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            burst_spacing: DEFAULT_BURST_SPACING,
        }
    }
}

/// Outcome of [`PublishLoop::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub burst_delivered: usize,
    pub cycles: usize,
    pub failed_cycles: usize,
}

/// Key for a message sent now: `key-{unix seconds}`.
pub fn message_key() -> String {
    format!("key-{}", Utc::now().timestamp())
}

pub struct PublishLoop {
    connector: Arc<dyn Connector>,
    samples: Vec<Sample>,
    config: CadenceConfig,
}

impl PublishLoop {
    pub fn new(connector: Arc<dyn Connector>, samples: Vec<Sample>, config: CadenceConfig) -> Self {
        Self {
            connector,
            samples,
            config,
        }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// The first and the last sample of the corpus: with the default corpus,
    /// the first user and the last order.
    pub fn representatives(&self) -> Vec<&Sample> {
        match self.samples.as_slice() {
            [] => Vec::new(),
            [only] => vec![only],
            [first, .., last] => vec![first, last],
        }
    }

    /// Deliver the whole corpus over one connection.
    pub async fn run_burst(&self) -> Result<Vec<DeliveryReceipt>> {
        info!("Producing {} messages", self.samples.len());
        let receipts = self
            .deliver(self.samples.iter().collect(), self.config.burst_spacing)
            .await?;
        info!("All {} messages sent successfully", receipts.len());
        Ok(receipts)
    }

    /// Open a connection, send the representatives, close it.
    pub async fn run_cycle(&self) -> Result<Vec<DeliveryReceipt>> {
        self.deliver(self.representatives(), Duration::ZERO).await
    }

    /// Send `samples` in order over a fresh connection, which is closed
    /// afterwards whether or not every send succeeded.
    async fn deliver(
        &self,
        samples: Vec<&Sample>,
        spacing: Duration,
    ) -> Result<Vec<DeliveryReceipt>> {
        let mut publisher = self.connector.connect().await?;
        let mut receipts = Vec::with_capacity(samples.len());
        let mut failure = None;

        for (i, sample) in samples.into_iter().enumerate() {
            if i > 0 && !spacing.is_zero() {
                tokio::time::sleep(spacing).await;
            }
            match send(publisher.as_mut(), sample).await {
                Ok(receipt) => receipts.push(receipt),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        let closed = publisher.close().await;
        match failure {
            Some(e) => {
                if let Err(close_err) = closed {
                    warn!(
                        "Failed to close publisher after a failed send: {}",
                        close_err
                    );
                }
                Err(e)
            }
            None => closed.map(|()| receipts),
        }
    }

    /// Run the burst, then cycles every `interval` until `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) -> Result<LoopSummary> {
        if self.config.interval.is_zero() {
            return Err(ProducerError::InvalidConfig(
                "publish interval must be greater than zero".to_string(),
            ));
        }
        let mut summary = LoopSummary::default();

        tokio::select! {
            burst = self.run_burst() => summary.burst_delivered = burst?.len(),
            _ = token.cancelled() => {
                info!("Cancelled during burst");
                return Ok(summary);
            }
        }

        info!(
            "Continuing to produce messages every {:?}",
            self.config.interval
        );
        let mut ticker = interval_at(
            Instant::now() + self.config.interval,
            self.config.interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = token.cancelled() => break,
            }

            summary.cycles += 1;
            match self.run_cycle().await {
                Ok(receipts) => {
                    debug!("Cycle {} sent {} messages", summary.cycles, receipts.len())
                }
                Err(e) => {
                    summary.failed_cycles += 1;
                    warn!(
                        "Cycle {} failed, retrying next interval: {}",
                        summary.cycles, e
                    );
                }
            }
        }

        info!(
            "Publish loop stopped after {} cycles ({} failed)",
            summary.cycles, summary.failed_cycles
        );
        Ok(summary)
    }
}

async fn send(publisher: &mut dyn Publisher, sample: &Sample) -> Result<DeliveryReceipt> {
    let key = message_key();
    let receipt = publisher.publish(&sample.topic, &key, &sample.payload).await?;
    info!(
        "Sent {} to {} (partition={}, offset={})",
        sample.description, sample.topic, receipt.partition, receipt.offset
    );
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;
    use crate::testdata::{SampleBuilder, SampleTopics};
    use proto_schema::{load, testing, MessageFactory, SchemaGraph};

    fn corpus(users: u32, orders: u32) -> Vec<Sample> {
        let bytes = testing::fixture_descriptor_set().unwrap();
        let graph = SchemaGraph::resolve(load(&bytes).unwrap());
        SampleBuilder::new(MessageFactory::new(Arc::new(graph)))
            .unwrap()
            .corpus(users, orders, &SampleTopics::default())
            .unwrap()
    }

    fn publish_loop(broker: &MemoryBroker, config: CadenceConfig) -> PublishLoop {
        PublishLoop::new(Arc::new(broker.clone()), corpus(5, 3), config)
    }

    fn no_spacing() -> CadenceConfig {
        CadenceConfig {
            interval: Duration::from_secs(30),
            burst_spacing: Duration::ZERO,
        }
    }

    #[test]
    fn test_message_key_format() {
        let key = message_key();
        let seconds = key.strip_prefix("key-").unwrap();
        assert!(seconds.parse::<i64>().unwrap() > 1_600_000_000);
    }

    #[test]
    fn test_representatives_are_first_and_last_sample() {
        let publish_loop = publish_loop(&MemoryBroker::default(), no_spacing());
        let reps: Vec<_> = publish_loop
            .representatives()
            .into_iter()
            .map(|s| (s.topic.as_str(), s.description.as_str()))
            .collect();
        assert_eq!(
            reps,
            vec![("user-events", "User 0"), ("order-events", "Order 2")]
        );

        let single = PublishLoop::new(
            Arc::new(MemoryBroker::default()),
            corpus(1, 0),
            no_spacing(),
        );
        assert_eq!(single.representatives().len(), 1);
        let empty = PublishLoop::new(
            Arc::new(MemoryBroker::default()),
            Vec::new(),
            no_spacing(),
        );
        assert!(empty.representatives().is_empty());
    }

    #[tokio::test]
    async fn test_burst_delivers_whole_corpus_in_order() {
        let broker = MemoryBroker::new(3);
        let publish_loop = publish_loop(&broker, no_spacing());

        let receipts = publish_loop.run_burst().await.unwrap();
        assert_eq!(receipts.len(), 8);
        assert!(receipts.iter().all(|r| r.partition >= 0 && r.offset >= 0));

        let delivered = broker.delivered();
        let topics: Vec<_> = delivered.iter().map(|m| m.topic.as_str()).collect();
        assert_eq!(&topics[..5], &["user-events"; 5]);
        assert_eq!(&topics[5..], &["order-events"; 3]);
        for (message, sample) in delivered.iter().zip(publish_loop.samples()) {
            assert_eq!(message.payload, sample.payload);
            assert!(message.key.starts_with("key-"));
        }
        assert_eq!((broker.connections(), broker.closed()), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_spacing_between_messages() {
        let broker = MemoryBroker::default();
        let publish_loop = publish_loop(&broker, CadenceConfig::default());

        let start = Instant::now();
        publish_loop.run_burst().await.unwrap();
        // Eight messages, seven gaps
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(7) && elapsed < Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_burst_failure_is_fatal() {
        let broker = MemoryBroker::default();
        broker.fail_topic("order-events");
        let publish_loop = publish_loop(&broker, no_spacing());

        let result = publish_loop.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(ProducerError::Delivery { .. })));
        assert_eq!(broker.delivered().len(), 5);
        assert_eq!((broker.connections(), broker.closed()), (1, 1));
    }

    #[tokio::test]
    async fn test_cycle_failure_then_fresh_connection() {
        let broker = MemoryBroker::default();
        let publish_loop = publish_loop(&broker, no_spacing());

        broker.fail_topic("order-events");
        assert!(publish_loop.run_cycle().await.is_err());
        assert_eq!(broker.delivered_to("user-events").len(), 1);

        broker.heal_topic("order-events");
        let receipts = publish_loop.run_cycle().await.unwrap();
        assert_eq!(receipts.len(), 2);
        assert_eq!(broker.connections(), 2);
        // The failed cycle closed its connection as well
        assert_eq!(broker.closed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_cancelled() {
        let broker = MemoryBroker::default();
        let publish_loop = publish_loop(&broker, no_spacing());
        let token = CancellationToken::new();

        let control = {
            let broker = broker.clone();
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(45)).await;
                broker.fail_topic("order-events");
                tokio::time::sleep(Duration::from_secs(30)).await;
                broker.heal_topic("order-events");
                tokio::time::sleep(Duration::from_secs(20)).await;
                token.cancel();
            })
        };

        // Cycles fire at 30s, 60s (fails) and 90s; cancelled at 95s
        let summary = publish_loop.run(token).await.unwrap();
        control.await.unwrap();

        assert_eq!(
            summary,
            LoopSummary {
                burst_delivered: 8,
                cycles: 3,
                failed_cycles: 1,
            }
        );
        assert_eq!(broker.connections(), 4);
        // Burst, cycle 1, the user half of cycle 2, cycle 3
        assert_eq!(broker.delivered().len(), 8 + 2 + 1 + 2);
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let broker = MemoryBroker::default();
        let config = CadenceConfig {
            interval: Duration::ZERO,
            burst_spacing: Duration::ZERO,
        };
        let publish_loop = publish_loop(&broker, config);

        let result = publish_loop.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(ProducerError::InvalidConfig(_))));
        assert!(broker.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let broker = MemoryBroker::default();
        let publish_loop = publish_loop(&broker, CadenceConfig::default());
        let token = CancellationToken::new();
        token.cancel();

        let summary = publish_loop.run(token).await.unwrap();
        assert_eq!(summary.cycles, 0);
    }
}
