//! Fixture publishing for Kafka
//!
//! This library builds sample messages from a runtime protobuf schema and
//! publishes them to Kafka topics.
//!
//! ## Features
//!
//! - **Sample synthesis**: deterministic `User` and `Order` messages built from descriptors
//! - **Kafka producer**: a publish capability with a per-connection state machine
//! - **Cadence**: an initial burst followed by periodic representative messages
//! - **Topic management**: creating topics before publishing
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fixture_kafka_producer::{
//!     CadenceConfig, KafkaConnector, PublishLoop, SampleBuilder, SampleTopics,
//! };
//! use proto_schema::{load_file, MessageFactory, SchemaGraph};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let graph = SchemaGraph::resolve(load_file("/descriptors/test_descriptors.desc")?);
//!     let builder = SampleBuilder::new(MessageFactory::new(Arc::new(graph)))?;
//!     let samples = builder.corpus(5, 3, &SampleTopics::default())?;
//!
//!     let connector = KafkaConnector::new("localhost:9092", Duration::from_secs(10));
//!     connector.create_topic_if_not_exists("user-events", 3).await?;
//!
//!     let publish_loop = PublishLoop::new(Arc::new(connector), samples, CadenceConfig::default());
//!     publish_loop.run(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod cadence;
pub mod error;
pub mod memory;
pub mod publisher;

// Sample data synthesis module
pub mod testdata;

pub use cadence::{message_key, CadenceConfig, LoopSummary, PublishLoop};
pub use error::{ProducerError, Result};
pub use memory::{DeliveredMessage, MemoryBroker};
pub use publisher::{Connector, DeliveryReceipt, KafkaConnector, Publisher, PublisherState};
pub use testdata::{Sample, SampleBuilder, SampleTopics};
