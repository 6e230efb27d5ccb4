//! proto-fixtures library
//!
//! Publishes protobuf test fixtures to Kafka without generated code. The
//! message types come from a serialized `FileDescriptorSet` read at runtime.
//!
//! # Crates
//!
//! - `proto_schema` - descriptor-set loading, dependency resolution, dynamic messages
//! - `fixture_kafka_producer` - sample synthesis, publishers and the publish cadence
//!
//! # CLI Usage
//!
//! ```bash
//! # Show which files resolve and the message types they declare
//! proto-fixtures describe --descriptor-file /descriptors/test_descriptors.desc
//!
//! # Publish the sample corpus, then one message per topic every 30 seconds
//! proto-fixtures produce --brokers localhost:9092 --create-topics
//!
//! # Same, against an in-memory broker
//! proto-fixtures produce --dry-run --startup-delay 0
//! ```

pub mod config;
pub mod describe;
pub mod produce;

pub use config::{ProduceArgs, SchemaArgs};
pub use describe::describe;
pub use produce::{load_factory, load_graph, run_produce, run_produce_with};
