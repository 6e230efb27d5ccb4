//! Command-line configuration.

use clap::Parser;
use fixture_kafka_producer::testdata::{DEFAULT_ORDER_TOPIC, DEFAULT_USER_TOPIC};
use fixture_kafka_producer::{CadenceConfig, SampleTopics};
use std::path::PathBuf;
use std::time::Duration;

pub mod duration;

use duration::{parse_duration, parse_nonzero_duration};

/// Where the descriptor set comes from and how strictly it is resolved.
#[derive(Parser, Debug, Clone)]
pub struct SchemaArgs {
    /// Serialized FileDescriptorSet (protoc --descriptor_set_out)
    #[arg(
        long,
        env = "DESCRIPTOR_FILE",
        default_value = "/descriptors/test_descriptors.desc"
    )]
    pub descriptor_file: PathBuf,

    /// Abort when any file's dependencies cannot be resolved
    #[arg(long)]
    pub strict: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct ProduceArgs {
    /// Kafka bootstrap servers
    #[arg(long, env = "KAFKA_BROKERS", default_value = "localhost:9092")]
    pub brokers: String,

    #[command(flatten)]
    pub schema: SchemaArgs,

    /// Period between representative messages after the initial burst
    #[arg(long, default_value = "30s", value_parser = parse_nonzero_duration)]
    pub interval: Duration,

    /// Pause between messages of the initial burst
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    pub burst_spacing: Duration,

    /// Wait before the first connection, giving the broker time to start
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub startup_delay: Duration,

    /// Upper bound for a single delivery
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub publish_timeout: Duration,

    #[arg(long, default_value = DEFAULT_USER_TOPIC)]
    pub user_topic: String,

    #[arg(long, default_value = DEFAULT_ORDER_TOPIC)]
    pub order_topic: String,

    /// Number of User samples in the burst
    #[arg(long, default_value_t = 5)]
    pub user_count: u32,

    /// Number of Order samples in the burst
    #[arg(long, default_value_t = 3)]
    pub order_count: u32,

    /// Create both topics before publishing
    #[arg(long)]
    pub create_topics: bool,

    /// Partitions for created topics
    #[arg(long, default_value_t = 3)]
    pub partitions: i32,

    /// Publish to an in-memory broker instead of Kafka
    #[arg(long)]
    pub dry_run: bool,
}

impl ProduceArgs {
    pub fn topics(&self) -> SampleTopics {
        SampleTopics {
            user_topic: self.user_topic.clone(),
            order_topic: self.order_topic.clone(),
        }
    }

    pub fn cadence(&self) -> CadenceConfig {
        CadenceConfig {
            interval: self.interval,
            burst_spacing: self.burst_spacing,
        }
    }
}
