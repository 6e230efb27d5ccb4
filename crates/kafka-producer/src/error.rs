//! Error types for sample synthesis and publishing.

use rdkafka::error::KafkaError;
use thiserror::Error;

/// Errors that can occur while building or delivering fixture messages.
#[derive(Error, Debug)]
pub enum ProducerError {
    #[error("Schema error: {0}")]
    Schema(#[from] proto_schema::Error),

    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    #[error("Delivery to '{topic}' failed: {reason}")]
    Delivery { topic: String, reason: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Topic creation error: {0}")]
    TopicCreation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Sample index {0} is out of range")]
    IndexOutOfRange(u32),
}

pub type Result<T> = std::result::Result<T, ProducerError>;
