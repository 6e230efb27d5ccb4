//! Error types for the proto-schema crate.

use thiserror::Error;

/// Errors that can occur while loading, resolving, building or encoding messages.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Descriptor set parse error: {0}")]
    Parse(String),

    #[error("Unresolved dependencies for: {}", .0.join(", "))]
    UnresolvedDependencies(Vec<String>),

    #[error("Message type not found: {0}")]
    TypeNotFound(String),

    #[error("Enum value not found: {enum_name}.{value}")]
    EnumValueNotFound { enum_name: String, value: String },

    #[error("Field not found: {field} in message {message}")]
    FieldNotFound { message: String, field: String },

    #[error("Invalid value for field '{field}': expected {expected}, got {actual}")]
    InvalidFieldValue {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Protobuf encoding error: {0}")]
    ProtobufEncode(String),

    #[error("Protobuf decoding error: {0}")]
    ProtobufDecode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for proto-schema operations.
pub type Result<T> = std::result::Result<T, Error>;
