//! Runtime protobuf schemas loaded from descriptor-set snapshots.
//!
//! Features:
//!
//! - Snapshot loading: read a serialized `FileDescriptorSet` without code generation
//! - Dependency resolution: link files by their imports, reporting missing or cyclic ones
//! - Dynamic messages: look up message types by name and build instances at runtime
//! - Wire codec and proto3 JSON rendering for dynamic messages

/// Flattening a descriptor set into per-file records
pub mod store;

/// Fixed-point linking of file records into a schema graph
pub mod resolver;

/// Message type lookup and blank instance construction
///
/// Bare type names resolve first-match-wins across files in resolution order.
pub mod factory;

pub mod codec;
pub mod descriptor;
pub mod error;
pub mod json;
pub mod message;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use descriptor::{EnumDescriptor, FieldDescriptor, MessageDescriptor, ProtoType};
pub use error::{Error, Result};
pub use factory::MessageFactory;
pub use message::{DynamicMessage, ProtoFieldValue};
pub use resolver::{ResolvedFile, SchemaGraph};
pub use store::{load, load_file, FileDescriptorRecord};
