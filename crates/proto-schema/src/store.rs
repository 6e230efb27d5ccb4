//! Descriptor set loading.
//!
//! A snapshot is a serialized `google.protobuf.FileDescriptorSet`, as
//! produced by `protoc --descriptor_set_out`. Loading flattens it into one
//! [`FileDescriptorRecord`] per schema file; linking happens in the resolver.

use crate::descriptor::FileTypes;
use crate::error::{Error, Result};
use protobuf::descriptor::{FileDescriptorProto, FileDescriptorSet};
use protobuf::Message;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// One schema file from the snapshot, not yet linked to its dependencies.
#[derive(Debug, Clone)]
pub struct FileDescriptorRecord {
    /// File name (e.g., "user.proto")
    pub name: String,
    /// Protobuf package, empty when the file declares none
    pub package: String,
    /// Names of the files this one imports, in declaration order
    pub dependencies: Vec<String>,
    /// Serialized `FileDescriptorProto` of this file
    pub raw: Vec<u8>,
    /// Message and enum types declared in this file
    pub types: FileTypes,
}

impl FileDescriptorRecord {
    /// Build a record from a parsed file descriptor.
    pub fn from_proto(proto: &FileDescriptorProto) -> Result<Self> {
        let name = proto
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::Parse("File descriptor without a name".to_string()))?;
        let package = proto.package.clone().unwrap_or_default();
        let raw = proto
            .write_to_bytes()
            .map_err(|e| Error::Parse(format!("Failed to re-encode {name}: {e}")))?;
        let types = FileTypes::build(&name, &package, &proto.message_type, &proto.enum_type)?;

        Ok(Self {
            name,
            package,
            dependencies: proto.dependency.clone(),
            raw,
            types,
        })
    }
}

/// Parse a serialized descriptor set into flat file records.
pub fn load(bytes: &[u8]) -> Result<Vec<FileDescriptorRecord>> {
    let set = FileDescriptorSet::parse_from_bytes(bytes)
        .map_err(|e| Error::Parse(format!("Invalid FileDescriptorSet: {e}")))?;

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(set.file.len());
    for file in &set.file {
        let record = FileDescriptorRecord::from_proto(file)?;
        if !seen.insert(record.name.clone()) {
            return Err(Error::Parse(format!(
                "Duplicate file in descriptor set: {}",
                record.name
            )));
        }
        debug!(
            "Loaded descriptor for {} (package '{}', {} dependencies)",
            record.name,
            record.package,
            record.dependencies.len()
        );
        records.push(record);
    }

    Ok(records)
}

/// Read and parse a descriptor set file.
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Vec<FileDescriptorRecord>> {
    let bytes = std::fs::read(path.as_ref())?;
    load(&bytes)
}
