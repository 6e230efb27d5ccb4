//! Test support: compile `.proto` sources into descriptor-set snapshots.
//!
//! Enabled for this crate's own tests and, through the `testing` feature,
//! for dependent crates.

use crate::descriptor::FileTypes;
use crate::error::{Error, Result};
use crate::store::FileDescriptorRecord;
use protobuf::descriptor::FileDescriptorSet;
use protobuf::Message;
use protobuf_parse::Parser;
use std::collections::HashSet;

/// User schema used by the sample corpus.
pub const USER_PROTO: &str = r#"
syntax = "proto3";

package fixtures.users;

enum UserType {
  USER_TYPE_UNSPECIFIED = 0;
  ADMIN = 1;
  REGULAR = 2;
}

message Address {
  string street = 1;
  string city = 2;
  string country = 3;
  int32 zip_code = 4;
}

message User {
  int32 id = 1;
  string name = 2;
  string email = 3;
  repeated string tags = 4;
  UserType type = 5;
  Address address = 6;
}
"#;

/// Order schema, importing [`USER_PROTO`] as `user.proto`.
pub const ORDER_PROTO: &str = r#"
syntax = "proto3";

package fixtures.orders;

import "user.proto";

enum OrderStatus {
  PENDING = 0;
  CONFIRMED = 1;
  SHIPPED = 2;
  DELIVERED = 3;
  CANCELLED = 4;
}

message OrderItem {
  string product_id = 1;
  string product_name = 2;
  int32 quantity = 3;
  double unit_price = 4;
}

message Order {
  int64 id = 1;
  fixtures.users.User user = 2;
  repeated OrderItem items = 3;
  double total_amount = 4;
  OrderStatus status = 5;
  int64 created_timestamp = 6;
}
"#;

/// Compile `(file name, source)` pairs into a serialized `FileDescriptorSet`.
///
/// All sources are written to one temporary directory so imports between
/// them resolve by file name. Files appear once each, dependencies first.
pub fn compile_descriptor_set(files: &[(&str, &str)]) -> Result<Vec<u8>> {
    let dir = tempfile::tempdir()?;
    let mut parser = Parser::new();
    parser.pure();
    parser.include(dir.path());

    for (name, source) in files {
        let path = dir.path().join(name);
        std::fs::write(&path, source)?;
        parser.input(&path);
    }

    let parsed = parser
        .parse_and_typecheck()
        .map_err(|e| Error::Parse(format!("Failed to compile test schema: {e}")))?;

    let mut seen = HashSet::new();
    let mut set = FileDescriptorSet::new();
    for file in parsed.file_descriptors {
        if seen.insert(file.name().to_string()) {
            set.file.push(file);
        }
    }

    set.write_to_bytes()
        .map_err(|e| Error::Parse(format!("Failed to serialize descriptor set: {e}")))
}

/// Snapshot containing `user.proto` and `order.proto`.
pub fn fixture_descriptor_set() -> Result<Vec<u8>> {
    compile_descriptor_set(&[("user.proto", USER_PROTO), ("order.proto", ORDER_PROTO)])
}

/// A bare record with the given imports and no declared types.
pub fn file_record(name: &str, package: &str, dependencies: &[&str]) -> FileDescriptorRecord {
    FileDescriptorRecord {
        name: name.to_string(),
        package: package.to_string(),
        dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        raw: Vec::new(),
        types: FileTypes::default(),
    }
}
