//! Message, field and enum descriptors.
//!
//! These are the runtime view of the type definitions carried inside a
//! `FileDescriptorProto`. They are built once when a snapshot is loaded and
//! shared (`Arc`) by every dynamic message created from them.

use crate::error::{Error, Result};
use protobuf::descriptor::field_descriptor_proto::{Label, Type};
use protobuf::descriptor::{DescriptorProto, EnumDescriptorProto, FieldDescriptorProto};
use std::sync::Arc;
use tracing::warn;

/// Protobuf field type enumeration.
///
/// Message and enum types carry the fully qualified type name, without the
/// leading dot used inside descriptor sets.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtoType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
    Message(String),
    Enum(String),
}

impl std::fmt::Display for ProtoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

impl ProtoType {
    /// Get the human-readable type name.
    pub fn type_name(&self) -> String {
        match self {
            ProtoType::Double => "double".to_string(),
            ProtoType::Float => "float".to_string(),
            ProtoType::Int32 => "int32".to_string(),
            ProtoType::Int64 => "int64".to_string(),
            ProtoType::Uint32 => "uint32".to_string(),
            ProtoType::Uint64 => "uint64".to_string(),
            ProtoType::Sint32 => "sint32".to_string(),
            ProtoType::Sint64 => "sint64".to_string(),
            ProtoType::Fixed32 => "fixed32".to_string(),
            ProtoType::Fixed64 => "fixed64".to_string(),
            ProtoType::Sfixed32 => "sfixed32".to_string(),
            ProtoType::Sfixed64 => "sfixed64".to_string(),
            ProtoType::Bool => "bool".to_string(),
            ProtoType::String => "string".to_string(),
            ProtoType::Bytes => "bytes".to_string(),
            ProtoType::Message(name) => format!("message:{name}"),
            ProtoType::Enum(name) => format!("enum:{name}"),
        }
    }

    /// Whether repeated values of this type use packed encoding in proto3.
    pub fn is_packable(&self) -> bool {
        !matches!(
            self,
            ProtoType::String | ProtoType::Bytes | ProtoType::Message(_)
        )
    }

    /// `None` for proto2 groups, which have no dynamic representation.
    fn from_field(field: &FieldDescriptorProto) -> Result<Option<Self>> {
        let field_type = field
            .type_
            .ok_or_else(|| {
                Error::Parse(format!(
                    "Field '{}' missing type",
                    field.name.clone().unwrap_or_default()
                ))
            })?
            .enum_value_or_default();

        Ok(Some(match field_type {
            Type::TYPE_DOUBLE => ProtoType::Double,
            Type::TYPE_FLOAT => ProtoType::Float,
            Type::TYPE_INT64 => ProtoType::Int64,
            Type::TYPE_UINT64 => ProtoType::Uint64,
            Type::TYPE_INT32 => ProtoType::Int32,
            Type::TYPE_FIXED64 => ProtoType::Fixed64,
            Type::TYPE_FIXED32 => ProtoType::Fixed32,
            Type::TYPE_BOOL => ProtoType::Bool,
            Type::TYPE_STRING => ProtoType::String,
            Type::TYPE_MESSAGE => ProtoType::Message(qualified_type_name(field)),
            Type::TYPE_BYTES => ProtoType::Bytes,
            Type::TYPE_UINT32 => ProtoType::Uint32,
            Type::TYPE_ENUM => ProtoType::Enum(qualified_type_name(field)),
            Type::TYPE_SFIXED32 => ProtoType::Sfixed32,
            Type::TYPE_SFIXED64 => ProtoType::Sfixed64,
            Type::TYPE_SINT32 => ProtoType::Sint32,
            Type::TYPE_SINT64 => ProtoType::Sint64,
            Type::TYPE_GROUP => return Ok(None),
        }))
    }
}

fn qualified_type_name(field: &FieldDescriptorProto) -> String {
    let type_name = field.type_name.clone().unwrap_or_default();
    type_name.trim_start_matches('.').to_string()
}

/// Describes a single field in a message.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Field name as declared in the schema
    pub name: String,
    /// Field number (tag)
    pub number: u32,
    /// Field type; for messages and enums this is the nested-type reference
    pub field_type: ProtoType,
    /// Whether the field is repeated
    pub is_repeated: bool,
}

/// Describes a message type.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDescriptor {
    /// Simple message name (e.g., "User")
    pub name: String,
    /// Fully qualified name (e.g., "fixtures.users.User")
    pub full_name: String,
    /// Name of the schema file declaring this message
    pub file: String,
    /// Fields in declaration order
    pub fields: Vec<FieldDescriptor>,
}

impl MessageDescriptor {
    /// Get a field descriptor by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Get a field descriptor by field number.
    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.number == number)
    }

    /// Like [`get_field`](Self::get_field) but fails with `FieldNotFound`.
    pub fn require_field(&self, name: &str) -> Result<&FieldDescriptor> {
        self.get_field(name).ok_or_else(|| Error::FieldNotFound {
            message: self.full_name.clone(),
            field: name.to_string(),
        })
    }

    /// List all field names in declaration order.
    pub fn list_fields(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

/// Describes an enum type.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDescriptor {
    pub name: String,
    pub full_name: String,
    pub file: String,
    /// `(value name, number)` in declaration order
    pub values: Vec<(String, i32)>,
}

impl EnumDescriptor {
    /// Number of the value with the given name.
    pub fn value_by_name(&self, name: &str) -> Result<i32> {
        self.values
            .iter()
            .find(|(value_name, _)| value_name == name)
            .map(|(_, number)| *number)
            .ok_or_else(|| Error::EnumValueNotFound {
                enum_name: self.full_name.clone(),
                value: name.to_string(),
            })
    }

    /// Name of the first value with the given number.
    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, n)| *n == number)
            .map(|(name, _)| name.as_str())
    }
}

/// Types declared by one schema file.
#[derive(Debug, Clone, Default)]
pub struct FileTypes {
    /// Top-level messages, in declaration order
    pub messages: Vec<Arc<MessageDescriptor>>,
    /// Messages declared inside other messages
    pub nested_messages: Vec<Arc<MessageDescriptor>>,
    /// Top-level and nested enums
    pub enums: Vec<Arc<EnumDescriptor>>,
}

impl FileTypes {
    /// Build descriptors for every message and enum declared in a file.
    pub(crate) fn build(
        file: &str,
        package: &str,
        messages: &[DescriptorProto],
        enums: &[EnumDescriptorProto],
    ) -> Result<Self> {
        let mut types = FileTypes::default();
        for enum_proto in enums {
            types.enums.push(Arc::new(build_enum(file, package, enum_proto)));
        }
        for message in messages {
            let descriptor = build_message(file, package, message, &mut types)?;
            types.messages.push(Arc::new(descriptor));
        }
        Ok(types)
    }

    /// Every message declared in the file, top-level first.
    pub fn all_messages(&self) -> impl Iterator<Item = &Arc<MessageDescriptor>> {
        self.messages.iter().chain(self.nested_messages.iter())
    }
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

fn build_enum(file: &str, scope: &str, enum_proto: &EnumDescriptorProto) -> EnumDescriptor {
    let name = enum_proto.name.clone().unwrap_or_default();
    EnumDescriptor {
        full_name: qualify(scope, &name),
        name,
        file: file.to_string(),
        values: enum_proto
            .value
            .iter()
            .map(|v| (v.name.clone().unwrap_or_default(), v.number.unwrap_or(0)))
            .collect(),
    }
}

fn build_message(
    file: &str,
    scope: &str,
    message: &DescriptorProto,
    types: &mut FileTypes,
) -> Result<MessageDescriptor> {
    let name = message.name.clone().unwrap_or_default();
    let full_name = qualify(scope, &name);

    for enum_proto in &message.enum_type {
        types
            .enums
            .push(Arc::new(build_enum(file, &full_name, enum_proto)));
    }
    for nested in &message.nested_type {
        let descriptor = build_message(file, &full_name, nested, types)?;
        types.nested_messages.push(Arc::new(descriptor));
    }

    let mut fields = Vec::with_capacity(message.field.len());
    for field in &message.field {
        let field_name = field.name.clone().unwrap_or_default();
        if field_name.is_empty() {
            continue;
        }
        let number = u32::try_from(field.number.unwrap_or(0))
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                Error::Parse(format!(
                    "Field '{field_name}' in message {full_name} has invalid number {:?}",
                    field.number
                ))
            })?;
        let Some(field_type) = ProtoType::from_field(field)? else {
            warn!(
                "Skipping group field '{}' in message {}: proto2 groups are not supported",
                field_name, full_name
            );
            continue;
        };
        fields.push(FieldDescriptor {
            name: field_name,
            number,
            field_type,
            is_repeated: field.label == Some(Label::LABEL_REPEATED.into()),
        });
    }

    Ok(MessageDescriptor {
        name,
        full_name,
        file: file.to_string(),
        fields,
    })
}
