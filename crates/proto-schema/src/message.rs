//! Dynamic message instances.
//!
//! A [`DynamicMessage`] is a map from field name to value, tied to the
//! [`MessageDescriptor`] it was created from. Every value is checked against
//! the descriptor's field list when it is set, so an instance can only ever
//! hold fields its type declares, with values of the declared kind.

use crate::descriptor::{FieldDescriptor, MessageDescriptor, ProtoType};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Represents a field value in a dynamic message.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtoFieldValue {
    Double(f64),
    Float(f32),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Enum(i32),
    Message(Box<DynamicMessage>),
    Repeated(Vec<ProtoFieldValue>),
}

impl ProtoFieldValue {
    /// Short name of the value kind, used in error messages.
    pub fn kind(&self) -> String {
        match self {
            ProtoFieldValue::Double(_) => "double".to_string(),
            ProtoFieldValue::Float(_) => "float".to_string(),
            ProtoFieldValue::Int32(_) => "int32".to_string(),
            ProtoFieldValue::Int64(_) => "int64".to_string(),
            ProtoFieldValue::Uint32(_) => "uint32".to_string(),
            ProtoFieldValue::Uint64(_) => "uint64".to_string(),
            ProtoFieldValue::Bool(_) => "bool".to_string(),
            ProtoFieldValue::String(_) => "string".to_string(),
            ProtoFieldValue::Bytes(_) => "bytes".to_string(),
            ProtoFieldValue::Enum(_) => "enum".to_string(),
            ProtoFieldValue::Message(m) => format!("message:{}", m.descriptor().full_name),
            ProtoFieldValue::Repeated(_) => "repeated".to_string(),
        }
    }

    /// Whether this single (non-repeated) value fits the given field type.
    fn fits(&self, field_type: &ProtoType) -> bool {
        match (field_type, self) {
            (ProtoType::Double, ProtoFieldValue::Double(_))
            | (ProtoType::Float, ProtoFieldValue::Float(_))
            | (
                ProtoType::Int32 | ProtoType::Sint32 | ProtoType::Sfixed32,
                ProtoFieldValue::Int32(_),
            )
            | (
                ProtoType::Int64 | ProtoType::Sint64 | ProtoType::Sfixed64,
                ProtoFieldValue::Int64(_),
            )
            | (ProtoType::Uint32 | ProtoType::Fixed32, ProtoFieldValue::Uint32(_))
            | (ProtoType::Uint64 | ProtoType::Fixed64, ProtoFieldValue::Uint64(_))
            | (ProtoType::Bool, ProtoFieldValue::Bool(_))
            | (ProtoType::String, ProtoFieldValue::String(_))
            | (ProtoType::Bytes, ProtoFieldValue::Bytes(_))
            | (ProtoType::Enum(_), ProtoFieldValue::Enum(_)) => true,
            (ProtoType::Message(type_name), ProtoFieldValue::Message(m)) => {
                &m.descriptor().full_name == type_name
            }
            _ => false,
        }
    }
}

/// A message value built from a descriptor at runtime.
#[derive(Debug, Clone)]
pub struct DynamicMessage {
    descriptor: Arc<MessageDescriptor>,
    fields: HashMap<String, ProtoFieldValue>,
}

impl PartialEq for DynamicMessage {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.full_name == other.descriptor.full_name && self.fields == other.fields
    }
}

impl DynamicMessage {
    /// Create a blank instance with no fields set.
    pub fn new(descriptor: Arc<MessageDescriptor>) -> Self {
        Self {
            descriptor,
            fields: HashMap::new(),
        }
    }

    pub fn descriptor(&self) -> &Arc<MessageDescriptor> {
        &self.descriptor
    }

    /// Set a field, replacing any previous value.
    ///
    /// Repeated fields take a `ProtoFieldValue::Repeated`. An empty sequence
    /// leaves the field unset, as it has no wire representation.
    pub fn set(&mut self, field: &str, value: ProtoFieldValue) -> Result<()> {
        let descriptor = self.descriptor.require_field(field)?;
        check_value(descriptor, &value)?;
        match value {
            ProtoFieldValue::Repeated(values) if values.is_empty() => {
                self.fields.remove(&descriptor.name);
            }
            value => {
                self.fields.insert(descriptor.name.clone(), value);
            }
        }
        Ok(())
    }

    /// Merge `value` into a field the way the wire format does: nested
    /// messages are merged, repeated values appended, scalars replaced.
    pub fn merge_field(&mut self, field: &str, value: ProtoFieldValue) -> Result<()> {
        let descriptor = self.descriptor.require_field(field)?;
        check_value(descriptor, &value)?;
        let name = descriptor.name.clone();

        let merged = match (self.fields.remove(&name), value) {
            (Some(ProtoFieldValue::Message(mut existing)), ProtoFieldValue::Message(incoming)) => {
                existing.merge_from(*incoming)?;
                ProtoFieldValue::Message(existing)
            }
            (Some(ProtoFieldValue::Repeated(mut existing)), ProtoFieldValue::Repeated(incoming)) => {
                existing.extend(incoming);
                ProtoFieldValue::Repeated(existing)
            }
            (_, value) => value,
        };
        self.set(&name, merged)
    }

    /// Merge every set field of `other` into this message.
    pub fn merge_from(&mut self, other: DynamicMessage) -> Result<()> {
        if other.descriptor.full_name != self.descriptor.full_name {
            return Err(Error::InvalidFieldValue {
                field: self.descriptor.full_name.clone(),
                expected: format!("message:{}", self.descriptor.full_name),
                actual: format!("message:{}", other.descriptor.full_name),
            });
        }
        for (name, value) in other.fields {
            self.merge_field(&name, value)?;
        }
        Ok(())
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, field: &str, value: ProtoFieldValue) -> Result<Self> {
        self.set(field, value)?;
        Ok(self)
    }

    /// Append one element to a repeated field.
    pub fn push(&mut self, field: &str, value: ProtoFieldValue) -> Result<()> {
        let descriptor = self.descriptor.require_field(field)?;
        if !descriptor.is_repeated || !value.fits(&descriptor.field_type) {
            return Err(mismatch(descriptor, &value));
        }
        match self
            .fields
            .entry(descriptor.name.clone())
            .or_insert_with(|| ProtoFieldValue::Repeated(Vec::new()))
        {
            ProtoFieldValue::Repeated(values) => values.push(value),
            other => return Err(mismatch(descriptor, other)),
        }
        Ok(())
    }

    pub fn get(&self, field: &str) -> Option<&ProtoFieldValue> {
        self.fields.get(field)
    }

    pub fn is_set(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn clear(&mut self, field: &str) -> Option<ProtoFieldValue> {
        self.fields.remove(field)
    }

    /// Set fields paired with their descriptors, in field-number order.
    pub fn fields(&self) -> Vec<(&FieldDescriptor, &ProtoFieldValue)> {
        let mut set: Vec<_> = self
            .descriptor
            .fields
            .iter()
            .filter_map(|f| self.fields.get(&f.name).map(|v| (f, v)))
            .collect();
        set.sort_by_key(|(f, _)| f.number);
        set
    }

    /// Re-check every stored value against the descriptor, recursively.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in &self.fields {
            let descriptor = self.descriptor.require_field(name)?;
            check_value(descriptor, value)?;
            match value {
                ProtoFieldValue::Message(m) => m.validate()?,
                ProtoFieldValue::Repeated(values) => {
                    for v in values {
                        if let ProtoFieldValue::Message(m) = v {
                            m.validate()?;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn check_value(field: &FieldDescriptor, value: &ProtoFieldValue) -> Result<()> {
    let ok = match value {
        ProtoFieldValue::Repeated(values) => {
            field.is_repeated && values.iter().all(|v| v.fits(&field.field_type))
        }
        single => !field.is_repeated && single.fits(&field.field_type),
    };
    if ok {
        Ok(())
    } else {
        Err(mismatch(field, value))
    }
}

fn mismatch(field: &FieldDescriptor, value: &ProtoFieldValue) -> Error {
    let expected = if field.is_repeated {
        format!("repeated<{}>", field.field_type)
    } else {
        field.field_type.to_string()
    };
    Error::InvalidFieldValue {
        field: field.name.clone(),
        expected,
        actual: value.kind(),
    }
}
