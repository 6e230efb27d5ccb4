//! Proto3 JSON rendering of dynamic messages, used when logging samples.

use crate::descriptor::{EnumDescriptor, FieldDescriptor, MessageDescriptor, ProtoType};
use crate::message::{DynamicMessage, ProtoFieldValue};
use base64::Engine;
use serde_json::{Map, Number, Value};
use std::sync::Arc;

/// Looks up an enum descriptor by fully qualified name, starting from the
/// message that declares the field.
pub type EnumLookup<'a> = dyn Fn(&MessageDescriptor, &str) -> Option<Arc<EnumDescriptor>> + 'a;

/// Render a message in proto3 JSON form.
///
/// Field names are lowerCamelCase. Unset scalar and repeated fields render
/// their default value; unset message fields are omitted. Enums render by
/// value name when known, 64-bit integers as strings and bytes as base64.
pub fn to_json(message: &DynamicMessage, enums: &EnumLookup<'_>) -> Value {
    let descriptor = message.descriptor();
    let mut object = Map::new();

    for field in &descriptor.fields {
        let rendered = match message.get(&field.name) {
            Some(ProtoFieldValue::Repeated(values)) => Value::Array(
                values
                    .iter()
                    .map(|v| render_value(descriptor, field, v, enums))
                    .collect(),
            ),
            Some(value) => render_value(descriptor, field, value, enums),
            None if field.is_repeated => Value::Array(Vec::new()),
            None => match default_value(descriptor, field, enums) {
                Some(value) => value,
                None => continue,
            },
        };
        object.insert(json_name(&field.name), rendered);
    }

    Value::Object(object)
}

/// Convert a snake_case field name to lowerCamelCase.
pub fn json_name(field_name: &str) -> String {
    let mut out = String::with_capacity(field_name.len());
    let mut upper_next = false;
    for c in field_name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn render_value(
    owner: &MessageDescriptor,
    field: &FieldDescriptor,
    value: &ProtoFieldValue,
    enums: &EnumLookup<'_>,
) -> Value {
    match value {
        ProtoFieldValue::Double(v) => float(*v),
        ProtoFieldValue::Float(v) => float(f64::from(*v)),
        ProtoFieldValue::Int32(v) => Value::from(*v),
        ProtoFieldValue::Uint32(v) => Value::from(*v),
        ProtoFieldValue::Int64(v) => Value::String(v.to_string()),
        ProtoFieldValue::Uint64(v) => Value::String(v.to_string()),
        ProtoFieldValue::Bool(v) => Value::Bool(*v),
        ProtoFieldValue::String(v) => Value::String(v.clone()),
        ProtoFieldValue::Bytes(v) => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(v))
        }
        ProtoFieldValue::Enum(number) => enum_value(owner, field, *number, enums),
        ProtoFieldValue::Message(m) => to_json(m, enums),
        ProtoFieldValue::Repeated(values) => Value::Array(
            values
                .iter()
                .map(|v| render_value(owner, field, v, enums))
                .collect(),
        ),
    }
}

fn enum_value(
    owner: &MessageDescriptor,
    field: &FieldDescriptor,
    number: i32,
    enums: &EnumLookup<'_>,
) -> Value {
    let name = match &field.field_type {
        ProtoType::Enum(type_name) => enums(owner, type_name)
            .and_then(|e| e.name_of(number).map(str::to_string)),
        _ => None,
    };
    name.map(Value::String)
        .unwrap_or_else(|| Value::from(number))
}

fn default_value(
    owner: &MessageDescriptor,
    field: &FieldDescriptor,
    enums: &EnumLookup<'_>,
) -> Option<Value> {
    Some(match &field.field_type {
        ProtoType::Double | ProtoType::Float => Value::from(0.0),
        ProtoType::Int32
        | ProtoType::Sint32
        | ProtoType::Sfixed32
        | ProtoType::Uint32
        | ProtoType::Fixed32 => Value::from(0),
        ProtoType::Int64
        | ProtoType::Sint64
        | ProtoType::Sfixed64
        | ProtoType::Uint64
        | ProtoType::Fixed64 => Value::String("0".to_string()),
        ProtoType::Bool => Value::Bool(false),
        ProtoType::String | ProtoType::Bytes => Value::String(String::new()),
        ProtoType::Enum(_) => enum_value(owner, field, 0, enums),
        ProtoType::Message(_) => return None,
    })
}

fn float(v: f64) -> Value {
    match Number::from_f64(v) {
        Some(n) => Value::Number(n),
        None if v.is_nan() => Value::String("NaN".to_string()),
        None if v > 0.0 => Value::String("Infinity".to_string()),
        None => Value::String("-Infinity".to_string()),
    }
}
