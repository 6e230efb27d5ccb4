//! Protobuf wire codec for dynamic messages.
//!
//! Encoding and decoding are driven entirely by the field type tags in the
//! descriptor; there is no per-message generated code.
//!
//! - Each set field is written as (tag, value) pairs in field-number order
//! - Tag = (field_number << 3) | wire_type
//! - Wire types: 0=varint, 1=64-bit, 2=length-delimited, 5=32-bit
//! - Repeated scalar and enum fields are packed, as proto3 does by default
//!
//! Only fields that are set on the instance are written. The decoder accepts
//! both packed and unpacked repeated scalars, merges repeated occurrences of
//! a singular message field, and skips unknown fields (groups included).

use crate::descriptor::{FieldDescriptor, MessageDescriptor, ProtoType};
use crate::error::{Error, Result};
use crate::message::{DynamicMessage, ProtoFieldValue};
use protobuf::{CodedInputStream, CodedOutputStream};
use std::sync::Arc;

const WIRE_VARINT: u32 = 0;
const WIRE_FIXED64: u32 = 1;
const WIRE_LENGTH_DELIMITED: u32 = 2;
const WIRE_START_GROUP: u32 = 3;
const WIRE_END_GROUP: u32 = 4;
const WIRE_FIXED32: u32 = 5;

fn encode_error(e: protobuf::Error) -> Error {
    Error::ProtobufEncode(e.to_string())
}

fn decode_error(e: protobuf::Error) -> Error {
    Error::ProtobufDecode(e.to_string())
}

/// Encode a dynamic message to protobuf binary format.
pub fn encode(message: &DynamicMessage) -> Result<Vec<u8>> {
    message.validate()?;
    encode_validated(message)
}

fn encode_validated(message: &DynamicMessage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut stream = CodedOutputStream::vec(&mut buffer);
        for (field, value) in message.fields() {
            match value {
                ProtoFieldValue::Repeated(values) if field.field_type.is_packable() => {
                    if values.is_empty() {
                        continue;
                    }
                    let packed = encode_packed(field, values)?;
                    stream
                        .write_bytes(field.number, &packed)
                        .map_err(encode_error)?;
                }
                ProtoFieldValue::Repeated(values) => {
                    for element in values {
                        write_value(&mut stream, field, element)?;
                    }
                }
                single => write_value(&mut stream, field, single)?,
            }
        }
        stream.flush().map_err(encode_error)?;
    }
    Ok(buffer)
}

fn write_value(
    stream: &mut CodedOutputStream,
    field: &FieldDescriptor,
    value: &ProtoFieldValue,
) -> Result<()> {
    let n = field.number;
    let written = match (&field.field_type, value) {
        (ProtoType::Double, ProtoFieldValue::Double(v)) => stream.write_double(n, *v),
        (ProtoType::Float, ProtoFieldValue::Float(v)) => stream.write_float(n, *v),
        (ProtoType::Int32, ProtoFieldValue::Int32(v)) => stream.write_int32(n, *v),
        (ProtoType::Sint32, ProtoFieldValue::Int32(v)) => stream.write_sint32(n, *v),
        (ProtoType::Sfixed32, ProtoFieldValue::Int32(v)) => stream.write_sfixed32(n, *v),
        (ProtoType::Int64, ProtoFieldValue::Int64(v)) => stream.write_int64(n, *v),
        (ProtoType::Sint64, ProtoFieldValue::Int64(v)) => stream.write_sint64(n, *v),
        (ProtoType::Sfixed64, ProtoFieldValue::Int64(v)) => stream.write_sfixed64(n, *v),
        (ProtoType::Uint32, ProtoFieldValue::Uint32(v)) => stream.write_uint32(n, *v),
        (ProtoType::Fixed32, ProtoFieldValue::Uint32(v)) => stream.write_fixed32(n, *v),
        (ProtoType::Uint64, ProtoFieldValue::Uint64(v)) => stream.write_uint64(n, *v),
        (ProtoType::Fixed64, ProtoFieldValue::Uint64(v)) => stream.write_fixed64(n, *v),
        (ProtoType::Bool, ProtoFieldValue::Bool(v)) => stream.write_bool(n, *v),
        (ProtoType::String, ProtoFieldValue::String(v)) => stream.write_string(n, v),
        (ProtoType::Bytes, ProtoFieldValue::Bytes(v)) => stream.write_bytes(n, v),
        // Enums share the int32 varint encoding
        (ProtoType::Enum(_), ProtoFieldValue::Enum(v)) => stream.write_int32(n, *v),
        (ProtoType::Message(_), ProtoFieldValue::Message(nested)) => {
            let bytes = encode_validated(nested)?;
            stream.write_bytes(n, &bytes)
        }
        _ => {
            return Err(Error::ProtobufEncode(format!(
                "Cannot encode {} as {} for field '{}'",
                value.kind(),
                field.field_type,
                field.name
            )))
        }
    };
    written.map_err(encode_error)
}

fn encode_packed(field: &FieldDescriptor, values: &[ProtoFieldValue]) -> Result<Vec<u8>> {
    let mut packed = Vec::new();
    {
        let mut stream = CodedOutputStream::vec(&mut packed);
        for value in values {
            let written = match (&field.field_type, value) {
                (ProtoType::Double, ProtoFieldValue::Double(v)) => stream.write_double_no_tag(*v),
                (ProtoType::Float, ProtoFieldValue::Float(v)) => stream.write_float_no_tag(*v),
                (ProtoType::Int32, ProtoFieldValue::Int32(v))
                | (ProtoType::Enum(_), ProtoFieldValue::Enum(v)) => stream.write_int32_no_tag(*v),
                (ProtoType::Sint32, ProtoFieldValue::Int32(v)) => stream.write_sint32_no_tag(*v),
                (ProtoType::Sfixed32, ProtoFieldValue::Int32(v)) => {
                    stream.write_sfixed32_no_tag(*v)
                }
                (ProtoType::Int64, ProtoFieldValue::Int64(v)) => stream.write_int64_no_tag(*v),
                (ProtoType::Sint64, ProtoFieldValue::Int64(v)) => stream.write_sint64_no_tag(*v),
                (ProtoType::Sfixed64, ProtoFieldValue::Int64(v)) => {
                    stream.write_sfixed64_no_tag(*v)
                }
                (ProtoType::Uint32, ProtoFieldValue::Uint32(v)) => stream.write_uint32_no_tag(*v),
                (ProtoType::Fixed32, ProtoFieldValue::Uint32(v)) => {
                    stream.write_fixed32_no_tag(*v)
                }
                (ProtoType::Uint64, ProtoFieldValue::Uint64(v)) => stream.write_uint64_no_tag(*v),
                (ProtoType::Fixed64, ProtoFieldValue::Uint64(v)) => {
                    stream.write_fixed64_no_tag(*v)
                }
                (ProtoType::Bool, ProtoFieldValue::Bool(v)) => stream.write_bool_no_tag(*v),
                _ => {
                    return Err(Error::ProtobufEncode(format!(
                        "Cannot pack {} into field '{}' of type {}",
                        value.kind(),
                        field.name,
                        field.field_type
                    )))
                }
            };
            written.map_err(encode_error)?;
        }
        stream.flush().map_err(encode_error)?;
    }
    Ok(packed)
}

/// Runtime protobuf decoder.
///
/// Nested message types are looked up through `resolve`, which maps a
/// message-typed field (and the message declaring it) to the field's
/// descriptor.
pub struct Decoder<'a> {
    resolve: &'a dyn Fn(&MessageDescriptor, &FieldDescriptor) -> Result<Arc<MessageDescriptor>>,
}

impl<'a> Decoder<'a> {
    pub fn new(
        resolve: &'a dyn Fn(&MessageDescriptor, &FieldDescriptor) -> Result<Arc<MessageDescriptor>>,
    ) -> Self {
        Self { resolve }
    }

    /// Decode a protobuf message from bytes.
    pub fn decode(&self, descriptor: &Arc<MessageDescriptor>, data: &[u8]) -> Result<DynamicMessage> {
        let mut stream = CodedInputStream::from_bytes(data);
        let mut message = DynamicMessage::new(Arc::clone(descriptor));

        while !stream.eof().map_err(decode_error)? {
            let tag = stream.read_raw_varint32().map_err(decode_error)?;
            let field_number = tag >> 3;
            let wire_type = tag & 0x7;
            if field_number == 0 {
                return Err(Error::ProtobufDecode(format!(
                    "Invalid field number 0 in message {}",
                    descriptor.full_name
                )));
            }

            let Some(field) = descriptor.field_by_number(field_number) else {
                skip_field(&mut stream, field_number, wire_type)?;
                continue;
            };

            if !field.is_repeated {
                check_wire_type(field, wire_type)?;
                let value = self.read_value(descriptor, field, &mut stream)?;
                message.merge_field(&field.name, value)?;
            } else if wire_type == WIRE_LENGTH_DELIMITED && field.field_type.is_packable() {
                let packed = stream.read_bytes().map_err(decode_error)?;
                let mut inner = CodedInputStream::from_bytes(&packed);
                while !inner.eof().map_err(decode_error)? {
                    let value = self.read_value(descriptor, field, &mut inner)?;
                    message.push(&field.name, value)?;
                }
            } else {
                check_wire_type(field, wire_type)?;
                let value = self.read_value(descriptor, field, &mut stream)?;
                message.push(&field.name, value)?;
            }
        }

        Ok(message)
    }

    fn read_value(
        &self,
        owner: &MessageDescriptor,
        field: &FieldDescriptor,
        stream: &mut CodedInputStream,
    ) -> Result<ProtoFieldValue> {
        let value = match &field.field_type {
            ProtoType::Double => ProtoFieldValue::Double(stream.read_double().map_err(decode_error)?),
            ProtoType::Float => ProtoFieldValue::Float(stream.read_float().map_err(decode_error)?),
            ProtoType::Int32 => ProtoFieldValue::Int32(stream.read_int32().map_err(decode_error)?),
            ProtoType::Sint32 => ProtoFieldValue::Int32(stream.read_sint32().map_err(decode_error)?),
            ProtoType::Sfixed32 => {
                ProtoFieldValue::Int32(stream.read_sfixed32().map_err(decode_error)?)
            }
            ProtoType::Int64 => ProtoFieldValue::Int64(stream.read_int64().map_err(decode_error)?),
            ProtoType::Sint64 => ProtoFieldValue::Int64(stream.read_sint64().map_err(decode_error)?),
            ProtoType::Sfixed64 => {
                ProtoFieldValue::Int64(stream.read_sfixed64().map_err(decode_error)?)
            }
            ProtoType::Uint32 => {
                ProtoFieldValue::Uint32(stream.read_uint32().map_err(decode_error)?)
            }
            ProtoType::Fixed32 => {
                ProtoFieldValue::Uint32(stream.read_fixed32().map_err(decode_error)?)
            }
            ProtoType::Uint64 => {
                ProtoFieldValue::Uint64(stream.read_uint64().map_err(decode_error)?)
            }
            ProtoType::Fixed64 => {
                ProtoFieldValue::Uint64(stream.read_fixed64().map_err(decode_error)?)
            }
            ProtoType::Bool => ProtoFieldValue::Bool(stream.read_bool().map_err(decode_error)?),
            ProtoType::String => {
                ProtoFieldValue::String(stream.read_string().map_err(decode_error)?)
            }
            ProtoType::Bytes => {
                ProtoFieldValue::Bytes(stream.read_bytes().map_err(decode_error)?.to_vec())
            }
            ProtoType::Enum(_) => ProtoFieldValue::Enum(stream.read_int32().map_err(decode_error)?),
            ProtoType::Message(_) => {
                let bytes = stream.read_bytes().map_err(decode_error)?;
                let nested = (self.resolve)(owner, field)?;
                ProtoFieldValue::Message(Box::new(self.decode(&nested, &bytes)?))
            }
        };
        Ok(value)
    }
}

/// Wire type of a single, unpacked value of the given type.
fn wire_type_of(field_type: &ProtoType) -> u32 {
    match field_type {
        ProtoType::Double | ProtoType::Fixed64 | ProtoType::Sfixed64 => WIRE_FIXED64,
        ProtoType::Float | ProtoType::Fixed32 | ProtoType::Sfixed32 => WIRE_FIXED32,
        ProtoType::String | ProtoType::Bytes | ProtoType::Message(_) => WIRE_LENGTH_DELIMITED,
        _ => WIRE_VARINT,
    }
}

fn check_wire_type(field: &FieldDescriptor, wire_type: u32) -> Result<()> {
    let expected = wire_type_of(&field.field_type);
    if wire_type == expected {
        Ok(())
    } else {
        Err(Error::ProtobufDecode(format!(
            "Wire type {wire_type} does not match field '{}' of type {} (expected {expected})",
            field.name, field.field_type
        )))
    }
}

fn skip_field(stream: &mut CodedInputStream, field_number: u32, wire_type: u32) -> Result<()> {
    let skipped = match wire_type {
        WIRE_VARINT => stream.read_raw_varint64().map(|_| ()),
        WIRE_FIXED64 => stream.read_raw_little_endian64().map(|_| ()),
        WIRE_LENGTH_DELIMITED => stream.read_bytes().map(|_| ()),
        WIRE_FIXED32 => stream.read_raw_little_endian32().map(|_| ()),
        WIRE_START_GROUP => return skip_group(stream, field_number),
        other => {
            return Err(Error::ProtobufDecode(format!(
                "Unsupported wire type {other} for unknown field {field_number}"
            )))
        }
    };
    skipped.map_err(decode_error)
}

/// Skip a proto2 group up to and including its end tag.
fn skip_group(stream: &mut CodedInputStream, field_number: u32) -> Result<()> {
    loop {
        if stream.eof().map_err(decode_error)? {
            return Err(Error::ProtobufDecode(format!(
                "Unterminated group for field {field_number}"
            )));
        }
        let tag = stream.read_raw_varint32().map_err(decode_error)?;
        let (number, wire_type) = (tag >> 3, tag & 0x7);
        if wire_type == WIRE_END_GROUP {
            if number == field_number {
                return Ok(());
            }
            return Err(Error::ProtobufDecode(format!(
                "Group {field_number} closed by end tag of field {number}"
            )));
        }
        skip_field(stream, number, wire_type)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(name: &str, number: u32, field_type: ProtoType, is_repeated: bool) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            number,
            field_type,
            is_repeated,
        }
    }

    fn point() -> Arc<MessageDescriptor> {
        Arc::new(MessageDescriptor {
            name: "Point".to_string(),
            full_name: "geo.Point".to_string(),
            file: "geo.proto".to_string(),
            fields: vec![
                scalar("x", 1, ProtoType::Sint32, false),
                scalar("y", 2, ProtoType::Sfixed64, false),
                scalar("weights", 3, ProtoType::Double, true),
                scalar("labels", 4, ProtoType::String, true),
                scalar("hash", 5, ProtoType::Fixed32, false),
            ],
        })
    }

    fn no_nested(_: &MessageDescriptor, field: &FieldDescriptor) -> Result<Arc<MessageDescriptor>> {
        Err(Error::TypeNotFound(field.field_type.to_string()))
    }

    #[test]
    fn test_scalar_round_trip() {
        let mut msg = DynamicMessage::new(point());
        msg.set("x", ProtoFieldValue::Int32(-42)).unwrap();
        msg.set("y", ProtoFieldValue::Int64(i64::MIN)).unwrap();
        msg.set(
            "weights",
            ProtoFieldValue::Repeated(vec![
                ProtoFieldValue::Double(0.5),
                ProtoFieldValue::Double(-1.25),
            ]),
        )
        .unwrap();
        msg.push("labels", ProtoFieldValue::String("a".to_string()))
            .unwrap();
        msg.push("labels", ProtoFieldValue::String("b".to_string()))
            .unwrap();
        msg.set("hash", ProtoFieldValue::Uint32(0xdead_beef)).unwrap();

        let bytes = encode(&msg).unwrap();
        let decoder = Decoder::new(&no_nested);
        let decoded = decoder.decode(&point(), &bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_sint32_uses_zigzag() {
        let msg = DynamicMessage::new(point())
            .with("x", ProtoFieldValue::Int32(-1))
            .unwrap();
        // field 1, varint; zigzag(-1) = 1
        assert_eq!(encode(&msg).unwrap(), vec![0x08, 0x01]);
    }

    #[test]
    fn test_repeated_doubles_are_packed() {
        let msg = DynamicMessage::new(point())
            .with(
                "weights",
                ProtoFieldValue::Repeated(vec![ProtoFieldValue::Double(1.0)]),
            )
            .unwrap();
        let bytes = encode(&msg).unwrap();
        // field 3, length-delimited, 8 bytes of payload
        assert_eq!(bytes[0], (3 << 3) | 2);
        assert_eq!(bytes[1], 8);
        assert_eq!(bytes.len(), 10);
    }

    #[test]
    fn test_decode_unpacked_repeated_and_unknown_fields() {
        let mut bytes = Vec::new();
        {
            let mut stream = CodedOutputStream::vec(&mut bytes);
            stream.write_double(3, 2.5).unwrap();
            stream.write_string(99, "ignored").unwrap();
            stream.write_int64(98, 7).unwrap();
            stream.write_double(3, 3.5).unwrap();
            stream.flush().unwrap();
        }
        let decoder = Decoder::new(&no_nested);
        let decoded = decoder.decode(&point(), &bytes).unwrap();
        assert_eq!(
            decoded.get("weights"),
            Some(&ProtoFieldValue::Repeated(vec![
                ProtoFieldValue::Double(2.5),
                ProtoFieldValue::Double(3.5),
            ]))
        );
        assert_eq!(decoded.fields().len(), 1);
    }

    #[test]
    fn test_empty_repeated_round_trip() {
        let mut msg = DynamicMessage::new(point());
        msg.set("x", ProtoFieldValue::Int32(3)).unwrap();
        msg.set("labels", ProtoFieldValue::Repeated(Vec::new()))
            .unwrap();
        msg.set("weights", ProtoFieldValue::Repeated(Vec::new()))
            .unwrap();

        let bytes = encode(&msg).unwrap();
        let decoded = Decoder::new(&no_nested).decode(&point(), &bytes).unwrap();
        assert_eq!(decoded, msg);
        assert!(!decoded.is_set("labels"));
    }

    #[test]
    fn test_decode_skips_unknown_group() {
        let mut bytes = Vec::new();
        {
            let mut stream = CodedOutputStream::vec(&mut bytes);
            // field 7 as a group holding a varint and a nested group
            stream.write_raw_varint32((7 << 3) | WIRE_START_GROUP).unwrap();
            stream.write_int32(1, 42).unwrap();
            stream.write_raw_varint32((8 << 3) | WIRE_START_GROUP).unwrap();
            stream.write_string(2, "inner").unwrap();
            stream.write_raw_varint32((8 << 3) | WIRE_END_GROUP).unwrap();
            stream.write_raw_varint32((7 << 3) | WIRE_END_GROUP).unwrap();
            stream.write_sint32(1, -7).unwrap();
            stream.flush().unwrap();
        }
        let decoded = Decoder::new(&no_nested).decode(&point(), &bytes).unwrap();
        assert_eq!(decoded.get("x"), Some(&ProtoFieldValue::Int32(-7)));
        assert_eq!(decoded.fields().len(), 1);
    }

    #[test]
    fn test_decode_unterminated_group() {
        let mut bytes = Vec::new();
        {
            let mut stream = CodedOutputStream::vec(&mut bytes);
            stream.write_raw_varint32((7 << 3) | WIRE_START_GROUP).unwrap();
            stream.write_int32(1, 42).unwrap();
            stream.flush().unwrap();
        }
        let result = Decoder::new(&no_nested).decode(&point(), &bytes);
        assert!(matches!(result, Err(Error::ProtobufDecode(_))));
    }

    #[test]
    fn test_decode_rejects_mismatched_wire_type() {
        let mut bytes = Vec::new();
        {
            let mut stream = CodedOutputStream::vec(&mut bytes);
            // x is sint32 (varint), sent as a string
            stream.write_string(1, "oops").unwrap();
            stream.flush().unwrap();
        }
        let result = Decoder::new(&no_nested).decode(&point(), &bytes);
        assert!(matches!(result, Err(Error::ProtobufDecode(_))));
    }

    #[test]
    fn test_repeated_singular_message_is_merged() {
        let holder = Arc::new(MessageDescriptor {
            name: "Holder".to_string(),
            full_name: "geo.Holder".to_string(),
            file: "geo.proto".to_string(),
            fields: vec![scalar(
                "origin",
                1,
                ProtoType::Message("geo.Point".to_string()),
                false,
            )],
        });
        let first = encode(
            &DynamicMessage::new(point())
                .with("x", ProtoFieldValue::Int32(1))
                .unwrap()
                .with("y", ProtoFieldValue::Int64(5))
                .unwrap(),
        )
        .unwrap();
        let second = encode(
            &DynamicMessage::new(point())
                .with("y", ProtoFieldValue::Int64(9))
                .unwrap()
                .with(
                    "labels",
                    ProtoFieldValue::Repeated(vec![ProtoFieldValue::String("b".to_string())]),
                )
                .unwrap(),
        )
        .unwrap();
        let mut bytes = Vec::new();
        {
            let mut stream = CodedOutputStream::vec(&mut bytes);
            stream.write_bytes(1, &first).unwrap();
            stream.write_bytes(1, &second).unwrap();
            stream.flush().unwrap();
        }

        let resolve =
            |_: &MessageDescriptor, _: &FieldDescriptor| -> Result<Arc<MessageDescriptor>> {
                Ok(point())
            };
        let decoded = Decoder::new(&resolve).decode(&holder, &bytes).unwrap();
        let Some(ProtoFieldValue::Message(origin)) = decoded.get("origin") else {
            panic!("Expected origin message");
        };
        assert_eq!(origin.get("x"), Some(&ProtoFieldValue::Int32(1)));
        assert_eq!(origin.get("y"), Some(&ProtoFieldValue::Int64(9)));
        assert!(origin.is_set("labels"));
    }

    #[test]
    fn test_decode_truncated_input() {
        let msg = DynamicMessage::new(point())
            .with(
                "labels",
                ProtoFieldValue::Repeated(vec![ProtoFieldValue::String("long label".to_string())]),
            )
            .unwrap();
        let bytes = encode(&msg).unwrap();
        let decoder = Decoder::new(&no_nested);
        let result = decoder.decode(&point(), &bytes[..bytes.len() - 3]);
        assert!(matches!(result, Err(Error::ProtobufDecode(_))));
    }
}
