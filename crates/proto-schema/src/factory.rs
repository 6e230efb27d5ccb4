//! Message type lookup and dynamic instance construction.

use crate::codec::{self, Decoder};
use crate::descriptor::{EnumDescriptor, FieldDescriptor, MessageDescriptor, ProtoType};
use crate::error::{Error, Result};
use crate::json;
use crate::message::DynamicMessage;
use crate::resolver::{ResolvedFile, SchemaGraph};
use std::sync::Arc;

/// Builds dynamic messages from the types of a resolved [`SchemaGraph`].
///
/// Only resolved files take part in lookups; types declared in files that
/// stayed unresolved surface as `TypeNotFound`.
#[derive(Debug, Clone)]
pub struct MessageFactory {
    graph: Arc<SchemaGraph>,
}

impl MessageFactory {
    pub fn new(graph: Arc<SchemaGraph>) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &SchemaGraph {
        &self.graph
    }

    /// Find a top-level message type by its simple name.
    ///
    /// Files are searched in resolution order and the first match wins, so
    /// when two packages declare the same simple name the one resolved first
    /// is returned. Use [`find_qualified`](Self::find_qualified) to pick a
    /// specific package.
    pub fn find_message_type(&self, name: &str) -> Result<Arc<MessageDescriptor>> {
        self.graph
            .files()
            .iter()
            .flat_map(|file| file.messages().iter())
            .find(|m| m.name == name)
            .cloned()
            .ok_or_else(|| Error::TypeNotFound(name.to_string()))
    }

    /// Find a message type, nested types included, by fully qualified name.
    pub fn find_qualified(&self, full_name: &str) -> Result<Arc<MessageDescriptor>> {
        let full_name = full_name.trim_start_matches('.');
        self.graph
            .files()
            .iter()
            .flat_map(|file| file.record().types.all_messages())
            .find(|m| m.full_name == full_name)
            .cloned()
            .ok_or_else(|| Error::TypeNotFound(full_name.to_string()))
    }

    /// Dotted names are looked up as fully qualified, bare names by simple
    /// name with first-match-wins.
    pub fn lookup(&self, name: &str) -> Result<Arc<MessageDescriptor>> {
        if name.contains('.') {
            self.find_qualified(name)
        } else {
            self.find_message_type(name)
        }
    }

    /// A blank instance of the given type.
    pub fn prototype(&self, descriptor: &Arc<MessageDescriptor>) -> DynamicMessage {
        DynamicMessage::new(Arc::clone(descriptor))
    }

    /// Resolve the message type of a message-typed field through the
    /// dependency closure of the file declaring `owner`.
    pub fn field_message_type(
        &self,
        owner: &MessageDescriptor,
        field: &str,
    ) -> Result<Arc<MessageDescriptor>> {
        let field = owner.require_field(field)?;
        self.resolve_field_message(owner, field)
    }

    /// A blank instance of a message-typed field's type.
    pub fn prototype_for_field(
        &self,
        owner: &MessageDescriptor,
        field: &str,
    ) -> Result<DynamicMessage> {
        let descriptor = self.field_message_type(owner, field)?;
        Ok(self.prototype(&descriptor))
    }

    /// Resolve the enum type of an enum-typed field.
    pub fn field_enum_type(
        &self,
        owner: &MessageDescriptor,
        field: &str,
    ) -> Result<Arc<EnumDescriptor>> {
        let field = owner.require_field(field)?;
        match &field.field_type {
            ProtoType::Enum(type_name) => self
                .owning_file(owner)?
                .find_enum(type_name)
                .ok_or_else(|| Error::TypeNotFound(type_name.clone())),
            other => Err(Error::InvalidFieldValue {
                field: field.name.clone(),
                expected: "enum".to_string(),
                actual: other.to_string(),
            }),
        }
    }

    /// Enum descriptor by fully qualified name, searched from `owner`'s file.
    pub fn enum_type(
        &self,
        owner: &MessageDescriptor,
        full_name: &str,
    ) -> Option<Arc<EnumDescriptor>> {
        self.owning_file(owner).ok()?.find_enum(full_name)
    }

    /// Serialize an instance to its wire encoding.
    pub fn encode(&self, message: &DynamicMessage) -> Result<Vec<u8>> {
        codec::encode(message)
    }

    /// Decode bytes as an instance of the given type.
    pub fn decode(
        &self,
        descriptor: &Arc<MessageDescriptor>,
        bytes: &[u8],
    ) -> Result<DynamicMessage> {
        let resolve = |owner: &MessageDescriptor, field: &FieldDescriptor| {
            self.resolve_field_message(owner, field)
        };
        Decoder::new(&resolve).decode(descriptor, bytes)
    }

    /// Proto3 JSON rendering with enum names resolved through the schema.
    pub fn to_json(&self, message: &DynamicMessage) -> serde_json::Value {
        let enums =
            |owner: &MessageDescriptor, full_name: &str| self.enum_type(owner, full_name);
        json::to_json(message, &enums)
    }

    fn resolve_field_message(
        &self,
        owner: &MessageDescriptor,
        field: &FieldDescriptor,
    ) -> Result<Arc<MessageDescriptor>> {
        match &field.field_type {
            ProtoType::Message(type_name) => self
                .owning_file(owner)?
                .find_message(type_name)
                .ok_or_else(|| Error::TypeNotFound(type_name.clone())),
            other => Err(Error::InvalidFieldValue {
                field: field.name.clone(),
                expected: "message".to_string(),
                actual: other.to_string(),
            }),
        }
    }

    fn owning_file(&self, owner: &MessageDescriptor) -> Result<&Arc<ResolvedFile>> {
        self.graph
            .file(&owner.file)
            .ok_or_else(|| Error::TypeNotFound(owner.full_name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ProtoFieldValue;
    use crate::store;
    use crate::testing;

    fn factory_for(files: &[(&str, &str)]) -> MessageFactory {
        let bytes = testing::compile_descriptor_set(files).unwrap();
        let graph = SchemaGraph::resolve(store::load(&bytes).unwrap());
        MessageFactory::new(Arc::new(graph))
    }

    fn fixture_factory() -> MessageFactory {
        factory_for(&[
            ("user.proto", testing::USER_PROTO),
            ("order.proto", testing::ORDER_PROTO),
        ])
    }

    #[test]
    fn test_find_message_type_is_deterministic() {
        let factory = fixture_factory();
        let first = factory.find_message_type("User").unwrap();
        let second = factory.find_message_type("User").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.full_name, "fixtures.users.User");
        assert_eq!(
            first.list_fields(),
            vec!["id", "name", "email", "tags", "type", "address"]
        );
    }

    #[test]
    fn test_find_message_type_not_found() {
        let factory = fixture_factory();
        assert!(matches!(
            factory.find_message_type("Invoice"),
            Err(Error::TypeNotFound(_))
        ));
    }

    #[test]
    fn test_colliding_names_first_match_wins() {
        let factory = factory_for(&[
            (
                "alpha.proto",
                r#"
                syntax = "proto3";
                package alpha;
                message Event { string a = 1; }
                "#,
            ),
            (
                "beta.proto",
                r#"
                syntax = "proto3";
                package beta;
                message Event { int64 b = 1; }
                "#,
            ),
        ]);

        let first_resolved = factory.graph().files()[0].package().to_string();
        let event = factory.find_message_type("Event").unwrap();
        assert_eq!(event.full_name, format!("{first_resolved}.Event"));

        let beta = factory.lookup("beta.Event").unwrap();
        assert_eq!(beta.list_fields(), vec!["b"]);
        let alpha = factory.find_qualified(".alpha.Event").unwrap();
        assert_eq!(alpha.list_fields(), vec!["a"]);
    }

    #[test]
    fn test_prototype_is_blank() {
        let factory = fixture_factory();
        let user = factory.find_message_type("User").unwrap();
        let instance = factory.prototype(&user);
        assert!(instance.fields().is_empty());
        assert!(Arc::ptr_eq(instance.descriptor(), &user));
    }

    #[test]
    fn test_field_types_resolve_across_files() {
        let factory = fixture_factory();
        let order = factory.find_message_type("Order").unwrap();

        let user = factory.field_message_type(&order, "user").unwrap();
        assert_eq!(user.full_name, "fixtures.users.User");
        assert_eq!(user.file, "user.proto");

        let item = factory.prototype_for_field(&order, "items").unwrap();
        assert_eq!(item.descriptor().name, "OrderItem");

        let status = factory.field_enum_type(&order, "status").unwrap();
        assert_eq!(status.value_by_name("CONFIRMED").unwrap(), 1);

        assert!(factory.field_message_type(&order, "status").is_err());
        assert!(factory.field_enum_type(&order, "missing").is_err());
    }

    #[test]
    fn test_types_in_unresolved_files_are_not_found() {
        let bytes = testing::fixture_descriptor_set().unwrap();
        let records: Vec<_> = store::load(&bytes)
            .unwrap()
            .into_iter()
            .filter(|r| r.name != "user.proto")
            .collect();
        let graph = SchemaGraph::resolve(records);
        assert_eq!(graph.unresolved_names(), vec!["order.proto"]);

        let factory = MessageFactory::new(Arc::new(graph));
        assert!(matches!(
            factory.find_message_type("Order"),
            Err(Error::TypeNotFound(_))
        ));
    }

    #[test]
    fn test_to_json_resolves_enum_names_across_files() {
        let factory = fixture_factory();
        let user_type = factory.find_qualified("fixtures.users.User").unwrap();
        let user = factory
            .prototype(&user_type)
            .with("id", ProtoFieldValue::Int32(1001))
            .unwrap()
            .with("type", ProtoFieldValue::Enum(2))
            .unwrap();

        let rendered = factory.to_json(&user);
        assert_eq!(rendered["id"], serde_json::json!(1001));
        assert_eq!(rendered["type"], serde_json::json!("REGULAR"));
        assert_eq!(rendered["tags"], serde_json::json!([]));
        assert!(rendered.get("address").is_none());
    }

    #[test]
    fn test_encode_decode_nested_round_trip() {
        let factory = fixture_factory();
        let order_type = factory.find_message_type("Order").unwrap();
        let user_type = factory.field_message_type(&order_type, "user").unwrap();

        let address = factory
            .prototype_for_field(&user_type, "address")
            .unwrap()
            .with("street", ProtoFieldValue::String("1 Elm St".to_string()))
            .unwrap()
            .with("zip_code", ProtoFieldValue::Int32(99999))
            .unwrap();
        let user = factory
            .prototype(&user_type)
            .with("id", ProtoFieldValue::Int32(7))
            .unwrap()
            .with("type", ProtoFieldValue::Enum(2))
            .unwrap()
            .with("address", ProtoFieldValue::Message(Box::new(address)))
            .unwrap();
        let mut order = factory
            .prototype(&order_type)
            .with("id", ProtoFieldValue::Int64(9000))
            .unwrap()
            .with("user", ProtoFieldValue::Message(Box::new(user)))
            .unwrap();
        for quantity in 1..=2 {
            let item = factory
                .prototype_for_field(&order_type, "items")
                .unwrap()
                .with("quantity", ProtoFieldValue::Int32(quantity))
                .unwrap();
            order
                .push("items", ProtoFieldValue::Message(Box::new(item)))
                .unwrap();
        }

        let bytes = factory.encode(&order).unwrap();
        let decoded = factory.decode(&order_type, &bytes).unwrap();
        assert_eq!(decoded, order);
    }
}
