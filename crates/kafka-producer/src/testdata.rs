//! Deterministic sample messages for the fixture topics.
//!
//! Every value is derived from the sample index, so the same index always
//! produces the same message (apart from the order timestamp, which is
//! relative to a reference time).

use crate::error::{ProducerError, Result};
use chrono::Utc;
use proto_schema::{DynamicMessage, MessageDescriptor, MessageFactory, ProtoFieldValue};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_USER_TOPIC: &str = "user-events";
pub const DEFAULT_ORDER_TOPIC: &str = "order-events";

const HOUR_MS: i64 = 3_600_000;

/// Topics the corpus is routed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleTopics {
    pub user_topic: String,
    pub order_topic: String,
}

impl Default for SampleTopics {
    fn default() -> Self {
        Self {
            user_topic: DEFAULT_USER_TOPIC.to_string(),
            order_topic: DEFAULT_ORDER_TOPIC.to_string(),
        }
    }
}

/// One serialized sample bound for a topic.
#[derive(Debug, Clone)]
pub struct Sample {
    pub topic: String,
    /// Human-readable label, e.g. "User 0"
    pub description: String,
    pub message: DynamicMessage,
    pub payload: Vec<u8>,
}

/// Fills blank `User` and `Order` instances with index-derived values.
#[derive(Debug, Clone)]
pub struct SampleBuilder {
    factory: MessageFactory,
    user_type: Arc<MessageDescriptor>,
    order_type: Arc<MessageDescriptor>,
    reference_ms: i64,
}

impl SampleBuilder {
    /// Look up the `User` and `Order` types by simple name.
    pub fn new(factory: MessageFactory) -> Result<Self> {
        let user_type = factory.find_message_type("User")?;
        let order_type = factory.find_message_type("Order")?;
        debug!(
            "Sample types: {} and {}",
            user_type.full_name, order_type.full_name
        );
        Ok(Self {
            factory,
            user_type,
            order_type,
            reference_ms: Utc::now().timestamp_millis(),
        })
    }

    /// Pin the time order timestamps are counted back from.
    pub fn with_reference_ms(mut self, reference_ms: i64) -> Self {
        self.reference_ms = reference_ms;
        self
    }

    pub fn factory(&self) -> &MessageFactory {
        &self.factory
    }

    pub fn user(&self, i: u32) -> Result<DynamicMessage> {
        let address = self.address(
            &self.user_type,
            format!("{} Main St", 100 + 10 * u64::from(i)),
            if i % 2 == 0 { "Springfield" } else { "Anytown" },
            offset(12345, i)?,
        )?;
        let tags = vec![
            ProtoFieldValue::String(format!("tag{i}")),
            ProtoFieldValue::String("test".to_string()),
        ];
        let user_type = if i % 2 == 0 { "ADMIN" } else { "REGULAR" };

        let user = self
            .factory
            .prototype(&self.user_type)
            .with("id", ProtoFieldValue::Int32(offset(1000, i)?))?
            .with("name", ProtoFieldValue::String(format!("User {i}")))?
            .with("email", ProtoFieldValue::String(format!("user{i}@example.com")))?
            .with("tags", ProtoFieldValue::Repeated(tags))?
            .with("type", self.enum_value(&self.user_type, "type", user_type)?)?
            .with("address", ProtoFieldValue::Message(Box::new(address)))?;
        Ok(user)
    }

    /// The user embedded in order `i`.
    pub fn customer(&self, i: u32) -> Result<DynamicMessage> {
        let customer_type = self.factory.field_message_type(&self.order_type, "user")?;
        let address = self.address(
            &customer_type,
            format!("{} Oak Ave", 500 + 20 * u64::from(i)),
            "Commerce City",
            offset(54321, i)?,
        )?;

        let customer = self
            .factory
            .prototype(&customer_type)
            .with("id", ProtoFieldValue::Int32(offset(2000, i)?))?
            .with("name", ProtoFieldValue::String(format!("Customer {i}")))?
            .with(
                "email",
                ProtoFieldValue::String(format!("customer{i}@example.com")),
            )?
            .with("type", self.enum_value(&customer_type, "type", "REGULAR")?)?
            .with("address", ProtoFieldValue::Message(Box::new(address)))?;
        Ok(customer)
    }

    pub fn order_item(&self, i: u32) -> Result<DynamicMessage> {
        let item = self
            .factory
            .prototype_for_field(&self.order_type, "items")?
            .with(
                "product_id",
                ProtoFieldValue::String(format!("PROD-{}", 1000 + u64::from(i))),
            )?
            .with("product_name", ProtoFieldValue::String(format!("Product {i}")))?
            .with("quantity", ProtoFieldValue::Int32(offset(1, i)?))?
            .with("unit_price", ProtoFieldValue::Double(19.99 + 5.0 * f64::from(i)))?;
        Ok(item)
    }

    pub fn order(&self, i: u32) -> Result<DynamicMessage> {
        let customer = self.customer(i)?;
        let item = self.order_item(i)?;

        let order = self
            .factory
            .prototype(&self.order_type)
            .with("id", ProtoFieldValue::Int64(9000 + i64::from(i)))?
            .with("user", ProtoFieldValue::Message(Box::new(customer)))?
            .with(
                "items",
                ProtoFieldValue::Repeated(vec![ProtoFieldValue::Message(Box::new(item))]),
            )?
            .with(
                "total_amount",
                ProtoFieldValue::Double(99.99 + 25.5 * f64::from(i)),
            )?
            .with(
                "status",
                self.enum_value(&self.order_type, "status", "CONFIRMED")?,
            )?
            .with(
                "created_timestamp",
                ProtoFieldValue::Int64(self.reference_ms - i64::from(i) * HOUR_MS),
            )?;
        Ok(order)
    }

    /// `users` user samples followed by `orders` order samples, serialized.
    pub fn corpus(&self, users: u32, orders: u32, topics: &SampleTopics) -> Result<Vec<Sample>> {
        let mut samples = Vec::new();
        for i in 0..users {
            let user = self.user(i)?;
            samples.push(self.sample(&topics.user_topic, format!("User {i}"), user)?);
        }
        for i in 0..orders {
            let order = self.order(i)?;
            samples.push(self.sample(&topics.order_topic, format!("Order {i}"), order)?);
        }
        Ok(samples)
    }

    fn sample(&self, topic: &str, description: String, message: DynamicMessage) -> Result<Sample> {
        let payload = self.factory.encode(&message)?;
        debug!(
            "{} ({} bytes): {}",
            description,
            payload.len(),
            self.factory.to_json(&message)
        );
        Ok(Sample {
            topic: topic.to_string(),
            description,
            message,
            payload,
        })
    }

    fn address(
        &self,
        owner: &MessageDescriptor,
        street: String,
        city: &str,
        zip_code: i32,
    ) -> Result<DynamicMessage> {
        let address = self
            .factory
            .prototype_for_field(owner, "address")?
            .with("street", ProtoFieldValue::String(street))?
            .with("city", ProtoFieldValue::String(city.to_string()))?
            .with("country", ProtoFieldValue::String("USA".to_string()))?
            .with("zip_code", ProtoFieldValue::Int32(zip_code))?;
        Ok(address)
    }

    fn enum_value(
        &self,
        owner: &MessageDescriptor,
        field: &str,
        value: &str,
    ) -> Result<ProtoFieldValue> {
        let number = self
            .factory
            .field_enum_type(owner, field)?
            .value_by_name(value)?;
        Ok(ProtoFieldValue::Enum(number))
    }
}

/// `base + i` as an int32 field value.
fn offset(base: i32, i: u32) -> Result<i32> {
    i32::try_from(i)
        .ok()
        .and_then(|i| base.checked_add(i))
        .ok_or(ProducerError::IndexOutOfRange(i))
}
