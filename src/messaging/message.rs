//! # Broker Message Model
//!
//! Destinations, typed properties and the message kinds the stubber understands.
//! Messages are plain values: brokers stamp identity headers on send, handlers
//! read and copy them.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::advisory::AdvisoryEvent;
use crate::messaging::errors::{CodecError, CodecResult};

/// Whether a destination is point-to-point or publish/subscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    Queue,
    Topic,
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue => write!(f, "queue"),
            Self::Topic => write!(f, "topic"),
        }
    }
}

/// A resolved broker destination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Destination {
    Queue(String),
    Topic(String),
}

impl Destination {
    pub fn queue(name: impl Into<String>) -> Self {
        Self::Queue(name.into())
    }

    pub fn topic(name: impl Into<String>) -> Self {
        Self::Topic(name.into())
    }

    /// Name of the destination as known to the broker
    pub fn physical_name(&self) -> &str {
        match self {
            Self::Queue(name) | Self::Topic(name) => name,
        }
    }

    pub fn kind(&self) -> DestinationKind {
        match self {
            Self::Queue(_) => DestinationKind::Queue,
            Self::Topic(_) => DestinationKind::Topic,
        }
    }

    pub fn is_queue(&self) -> bool {
        matches!(self, Self::Queue(_))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.kind(), self.physical_name())
    }
}

/// Scalar value of a message property or map-body entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Integer view across all integral widths
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Byte(value) => Some(i64::from(*value)),
            Self::Short(value) => Some(i64::from(*value)),
            Self::Int(value) => Some(i64::from(*value)),
            Self::Long(value) => Some(*value),
            _ => None,
        }
    }

    /// Floating point view across all numeric widths
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(f64::from(*value)),
            Self::Double(value) => Some(*value),
            other => other.as_i64().map(|v| v as f64),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Short(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "'{v}'"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Concrete kind of a message, mirroring the body variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Headers and properties only
    Plain,
    Text,
    Map,
    Bytes,
    Object,
    Stream,
    /// Broker lifecycle notification
    Advisory,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Plain => "plain",
            Self::Text => "text",
            Self::Map => "map",
            Self::Bytes => "bytes",
            Self::Object => "object",
            Self::Stream => "stream",
            Self::Advisory => "advisory",
        };
        f.write_str(name)
    }
}

/// Kind-specific payload of a message
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Empty,
    Text(String),
    Map(BTreeMap<String, PropertyValue>),
    Bytes(Vec<u8>),
    Object(serde_json::Value),
    Stream(Vec<u8>),
    Advisory(AdvisoryEvent),
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Empty => MessageKind::Plain,
            Self::Text(_) => MessageKind::Text,
            Self::Map(_) => MessageKind::Map,
            Self::Bytes(_) => MessageKind::Bytes,
            Self::Object(_) => MessageKind::Object,
            Self::Stream(_) => MessageKind::Stream,
            Self::Advisory(_) => MessageKind::Advisory,
        }
    }

    /// Blank body for a kind, or `None` for kinds that cannot be created empty
    pub fn empty_for(kind: MessageKind) -> Option<Self> {
        match kind {
            MessageKind::Plain => Some(Self::Empty),
            MessageKind::Text => Some(Self::Text(String::new())),
            MessageKind::Map => Some(Self::Map(BTreeMap::new())),
            MessageKind::Bytes => Some(Self::Bytes(Vec::new())),
            MessageKind::Object => Some(Self::Object(serde_json::Value::Null)),
            MessageKind::Stream => Some(Self::Stream(Vec::new())),
            MessageKind::Advisory => None,
        }
    }
}

/// A broker message: identity headers, typed properties and a body
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    message_id: Option<String>,
    destination: Option<Destination>,
    reply_to: Option<Destination>,
    correlation_id: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    properties: BTreeMap<String, PropertyValue>,
    body: MessageBody,
}

impl Message {
    fn with_body(body: MessageBody) -> Self {
        Self {
            message_id: None,
            destination: None,
            reply_to: None,
            correlation_id: None,
            timestamp: None,
            properties: BTreeMap::new(),
            body,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::with_body(MessageBody::Text(text.into()))
    }

    pub fn map(entries: BTreeMap<String, PropertyValue>) -> Self {
        Self::with_body(MessageBody::Map(entries))
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::with_body(MessageBody::Bytes(bytes.into()))
    }

    pub fn object(value: serde_json::Value) -> Self {
        Self::with_body(MessageBody::Object(value))
    }

    pub fn stream(bytes: impl Into<Vec<u8>>) -> Self {
        Self::with_body(MessageBody::Stream(bytes.into()))
    }

    /// Message carrying no body
    pub fn plain() -> Self {
        Self::with_body(MessageBody::Empty)
    }

    pub fn advisory(event: AdvisoryEvent) -> Self {
        Self::with_body(MessageBody::Advisory(event))
    }

    /// Blank message of the given kind
    pub fn empty(kind: MessageKind) -> CodecResult<Self> {
        MessageBody::empty_for(kind)
            .map(Self::with_body)
            .ok_or_else(|| CodecError::unsupported_kind(kind))
    }

    /// Builder-style property insertion
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    #[must_use]
    pub fn with_reply_to(mut self, reply_to: Destination) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn set_message_id(&mut self, message_id: Option<String>) {
        self.message_id = message_id;
    }

    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    pub fn set_destination(&mut self, destination: Option<Destination>) {
        self.destination = destination;
    }

    pub fn reply_to(&self) -> Option<&Destination> {
        self.reply_to.as_ref()
    }

    pub fn set_reply_to(&mut self, reply_to: Option<Destination>) {
        self.reply_to = reply_to;
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn set_correlation_id(&mut self, correlation_id: Option<String>) {
        self.correlation_id = correlation_id;
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: Option<DateTime<Utc>>) {
        self.timestamp = timestamp;
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn bool_property(&self, name: &str) -> Option<bool> {
        self.property(name).and_then(PropertyValue::as_bool)
    }

    pub fn string_property(&self, name: &str) -> Option<&str> {
        self.property(name).and_then(PropertyValue::as_str)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    /// Set a property, rejecting names a selector could never address
    pub fn set_property(
        &mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> CodecResult<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CodecError::property_rejected(name, "property name is blank"));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(CodecError::property_rejected(
                name,
                "property name contains whitespace",
            ));
        }
        self.properties.insert(name, value.into());
        Ok(())
    }

    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    pub fn set_body(&mut self, body: MessageBody) {
        self.body = body;
    }

    /// Text body, if this is a text message
    pub fn text_body(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn advisory_event(&self) -> Option<&AdvisoryEvent> {
        match &self.body {
            MessageBody::Advisory(event) => Some(event),
            _ => None,
        }
    }
}
