//! # Advisory Events
//!
//! Lifecycle notifications a broker publishes on the well-known `advisory.*` topics.
//! The destination watcher consumes them as ordinary messages to discover queues that
//! were never declared up front.
//!
//! ## Usage
//!
//! ```rust
//! use mq_stubber::events::advisory::AdvisoryEvent;
//! use mq_stubber::messaging::message::Destination;
//!
//! let event = AdvisoryEvent::producer_created("producer-1", Destination::queue("orders"));
//! assert_eq!(event.queue_name(), Some("orders"));
//! assert_eq!(event.event_type(), "producer_created");
//! assert_eq!(event.advisory_topic(), "advisory.producer");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::advisory;
use crate::messaging::message::Destination;

/// Union of all broker lifecycle notifications
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AdvisoryEvent {
    ConnectionCreated(ConnectionCreatedEvent),
    DestinationCreated(DestinationCreatedEvent),
    ProducerCreated(ProducerCreatedEvent),
    ConsumerCreated(ConsumerCreatedEvent),
}

/// A client opened a connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionCreatedEvent {
    pub connection_id: String,
    pub created_at: DateTime<Utc>,
}

/// A queue or topic came into existence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DestinationCreatedEvent {
    pub destination: Destination,
    pub created_at: DateTime<Utc>,
}

/// A producer was opened on a destination
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProducerCreatedEvent {
    pub producer_id: String,
    pub destination: Destination,
    pub created_at: DateTime<Utc>,
}

/// A consumer was opened on a destination
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumerCreatedEvent {
    pub consumer_id: String,
    pub destination: Destination,
    pub created_at: DateTime<Utc>,
}

impl AdvisoryEvent {
    pub fn connection_created(connection_id: impl Into<String>) -> Self {
        Self::ConnectionCreated(ConnectionCreatedEvent {
            connection_id: connection_id.into(),
            created_at: Utc::now(),
        })
    }

    pub fn destination_created(destination: Destination) -> Self {
        Self::DestinationCreated(DestinationCreatedEvent {
            destination,
            created_at: Utc::now(),
        })
    }

    pub fn producer_created(producer_id: impl Into<String>, destination: Destination) -> Self {
        Self::ProducerCreated(ProducerCreatedEvent {
            producer_id: producer_id.into(),
            destination,
            created_at: Utc::now(),
        })
    }

    pub fn consumer_created(consumer_id: impl Into<String>, destination: Destination) -> Self {
        Self::ConsumerCreated(ConsumerCreatedEvent {
            consumer_id: consumer_id.into(),
            destination,
            created_at: Utc::now(),
        })
    }

    /// Destination the event is about, if any
    #[must_use]
    pub fn destination(&self) -> Option<&Destination> {
        match self {
            Self::ConnectionCreated(_) => None,
            Self::DestinationCreated(event) => Some(&event.destination),
            Self::ProducerCreated(event) => Some(&event.destination),
            Self::ConsumerCreated(event) => Some(&event.destination),
        }
    }

    /// Queue name the event identifies. Topics and connections yield `None`.
    #[must_use]
    pub fn queue_name(&self) -> Option<&str> {
        self.destination()
            .filter(|destination| destination.is_queue())
            .map(Destination::physical_name)
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ConnectionCreated(event) => event.created_at,
            Self::DestinationCreated(event) => event.created_at,
            Self::ProducerCreated(event) => event.created_at,
            Self::ConsumerCreated(event) => event.created_at,
        }
    }

    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ConnectionCreated(_) => "connection_created",
            Self::DestinationCreated(_) => "destination_created",
            Self::ProducerCreated(_) => "producer_created",
            Self::ConsumerCreated(_) => "consumer_created",
        }
    }

    /// Topic this kind of event is published on
    #[must_use]
    pub fn advisory_topic(&self) -> &'static str {
        match self {
            Self::ConnectionCreated(_) => advisory::CONNECTION_TOPIC,
            Self::DestinationCreated(_) => advisory::DESTINATION_TOPIC,
            Self::ProducerCreated(_) => advisory::PRODUCER_TOPIC,
            Self::ConsumerCreated(_) => advisory::CONSUMER_TOPIC,
        }
    }
}
