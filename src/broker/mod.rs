//! # Broker Seam
//!
//! Provider-agnostic traits for the broker the stubber sits in front of. The stubber
//! only needs connections, sessions, transient producers and selector-filtered
//! priority consumers, so that is all this seam models.
//!
//! [`in_memory::InMemoryBroker`] is the embedded implementation used for tests and
//! for running the stubber without an external broker.

pub mod in_memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::constants::DEFAULT_CONSUMER_PRIORITY;
use crate::messaging::errors::{BrokerError, BrokerResult};
use crate::messaging::message::{Destination, Message, MessageKind};
use crate::messaging::selector::Selector;

/// Callback bound to a consumer in push mode
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_message(&self, message: Message);
}

/// Options applied when a consumer is created
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerOptions {
    /// Only messages the selector accepts are delivered to the consumer
    pub selector: Option<Selector>,
    /// Higher priority consumers are offered queue messages first
    pub priority: u8,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsumerOptions {
    pub fn new() -> Self {
        Self {
            selector: None,
            priority: DEFAULT_CONSUMER_PRIORITY,
        }
    }

    #[must_use]
    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = Some(selector);
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Whether a message passes this consumer's selector
    pub fn accepts(&self, message: &Message) -> bool {
        self.selector
            .as_ref()
            .map_or(true, |selector| selector.matches(message))
    }
}

/// Receiving end of a destination
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    fn destination(&self) -> &Destination;

    /// Switch the consumer to push mode. A consumer accepts a single listener.
    fn set_message_listener(&self, listener: Arc<dyn MessageListener>) -> BrokerResult<()>;

    /// Pull the next message, waiting at most `timeout`
    async fn receive(&self, timeout: Duration) -> BrokerResult<Option<Message>>;

    async fn close(&self) -> BrokerResult<()>;
}

/// Sending end of a destination
#[async_trait]
pub trait MessageProducer: Send + Sync {
    fn destination(&self) -> &Destination;

    /// Send a message, returning the id the broker assigned to it
    async fn send(&self, message: Message) -> BrokerResult<String>;

    async fn close(&self) -> BrokerResult<()>;
}

/// Single-threaded context for producing and consuming messages
#[async_trait]
pub trait Session: Send + Sync {
    fn session_id(&self) -> &str;

    fn is_closed(&self) -> bool;

    /// Blank message of the requested kind
    fn create_message(&self, kind: MessageKind) -> BrokerResult<Message> {
        if self.is_closed() {
            return Err(BrokerError::session_closed(self.session_id()));
        }
        Message::empty(kind).map_err(|e| BrokerError::internal(e.to_string()))
    }

    /// Create (or look up) a queue by name
    async fn create_queue(&self, name: &str) -> BrokerResult<Destination>;

    /// Create (or look up) a topic by name
    async fn create_topic(&self, name: &str) -> BrokerResult<Destination>;

    async fn create_consumer(
        &self,
        destination: &Destination,
        options: ConsumerOptions,
    ) -> BrokerResult<Box<dyn MessageConsumer>>;

    async fn create_producer(
        &self,
        destination: &Destination,
    ) -> BrokerResult<Box<dyn MessageProducer>>;

    /// Close the session and every consumer and producer it created
    async fn close(&self) -> BrokerResult<()>;
}

/// Live link to a broker
#[async_trait]
pub trait Connection: Send + Sync {
    fn connection_id(&self) -> &str;

    /// Begin delivery to listeners
    async fn start(&self) -> BrokerResult<()>;

    async fn create_session(&self) -> BrokerResult<Arc<dyn Session>>;

    /// Names of the queues the broker currently knows about
    async fn queue_names(&self) -> BrokerResult<Vec<String>>;

    async fn close(&self) -> BrokerResult<()>;
}

/// Entry point for opening connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create_connection(&self) -> BrokerResult<Arc<dyn Connection>>;
}
