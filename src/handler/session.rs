//! # Handler Session
//!
//! Per-dispatch facade over one broker session. The dispatch engine opens one for each
//! inbound message, hands it to every handler in the chain and closes it once the chain
//! has finished.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::broker::{Connection, Session};
use crate::messaging::codec::copy_message;
use crate::messaging::errors::{BrokerResult, CodecResult};
use crate::messaging::message::{Destination, Message};

/// Target of a send: a name still to be resolved, or a destination already in hand
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DestinationRef<'a> {
    Name(&'a str),
    Resolved(&'a Destination),
}

impl<'a> From<&'a str> for DestinationRef<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a String> for DestinationRef<'a> {
    fn from(name: &'a String) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a Destination> for DestinationRef<'a> {
    fn from(destination: &'a Destination) -> Self {
        Self::Resolved(destination)
    }
}

/// Broker session scoped to a single message dispatch
pub struct HandlerSession {
    connection: Arc<dyn Connection>,
    session: Arc<dyn Session>,
    closed: AtomicBool,
}

impl std::fmt::Debug for HandlerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSession")
            .field("connection_id", &self.connection.connection_id())
            .field("session_id", &self.session.session_id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl HandlerSession {
    /// Open a dedicated broker session on `connection`
    pub async fn open(connection: Arc<dyn Connection>) -> BrokerResult<Self> {
        let session = connection.create_session().await?;
        Ok(Self {
            connection,
            session,
            closed: AtomicBool::new(false),
        })
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// The underlying broker session
    pub fn broker_session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    /// Resolve a name to a queue if the broker knows such a queue, else to a topic
    pub async fn resolve(&self, name: &str) -> BrokerResult<Destination> {
        let queues = self.connection.queue_names().await?;
        if queues.iter().any(|queue| queue == name) {
            self.queue(name).await
        } else {
            self.topic(name).await
        }
    }

    pub async fn queue(&self, name: &str) -> BrokerResult<Destination> {
        self.session.create_queue(name).await
    }

    pub async fn topic(&self, name: &str) -> BrokerResult<Destination> {
        self.session.create_topic(name).await
    }

    /// Send through a transient producer that is closed straight after
    pub async fn send<'a>(
        &self,
        target: impl Into<DestinationRef<'a>>,
        message: Message,
    ) -> BrokerResult<String> {
        let destination = match target.into() {
            DestinationRef::Name(name) => self.resolve(name).await?,
            DestinationRef::Resolved(destination) => destination.clone(),
        };

        let producer = self.session.create_producer(&destination).await?;
        let result = producer.send(message).await;
        if let Err(e) = producer.close().await {
            warn!(destination = %destination, error = %e, "Failed to close transient producer");
        }

        if let Ok(message_id) = &result {
            debug!(destination = %destination, message_id = %message_id, "Message sent");
        }
        result
    }

    pub async fn send_text<'a>(
        &self,
        target: impl Into<DestinationRef<'a>>,
        text: &str,
    ) -> BrokerResult<String> {
        self.send(target, Message::text(text)).await
    }

    /// Send a text message whose reply-to points at `reply_name`.
    ///
    /// Both names resolve queue first, then topic.
    pub async fn send_with_reply_to(
        &self,
        destination_name: &str,
        reply_name: &str,
        text: &str,
    ) -> BrokerResult<String> {
        let reply_to = self.resolve(reply_name).await?;
        let message = Message::text(text).with_reply_to(reply_to);
        self.send(destination_name, message).await
    }

    /// Duplicate a message for re-publication
    pub fn copy(&self, message: &Message) -> CodecResult<Message> {
        copy_message(self.session.as_ref(), message)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Release the broker session. Later calls are no-ops.
    pub async fn close(&self) -> BrokerResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.session.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::in_memory::InMemoryBroker;
    use crate::broker::{ConnectionFactory, ConsumerOptions};
    use crate::messaging::message::DestinationKind;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_millis(500);

    async fn open_session(broker: &InMemoryBroker) -> HandlerSession {
        let connection = broker.create_connection().await.unwrap();
        HandlerSession::open(connection).await.unwrap()
    }

    #[tokio::test]
    async fn test_resolve_prefers_existing_queue() {
        let broker = InMemoryBroker::new("session-test");
        broker.start();
        let session = open_session(&broker).await;

        session.queue("orders").await.unwrap();
        assert_eq!(
            session.resolve("orders").await.unwrap().kind(),
            DestinationKind::Queue
        );
        assert_eq!(
            session.resolve("prices").await.unwrap().kind(),
            DestinationKind::Topic
        );
    }

    #[tokio::test]
    async fn test_send_by_name_and_by_destination() {
        let broker = InMemoryBroker::new("session-test");
        broker.start();
        let session = open_session(&broker).await;
        let queue = session.queue("out").await.unwrap();

        let consumer = session
            .broker_session()
            .create_consumer(&queue, ConsumerOptions::new())
            .await
            .unwrap();

        session.send_text("out", "by name").await.unwrap();
        session.send_text(&queue, "by destination").await.unwrap();

        let first = consumer.receive(WAIT).await.unwrap().unwrap();
        let second = consumer.receive(WAIT).await.unwrap().unwrap();
        assert_eq!(first.text_body(), Some("by name"));
        assert_eq!(second.text_body(), Some("by destination"));
    }

    #[tokio::test]
    async fn test_send_with_reply_to() {
        let broker = InMemoryBroker::new("session-test");
        broker.start();
        let session = open_session(&broker).await;
        let requests = session.queue("requests").await.unwrap();
        session.queue("replies").await.unwrap();

        let consumer = session
            .broker_session()
            .create_consumer(&requests, ConsumerOptions::new())
            .await
            .unwrap();
        session
            .send_with_reply_to("requests", "replies", "ping")
            .await
            .unwrap();

        let received = consumer.receive(WAIT).await.unwrap().unwrap();
        assert_eq!(received.reply_to(), Some(&Destination::queue("replies")));
        assert_eq!(received.text_body(), Some("ping"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let broker = InMemoryBroker::new("session-test");
        broker.start();
        let session = open_session(&broker).await;

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(session.is_closed());
        assert!(session.broker_session().is_closed());
        assert!(session.send_text("anywhere", "late").await.is_err());
    }
}
