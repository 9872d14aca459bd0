use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{HandlerError, HandlerResult};
use crate::handler::{HandlerSession, MessageHandler};
use crate::messaging::message::Message;

/// Keeps every message it handles, grouped by destination name.
///
/// Clones share the same store, so a test can keep one clone for assertions while
/// another sits in a handler chain.
#[derive(Debug, Clone, Default)]
pub struct MessageCollectingHandler {
    received: Arc<DashMap<String, Vec<Message>>>,
}

impl MessageCollectingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages collected for a destination, oldest first
    pub fn received(&self, destination: &str) -> Vec<Message> {
        self.received
            .get(destination)
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// Snapshot of everything collected so far
    pub fn received_all(&self) -> HashMap<String, Vec<Message>> {
        self.received
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn count(&self, destination: &str) -> usize {
        self.received
            .get(destination)
            .map_or(0, |messages| messages.len())
    }

    pub fn clear(&self) {
        self.received.clear();
    }
}

#[async_trait]
impl MessageHandler for MessageCollectingHandler {
    async fn handle(&self, _session: &HandlerSession, message: &Message) -> HandlerResult {
        let destination = message
            .destination()
            .ok_or_else(|| HandlerError::missing_destination("collect"))?;

        self.received
            .entry(destination.physical_name().to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "collect"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::in_memory::InMemoryBroker;
    use crate::broker::ConnectionFactory;
    use crate::messaging::message::Destination;

    async fn open_session() -> HandlerSession {
        let broker = InMemoryBroker::new("collect-test");
        broker.start();
        let connection = broker.create_connection().await.unwrap();
        HandlerSession::open(connection).await.unwrap()
    }

    fn message_on(queue: &str, text: &str) -> Message {
        let mut message = Message::text(text);
        message.set_destination(Some(Destination::queue(queue)));
        message
    }

    #[tokio::test]
    async fn test_collects_by_destination() {
        let session = open_session().await;
        let collector = MessageCollectingHandler::new();
        let handle = collector.clone();

        collector.handle(&session, &message_on("in", "a")).await.unwrap();
        collector.handle(&session, &message_on("in", "b")).await.unwrap();
        collector.handle(&session, &message_on("out", "c")).await.unwrap();

        assert_eq!(handle.count("in"), 2);
        assert_eq!(handle.count("out"), 1);
        assert_eq!(handle.count("missing"), 0);
        assert_eq!(handle.received("in")[1].text_body(), Some("b"));
        assert_eq!(handle.received_all().len(), 2);

        handle.clear();
        assert_eq!(collector.count("in"), 0);
    }

    #[tokio::test]
    async fn test_message_without_destination_fails() {
        let session = open_session().await;
        let collector = MessageCollectingHandler::new();

        let result = collector.handle(&session, &Message::text("nowhere")).await;
        assert!(matches!(result, Err(HandlerError::MissingDestination { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_collection() {
        let session = Arc::new(open_session().await);
        let collector = MessageCollectingHandler::new();

        let mut tasks = Vec::new();
        for i in 0..50 {
            let session = Arc::clone(&session);
            let collector = collector.clone();
            tasks.push(tokio::spawn(async move {
                collector
                    .handle(&session, &message_on("busy", &i.to_string()))
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(collector.count("busy"), 50);
    }
}
