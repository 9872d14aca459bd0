//! # Destination Watcher
//!
//! Discovers queues from broker advisories and attaches the stub to them.
//!
//! The watcher subscribes to the connection, destination, producer and consumer
//! advisory topics. Every advisory that names a queue triggers
//! [`QueueRegistry::ensure_attached`], which is idempotent, so duplicate or racing
//! notifications for the same queue are harmless. Attachment failures are logged and
//! counted; the queue stays unattached until a later advisory retries it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::broker::{ConsumerOptions, MessageConsumer, MessageListener, Session};
use crate::constants::advisory::ALL_TOPICS;
use crate::error::Result;
use crate::events::advisory::AdvisoryEvent;
use crate::logging::log_error;
use crate::messaging::message::{Destination, Message};
use crate::registry::QueueRegistry;

/// Watcher statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WatcherStats {
    pub topics_subscribed: usize,
    pub events_received: u64,
    /// Events that named a queue
    pub queue_events: u64,
    pub attachments: u64,
    pub attach_errors: u64,
    /// Messages on advisory topics that carried no advisory
    pub non_advisory_payloads: u64,
    pub last_event_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
}

/// Attaches the stub to queues announced by advisories
pub struct DestinationWatcher {
    registry: Arc<QueueRegistry>,
    stats: RwLock<WatcherStats>,
    consumers: Mutex<Vec<Box<dyn MessageConsumer>>>,
}

impl std::fmt::Debug for DestinationWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationWatcher")
            .field("stats", &*self.stats.read())
            .finish()
    }
}

impl DestinationWatcher {
    pub fn new(registry: Arc<QueueRegistry>) -> Self {
        Self {
            registry,
            stats: RwLock::new(WatcherStats::default()),
            consumers: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to every advisory topic.
    ///
    /// A topic that cannot be subscribed is logged and skipped. Returns how many
    /// subscriptions succeeded.
    pub async fn start(self: &Arc<Self>, session: &Arc<dyn Session>) -> usize {
        let mut subscribed = 0;

        for topic in ALL_TOPICS {
            let destination = Destination::topic(topic);
            let consumer = match session
                .create_consumer(&destination, ConsumerOptions::new())
                .await
            {
                Ok(consumer) => consumer,
                Err(e) => {
                    log_error("destination_watcher", "subscribe", &e.to_string(), Some(topic));
                    continue;
                }
            };

            let listener: Arc<dyn MessageListener> = Arc::clone(self) as Arc<dyn MessageListener>;
            if let Err(e) = consumer.set_message_listener(listener) {
                log_error("destination_watcher", "bind_listener", &e.to_string(), Some(topic));
                let _ = consumer.close().await;
                continue;
            }

            self.consumers.lock().push(consumer);
            subscribed += 1;
        }

        self.stats.write().topics_subscribed = subscribed;
        info!(topics = subscribed, "Destination watcher started");
        subscribed
    }

    /// Close every advisory subscription
    pub async fn stop(&self) {
        let consumers = std::mem::take(&mut *self.consumers.lock());
        for consumer in consumers {
            if let Err(e) = consumer.close().await {
                warn!(destination = %consumer.destination(), error = %e, "Failed to close advisory consumer");
            }
        }
    }

    /// Attach the queue an advisory names, if any.
    ///
    /// Returns whether this event performed the attachment.
    pub async fn handle_event(&self, event: &AdvisoryEvent) -> Result<bool> {
        {
            let mut stats = self.stats.write();
            stats.events_received += 1;
            stats.last_event_at = Some(Utc::now());
        }

        let Some(queue_name) = event.queue_name() else {
            debug!(event_type = event.event_type(), "Ignoring advisory without a queue");
            return Ok(false);
        };
        self.stats.write().queue_events += 1;

        match self.registry.ensure_attached(queue_name).await {
            Ok(attached) => {
                if attached {
                    self.stats.write().attachments += 1;
                    info!(
                        queue_name = %queue_name,
                        event_type = event.event_type(),
                        "Attached to discovered queue"
                    );
                }
                Ok(attached)
            }
            Err(e) => {
                {
                    let mut stats = self.stats.write();
                    stats.attach_errors += 1;
                    stats.last_error_at = Some(Utc::now());
                }
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> WatcherStats {
        self.stats.read().clone()
    }
}

#[async_trait]
impl MessageListener for DestinationWatcher {
    async fn on_message(&self, message: Message) {
        let Some(event) = message.advisory_event() else {
            self.stats.write().non_advisory_payloads += 1;
            warn!(
                destination = ?message.destination().map(ToString::to_string),
                kind = %message.kind(),
                "Ignoring non-advisory message on advisory topic"
            );
            return;
        };

        if let Err(e) = self.handle_event(event).await {
            log_error(
                "destination_watcher",
                "ensure_attached",
                &e.to_string(),
                event.queue_name(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::in_memory::InMemoryBroker;
    use crate::broker::ConnectionFactory;
    use crate::config::DestinationConfig;
    use crate::dispatch::DispatchEngine;

    async fn watcher_for(broker: &InMemoryBroker) -> (Arc<DestinationWatcher>, Arc<dyn Session>) {
        let connection = broker.create_connection().await.unwrap();
        let session = connection.create_session().await.unwrap();
        let engine = Arc::new(DispatchEngine::new(connection, Vec::new()));
        let registry = Arc::new(QueueRegistry::new(
            Arc::new(DestinationConfig::default()),
            Arc::clone(&session),
            engine,
        ));
        (Arc::new(DestinationWatcher::new(registry)), session)
    }

    #[tokio::test]
    async fn test_queue_events_attach_and_topics_are_ignored() {
        let broker = InMemoryBroker::new("watcher-test");
        broker.start();
        let (watcher, _session) = watcher_for(&broker).await;

        let attached = watcher
            .handle_event(&AdvisoryEvent::producer_created("p-1", Destination::queue("orders")))
            .await
            .unwrap();
        assert!(attached);

        let again = watcher
            .handle_event(&AdvisoryEvent::destination_created(Destination::queue("orders")))
            .await
            .unwrap();
        assert!(!again);

        let topic = watcher
            .handle_event(&AdvisoryEvent::consumer_created("c-1", Destination::topic("prices")))
            .await
            .unwrap();
        assert!(!topic);

        let connection = watcher
            .handle_event(&AdvisoryEvent::connection_created("conn-1"))
            .await
            .unwrap();
        assert!(!connection);

        let stats = watcher.stats();
        assert_eq!(stats.events_received, 4);
        assert_eq!(stats.queue_events, 2);
        assert_eq!(stats.attachments, 1);
        assert!(stats.last_event_at.is_some());
    }

    #[tokio::test]
    async fn test_attach_errors_are_counted() {
        let broker = InMemoryBroker::new("watcher-errors");
        broker.start();
        let (watcher, _session) = watcher_for(&broker).await;

        let result = watcher
            .handle_event(&AdvisoryEvent::destination_created(Destination::queue("bad name")))
            .await;
        assert!(result.is_err());
        assert_eq!(watcher.stats().attach_errors, 1);
        assert!(watcher.stats().last_error_at.is_some());
    }

    #[tokio::test]
    async fn test_start_subscribes_to_all_topics() {
        let broker = InMemoryBroker::new("watcher-start");
        broker.start();
        let (watcher, session) = watcher_for(&broker).await;

        assert_eq!(watcher.start(&session).await, ALL_TOPICS.len());
        for topic in ALL_TOPICS {
            assert_eq!(broker.consumer_count(&Destination::topic(topic)), 1);
        }

        watcher.stop().await;
        for topic in ALL_TOPICS {
            assert_eq!(broker.consumer_count(&Destination::topic(topic)), 0);
        }
    }

    #[tokio::test]
    async fn test_start_on_closed_session_subscribes_nothing() {
        let broker = InMemoryBroker::new("watcher-closed");
        broker.start();
        let (watcher, session) = watcher_for(&broker).await;
        session.close().await.unwrap();

        assert_eq!(watcher.start(&session).await, 0);
        assert_eq!(watcher.stats().topics_subscribed, 0);
    }
}
