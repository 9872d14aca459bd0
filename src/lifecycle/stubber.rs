//! # Stubber
//!
//! Owns the broker connection and drives the stub through its lifecycle:
//! `Stopped -> Starting -> Running -> Stopping -> Stopped`.
//!
//! `start` opens the connection and a long-lived session, optionally starts the
//! destination watcher, then creates and attaches every declared queue. There is no
//! partial-start recovery: a failed step leaves the stubber `Failed` and it should be
//! discarded.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mq_stubber::broker::in_memory::InMemoryBroker;
//! use mq_stubber::config::{DestinationConfig, QueueConfig};
//! use mq_stubber::handler::ForwardingHandler;
//! use mq_stubber::lifecycle::Stubber;
//!
//! # async fn example() -> mq_stubber::error::Result<()> {
//! let config = DestinationConfig::builder()
//!     .add_queue(QueueConfig::new("in").with_handler(Arc::new(ForwardingHandler::to_queue("out"))))
//!     .build()?;
//!
//! let mut stubber = Stubber::with_embedded_broker(InMemoryBroker::new("test-broker"), config);
//! stubber.start().await?;
//! // ... exercise the system under test ...
//! stubber.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::broker::in_memory::InMemoryBroker;
use crate::broker::{Connection, ConnectionFactory, Session};
use crate::config::DestinationConfig;
use crate::dispatch::{DispatchEngine, DispatchStats};
use crate::error::{Result, StubberError};
use crate::events::watcher::{DestinationWatcher, WatcherStats};
use crate::lifecycle::states::StubberState;
use crate::registry::QueueRegistry;

/// Broker objects that only exist while the stubber is running
struct ActiveStub {
    connection: Arc<dyn Connection>,
    session: Arc<dyn Session>,
    engine: Arc<DispatchEngine>,
    registry: Arc<QueueRegistry>,
    watcher: Option<Arc<DestinationWatcher>>,
}

/// Stubs the queues a [`DestinationConfig`] describes
pub struct Stubber {
    factory: Arc<dyn ConnectionFactory>,
    embedded: Option<InMemoryBroker>,
    config: Arc<DestinationConfig>,
    state: StubberState,
    active: Option<ActiveStub>,
}

impl std::fmt::Debug for Stubber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stubber")
            .field("state", &self.state)
            .field("embedded_broker", &self.embedded.as_ref().map(InMemoryBroker::name))
            .field("queues", &self.config.queues().len())
            .field("dynamic_attachment", &self.config.dynamic_attachment())
            .finish()
    }
}

impl Stubber {
    /// Stubber for an externally managed broker
    pub fn new(factory: Arc<dyn ConnectionFactory>, config: DestinationConfig) -> Self {
        Self {
            factory,
            embedded: None,
            config: Arc::new(config),
            state: StubberState::Stopped,
            active: None,
        }
    }

    /// Stubber that starts `broker` before connecting and stops it after disconnecting
    pub fn with_embedded_broker(broker: InMemoryBroker, config: DestinationConfig) -> Self {
        Self {
            factory: Arc::new(broker.clone()),
            embedded: Some(broker),
            config: Arc::new(config),
            state: StubberState::Stopped,
            active: None,
        }
    }

    pub fn state(&self) -> StubberState {
        self.state
    }

    pub fn config(&self) -> &DestinationConfig {
        &self.config
    }

    /// Factory clients of the system under test should connect through
    pub fn connection_factory(&self) -> Arc<dyn ConnectionFactory> {
        Arc::clone(&self.factory)
    }

    pub fn embedded_broker(&self) -> Option<&InMemoryBroker> {
        self.embedded.as_ref()
    }

    /// Queue registry, present while running
    pub fn registry(&self) -> Option<&Arc<QueueRegistry>> {
        self.active.as_ref().map(|active| &active.registry)
    }

    pub fn dispatch_stats(&self) -> Option<DispatchStats> {
        self.active.as_ref().map(|active| active.engine.stats())
    }

    /// Watcher counters, present while running in dynamic attachment mode
    pub fn watcher_stats(&self) -> Option<WatcherStats> {
        self.active
            .as_ref()
            .and_then(|active| active.watcher.as_ref())
            .map(|watcher| watcher.stats())
    }

    /// Connect and attach every declared queue
    #[instrument(skip(self), fields(queues = self.config.queues().len()))]
    pub async fn start(&mut self) -> Result<()> {
        if self.state != StubberState::Stopped {
            return Err(StubberError::invalid_state(StubberState::Stopped, self.state));
        }

        info!("🚀 STUBBER: Starting");
        self.state = StubberState::Starting;

        match self.start_inner().await {
            Ok(active) => {
                self.active = Some(active);
                self.state = StubberState::Running;
                info!("✅ STUBBER: Running");
                Ok(())
            }
            Err(e) => {
                self.state = StubberState::Failed;
                warn!(error = %e, "❌ STUBBER: Start failed, instance must be discarded");
                Err(e)
            }
        }
    }

    async fn start_inner(&self) -> Result<ActiveStub> {
        if let Some(broker) = &self.embedded {
            broker.start();
        }

        let connection = self
            .factory
            .create_connection()
            .await
            .map_err(|e| StubberError::lifecycle("create_connection", e))?;
        connection
            .start()
            .await
            .map_err(|e| StubberError::lifecycle("start_connection", e))?;
        let session = connection
            .create_session()
            .await
            .map_err(|e| StubberError::lifecycle("create_session", e))?;

        let engine = Arc::new(DispatchEngine::new(
            Arc::clone(&connection),
            self.config.common_handlers().to_vec(),
        ));
        let registry = Arc::new(QueueRegistry::new(
            Arc::clone(&self.config),
            Arc::clone(&session),
            Arc::clone(&engine),
        ));

        let watcher = if self.config.dynamic_attachment() {
            let watcher = Arc::new(DestinationWatcher::new(Arc::clone(&registry)));
            watcher.start(&session).await;
            Some(watcher)
        } else {
            None
        };

        for queue in self.config.queues() {
            registry.ensure_attached(queue.name()).await?;
        }

        Ok(ActiveStub {
            connection,
            session,
            engine,
            registry,
            watcher,
        })
    }

    /// Close the session and connection
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<()> {
        if self.state != StubberState::Running {
            return Err(StubberError::invalid_state(StubberState::Running, self.state));
        }

        info!("🛑 STUBBER: Stopping");
        self.state = StubberState::Stopping;

        let Some(active) = self.active.take() else {
            self.state = StubberState::Failed;
            return Err(StubberError::invalid_state(StubberState::Running, StubberState::Stopped));
        };

        let stopped = Self::stop_inner(active).await;
        if let Some(broker) = &self.embedded {
            broker.stop();
        }

        match stopped {
            Ok(()) => {
                self.state = StubberState::Stopped;
                info!("✅ STUBBER: Stopped");
                Ok(())
            }
            Err(e) => {
                self.state = StubberState::Failed;
                warn!(error = %e, "❌ STUBBER: Stop failed");
                Err(e)
            }
        }
    }

    async fn stop_inner(active: ActiveStub) -> Result<()> {
        if let Some(watcher) = &active.watcher {
            watcher.stop().await;
        }
        active
            .session
            .close()
            .await
            .map_err(|e| StubberError::lifecycle("close_session", e))?;
        active
            .connection
            .close()
            .await
            .map_err(|e| StubberError::lifecycle("close_connection", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::handler::LoggingHandler;
    use crate::messaging::errors::{BrokerError, BrokerResult};
    use crate::messaging::message::Destination;

    fn single_queue_config(name: &str) -> DestinationConfig {
        DestinationConfig::builder()
            .add_queue(QueueConfig::new(name).with_handler(Arc::new(LoggingHandler::new())))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_attaches_declared_queues() {
        let broker = InMemoryBroker::new("stubber-start");
        let mut stubber = Stubber::with_embedded_broker(broker.clone(), single_queue_config("in"));
        assert_eq!(stubber.state(), StubberState::Stopped);
        assert!(stubber.registry().is_none());

        stubber.start().await.unwrap();
        assert_eq!(stubber.state(), StubberState::Running);
        assert!(broker.is_running());
        assert_eq!(broker.consumer_count(&Destination::queue("in")), 1);
        assert_eq!(
            stubber.registry().unwrap().attached_queues(),
            vec!["in".to_string()]
        );
        assert!(stubber.watcher_stats().is_none());
        assert_eq!(stubber.dispatch_stats().unwrap().messages_dispatched, 0);

        stubber.stop().await.unwrap();
        assert_eq!(stubber.state(), StubberState::Stopped);
        assert!(!broker.is_running());
        assert!(stubber.registry().is_none());
    }

    #[tokio::test]
    async fn test_state_guards() {
        let mut stubber = Stubber::with_embedded_broker(
            InMemoryBroker::new("stubber-guards"),
            DestinationConfig::default(),
        );

        let err = stubber.stop().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid stubber state: expected running, was stopped"
        );

        stubber.start().await.unwrap();
        assert!(matches!(
            stubber.start().await,
            Err(StubberError::InvalidState {
                expected: StubberState::Stopped,
                actual: StubberState::Running,
            })
        ));
        stubber.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stubber_can_restart_after_stop() {
        let broker = InMemoryBroker::new("stubber-restart");
        let mut stubber = Stubber::with_embedded_broker(broker.clone(), single_queue_config("in"));

        stubber.start().await.unwrap();
        stubber.stop().await.unwrap();
        stubber.start().await.unwrap();
        assert_eq!(broker.consumer_count(&Destination::queue("in")), 1);
        stubber.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_broker_fails_start() {
        // never started, so connections are refused
        let broker = InMemoryBroker::new("stubber-down");
        let mut stubber = Stubber::new(Arc::new(broker), DestinationConfig::default());

        let err = stubber.start().await.unwrap_err();
        assert!(matches!(err, StubberError::Lifecycle { .. }));
        assert_eq!(stubber.state(), StubberState::Failed);
        assert!(stubber.state().is_terminal());
        assert!(stubber.start().await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_queue_fails_start_with_attachment_error() {
        let mut stubber = Stubber::with_embedded_broker(
            InMemoryBroker::new("stubber-bad-queue"),
            single_queue_config("bad queue"),
        );

        assert!(matches!(
            stubber.start().await,
            Err(StubberError::Attachment { .. })
        ));
        assert_eq!(stubber.state(), StubberState::Failed);
    }

    /// Connection whose close always fails
    struct StuckConnection(Arc<dyn Connection>);

    #[async_trait::async_trait]
    impl Connection for StuckConnection {
        fn connection_id(&self) -> &str {
            self.0.connection_id()
        }

        async fn start(&self) -> BrokerResult<()> {
            self.0.start().await
        }

        async fn create_session(&self) -> BrokerResult<Arc<dyn Session>> {
            self.0.create_session().await
        }

        async fn queue_names(&self) -> BrokerResult<Vec<String>> {
            self.0.queue_names().await
        }

        async fn close(&self) -> BrokerResult<()> {
            Err(BrokerError::internal("connection refused to close"))
        }
    }

    struct StuckFactory(InMemoryBroker);

    #[async_trait::async_trait]
    impl ConnectionFactory for StuckFactory {
        async fn create_connection(&self) -> BrokerResult<Arc<dyn Connection>> {
            let inner = self.0.create_connection().await?;
            Ok(Arc::new(StuckConnection(inner)))
        }
    }

    #[tokio::test]
    async fn test_failed_stop_still_stops_embedded_broker() {
        let broker = InMemoryBroker::new("stubber-stuck");
        let mut stubber = Stubber::with_embedded_broker(broker.clone(), single_queue_config("in"));
        stubber.factory = Arc::new(StuckFactory(broker.clone()));

        stubber.start().await.unwrap();
        assert!(broker.is_running());

        let err = stubber.stop().await.unwrap_err();
        assert!(matches!(err, StubberError::Lifecycle { .. }));
        assert_eq!(stubber.state(), StubberState::Failed);
        assert!(!broker.is_running());
    }

    #[tokio::test]
    async fn test_dynamic_mode_starts_watcher() {
        let config = DestinationConfig::builder()
            .dynamic_attachment(true)
            .build()
            .unwrap();
        let mut stubber =
            Stubber::with_embedded_broker(InMemoryBroker::new("stubber-dynamic"), config);

        stubber.start().await.unwrap();
        let stats = stubber.watcher_stats().unwrap();
        assert_eq!(stats.topics_subscribed, 4);
        stubber.stop().await.unwrap();
    }
}
