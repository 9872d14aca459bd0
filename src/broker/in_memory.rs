//! # In-Memory Broker
//!
//! Non-persistent broker used by the test suite and by the embedded stubber mode.
//!
//! ## Delivery model
//!
//! - **Queues**: each message goes to one consumer. The highest priority consumer whose
//!   selector accepts the message wins, round robin among equal priorities. Messages no
//!   consumer accepts stay pending in FIFO order and are re-offered whenever a consumer
//!   is created on the queue.
//! - **Topics**: every subscriber whose selector accepts the message gets a copy.
//!   Nothing is retained.
//! - **Advisories**: connection, destination, producer and consumer creation is
//!   published on the `advisory.*` topics.
//!
//! Routing happens under a single `parking_lot` mutex and never awaits. Listener
//! delivery runs on one tokio task per consumer, fed by an unbounded channel.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::{
    Connection, ConnectionFactory, ConsumerOptions, MessageConsumer, MessageListener,
    MessageProducer, Session,
};
use crate::constants::advisory::is_advisory_name;
use crate::constants::DEFAULT_BROKER_NAME;
use crate::events::advisory::AdvisoryEvent;
use crate::messaging::errors::{BrokerError, BrokerResult};
use crate::messaging::message::{Destination, Message};

/// Embedded broker handle. Clones share the same broker.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    name: String,
    advisories: AtomicBool,
    running: AtomicBool,
    state: Mutex<BrokerState>,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, QueueState>,
    topics: HashMap<String, TopicState>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Message>,
    consumers: Vec<ConsumerSlot>,
    cursor: usize,
}

#[derive(Default)]
struct TopicState {
    subscribers: Vec<ConsumerSlot>,
}

struct ConsumerSlot {
    id: String,
    options: ConsumerOptions,
    sender: mpsc::UnboundedSender<Message>,
}

impl QueueState {
    /// Hand the message to a consumer, or give it back if none will take it
    fn offer(&mut self, message: Message) -> Option<Message> {
        self.consumers.retain(|slot| !slot.sender.is_closed());

        let mut message = message;
        loop {
            let Some(best) = self
                .consumers
                .iter()
                .filter(|slot| slot.options.accepts(&message))
                .map(|slot| slot.options.priority)
                .max()
            else {
                return Some(message);
            };

            let candidates: Vec<usize> = self
                .consumers
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.options.priority == best && slot.options.accepts(&message))
                .map(|(index, _)| index)
                .collect();

            let pick = candidates[self.cursor % candidates.len()];
            self.cursor = self.cursor.wrapping_add(1);

            match self.consumers[pick].sender.send(message) {
                Ok(()) => return None,
                Err(mpsc::error::SendError(returned)) => {
                    self.consumers.remove(pick);
                    message = returned;
                }
            }
        }
    }

    fn enqueue(&mut self, message: Message) {
        if let Some(undelivered) = self.offer(message) {
            self.pending.push_back(undelivered);
        }
    }

    fn redeliver_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for message in pending {
            self.enqueue(message);
        }
    }
}

impl TopicState {
    fn publish(&mut self, message: &Message) {
        self.subscribers.retain(|slot| {
            !slot.options.accepts(message) || slot.sender.send(message.clone()).is_ok()
        });
    }
}

impl BrokerState {
    /// Returns whether the destination was created by this call
    fn ensure(&mut self, destination: &Destination) -> bool {
        match destination {
            Destination::Queue(name) => {
                if self.queues.contains_key(name) {
                    false
                } else {
                    self.queues.insert(name.clone(), QueueState::default());
                    true
                }
            }
            Destination::Topic(name) => {
                if self.topics.contains_key(name) {
                    false
                } else {
                    self.topics.insert(name.clone(), TopicState::default());
                    true
                }
            }
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(DEFAULT_BROKER_NAME)
    }
}

impl std::fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBroker")
            .field("name", &self.inner.name)
            .field("running", &self.is_running())
            .finish()
    }
}

impl InMemoryBroker {
    /// Create a stopped broker with advisories enabled
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                name: name.into(),
                advisories: AtomicBool::new(true),
                running: AtomicBool::new(false),
                state: Mutex::new(BrokerState::default()),
            }),
        }
    }

    /// Enable or disable advisory publication
    #[must_use]
    pub fn with_advisories(self, enabled: bool) -> Self {
        self.inner.advisories.store(enabled, Ordering::Release);
        self
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn start(&self) {
        if !self.inner.running.swap(true, Ordering::AcqRel) {
            info!(broker = %self.inner.name, "In-memory broker started");
        }
    }

    /// Stop the broker, dropping every destination, pending message and consumer
    pub fn stop(&self) {
        if self.inner.running.swap(false, Ordering::AcqRel) {
            let mut state = self.inner.state.lock();
            state.queues.clear();
            state.topics.clear();
            info!(broker = %self.inner.name, "In-memory broker stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Sorted names of every known queue
    pub fn queue_names(&self) -> Vec<String> {
        let state = self.inner.state.lock();
        let mut names: Vec<String> = state.queues.keys().cloned().collect();
        names.sort();
        names
    }

    /// Messages waiting on a queue for a consumer that will accept them
    pub fn pending_count(&self, queue: &str) -> usize {
        self.inner
            .state
            .lock()
            .queues
            .get(queue)
            .map_or(0, |queue| queue.pending.len())
    }

    /// Live consumers (or subscribers) on a destination
    pub fn consumer_count(&self, destination: &Destination) -> usize {
        let state = self.inner.state.lock();
        match destination {
            Destination::Queue(name) => state.queues.get(name).map_or(0, |queue| {
                queue
                    .consumers
                    .iter()
                    .filter(|slot| !slot.sender.is_closed())
                    .count()
            }),
            Destination::Topic(name) => state.topics.get(name).map_or(0, |topic| {
                topic
                    .subscribers
                    .iter()
                    .filter(|slot| !slot.sender.is_closed())
                    .count()
            }),
        }
    }

    fn ensure_running(&self) -> BrokerResult<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(BrokerError::not_running(&self.inner.name))
        }
    }

    fn ensure_destination(&self, destination: &Destination) -> BrokerResult<()> {
        validate_name(destination.physical_name())?;
        self.ensure_running()?;
        let created = self.inner.state.lock().ensure(destination);
        if created {
            debug!(broker = %self.inner.name, destination = %destination, "Destination created");
            self.advise(AdvisoryEvent::destination_created(destination.clone()));
        }
        Ok(())
    }

    fn deliver(&self, destination: &Destination, mut message: Message) -> BrokerResult<String> {
        self.ensure_destination(destination)?;

        let message_id = format!("ID:{}:{}", self.inner.name, Uuid::new_v4());
        message.set_message_id(Some(message_id.clone()));
        message.set_destination(Some(destination.clone()));
        message.set_timestamp(Some(Utc::now()));

        let mut state = self.inner.state.lock();
        match destination {
            Destination::Queue(name) => state.queues.entry(name.clone()).or_default().enqueue(message),
            Destination::Topic(name) => state.topics.entry(name.clone()).or_default().publish(&message),
        }
        Ok(message_id)
    }

    fn register_consumer(
        &self,
        destination: &Destination,
        options: ConsumerOptions,
    ) -> BrokerResult<(String, mpsc::UnboundedReceiver<Message>)> {
        self.ensure_destination(destination)?;

        let consumer_id = format!("ID:{}:consumer:{}", self.inner.name, Uuid::new_v4());
        let (sender, receiver) = mpsc::unbounded_channel();
        let slot = ConsumerSlot {
            id: consumer_id.clone(),
            options,
            sender,
        };

        {
            let mut state = self.inner.state.lock();
            match destination {
                Destination::Queue(name) => {
                    let queue = state.queues.entry(name.clone()).or_default();
                    queue.consumers.push(slot);
                    queue.redeliver_pending();
                }
                Destination::Topic(name) => {
                    state.topics.entry(name.clone()).or_default().subscribers.push(slot);
                }
            }
        }

        self.advise(AdvisoryEvent::consumer_created(
            consumer_id.clone(),
            destination.clone(),
        ));
        Ok((consumer_id, receiver))
    }

    fn remove_consumer(&self, destination: &Destination, consumer_id: &str) {
        let mut state = self.inner.state.lock();
        match destination {
            Destination::Queue(name) => {
                if let Some(queue) = state.queues.get_mut(name) {
                    queue.consumers.retain(|slot| slot.id != consumer_id);
                }
            }
            Destination::Topic(name) => {
                if let Some(topic) = state.topics.get_mut(name) {
                    topic.subscribers.retain(|slot| slot.id != consumer_id);
                }
            }
        }
    }

    /// Publish a lifecycle event on its advisory topic
    fn advise(&self, event: AdvisoryEvent) {
        if !self.inner.advisories.load(Ordering::Acquire) {
            return;
        }
        if event
            .destination()
            .is_some_and(|destination| is_advisory_name(destination.physical_name()))
        {
            return;
        }

        let topic = Destination::topic(event.advisory_topic());
        if let Err(e) = self.deliver(&topic, Message::advisory(event)) {
            warn!(broker = %self.inner.name, topic = %topic, error = %e, "Failed to publish advisory");
        }
    }
}

fn validate_name(name: &str) -> BrokerResult<()> {
    if name.trim().is_empty() {
        return Err(BrokerError::invalid_destination(name, "name is blank"));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(BrokerError::invalid_destination(
            name,
            "name contains whitespace",
        ));
    }
    Ok(())
}

#[async_trait]
impl ConnectionFactory for InMemoryBroker {
    async fn create_connection(&self) -> BrokerResult<Arc<dyn Connection>> {
        self.ensure_running()?;

        let connection = Arc::new(InMemoryConnection {
            connection_id: format!("ID:{}:connection:{}", self.inner.name, Uuid::new_v4()),
            broker: self.clone(),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            sessions: Mutex::new(Vec::new()),
        });
        debug!(connection_id = %connection.connection_id, "Connection created");
        self.advise(AdvisoryEvent::connection_created(
            connection.connection_id.clone(),
        ));
        Ok(connection)
    }
}

/// Connection to an [`InMemoryBroker`]
pub struct InMemoryConnection {
    connection_id: String,
    broker: InMemoryBroker,
    started: AtomicBool,
    closed: AtomicBool,
    sessions: Mutex<Vec<Arc<InMemorySession>>>,
}

impl InMemoryConnection {
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> BrokerResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::connection_closed(&self.connection_id));
        }
        self.broker.ensure_running()
    }
}

#[async_trait]
impl Connection for InMemoryConnection {
    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    async fn start(&self) -> BrokerResult<()> {
        self.ensure_open()?;
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    async fn create_session(&self) -> BrokerResult<Arc<dyn Session>> {
        self.ensure_open()?;

        let session = Arc::new(InMemorySession {
            session_id: format!("{}:session:{}", self.connection_id, Uuid::new_v4()),
            broker: self.broker.clone(),
            closed: AtomicBool::new(false),
            consumers: Mutex::new(Vec::new()),
            producers: Mutex::new(Vec::new()),
        });

        let mut sessions = self.sessions.lock();
        sessions.retain(|existing| !existing.is_closed());
        sessions.push(Arc::clone(&session));
        Ok(session)
    }

    async fn queue_names(&self) -> BrokerResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.broker.queue_names())
    }

    async fn close(&self) -> BrokerResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let sessions = std::mem::take(&mut *self.sessions.lock());
        for session in sessions {
            session.shutdown();
        }
        debug!(connection_id = %self.connection_id, "Connection closed");
        Ok(())
    }
}

/// Session on an [`InMemoryConnection`]
pub struct InMemorySession {
    session_id: String,
    broker: InMemoryBroker,
    closed: AtomicBool,
    consumers: Mutex<Vec<Arc<ConsumerInner>>>,
    producers: Mutex<Vec<Arc<ProducerInner>>>,
}

impl InMemorySession {
    fn ensure_open(&self) -> BrokerResult<()> {
        if self.is_closed() {
            return Err(BrokerError::session_closed(&self.session_id));
        }
        self.broker.ensure_running()
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let consumers = std::mem::take(&mut *self.consumers.lock());
        for consumer in consumers {
            consumer.shutdown();
        }
        let producers = std::mem::take(&mut *self.producers.lock());
        for producer in producers {
            producer.closed.store(true, Ordering::Release);
        }
    }
}

#[async_trait]
impl Session for InMemorySession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn create_queue(&self, name: &str) -> BrokerResult<Destination> {
        self.ensure_open()?;
        let destination = Destination::queue(name);
        self.broker.ensure_destination(&destination)?;
        Ok(destination)
    }

    async fn create_topic(&self, name: &str) -> BrokerResult<Destination> {
        self.ensure_open()?;
        let destination = Destination::topic(name);
        self.broker.ensure_destination(&destination)?;
        Ok(destination)
    }

    async fn create_consumer(
        &self,
        destination: &Destination,
        options: ConsumerOptions,
    ) -> BrokerResult<Box<dyn MessageConsumer>> {
        self.ensure_open()?;

        let (consumer_id, receiver) = self.broker.register_consumer(destination, options)?;
        let inner = Arc::new(ConsumerInner {
            consumer_id,
            destination: destination.clone(),
            broker: self.broker.clone(),
            closed: AtomicBool::new(false),
            receiver: tokio::sync::Mutex::new(Some(receiver)),
        });
        self.consumers.lock().push(Arc::clone(&inner));
        Ok(Box::new(InMemoryConsumer { inner }))
    }

    async fn create_producer(
        &self,
        destination: &Destination,
    ) -> BrokerResult<Box<dyn MessageProducer>> {
        self.ensure_open()?;
        self.broker.ensure_destination(destination)?;

        let producer_id = format!("{}:producer:{}", self.session_id, Uuid::new_v4());
        let inner = Arc::new(ProducerInner {
            destination: destination.clone(),
            broker: self.broker.clone(),
            closed: AtomicBool::new(false),
        });
        {
            let mut producers = self.producers.lock();
            producers.retain(|existing| !existing.closed.load(Ordering::Acquire));
            producers.push(Arc::clone(&inner));
        }
        self.broker
            .advise(AdvisoryEvent::producer_created(producer_id, destination.clone()));
        Ok(Box::new(InMemoryProducer { inner }))
    }

    async fn close(&self) -> BrokerResult<()> {
        self.shutdown();
        Ok(())
    }
}

struct ConsumerInner {
    consumer_id: String,
    destination: Destination,
    broker: InMemoryBroker,
    closed: AtomicBool,
    receiver: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
}

impl ConsumerInner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.broker.remove_consumer(&self.destination, &self.consumer_id);
        }
    }
}

/// Consumer created by an [`InMemorySession`]
pub struct InMemoryConsumer {
    inner: Arc<ConsumerInner>,
}

#[async_trait]
impl MessageConsumer for InMemoryConsumer {
    fn destination(&self) -> &Destination {
        &self.inner.destination
    }

    fn set_message_listener(&self, listener: Arc<dyn MessageListener>) -> BrokerResult<()> {
        if self.inner.is_closed() {
            return Err(BrokerError::consumer_closed(
                self.inner.destination.physical_name(),
            ));
        }

        let mut receiver = self
            .inner
            .receiver
            .try_lock()
            .ok()
            .and_then(|mut guard| guard.take())
            .ok_or_else(|| {
                BrokerError::listener_already_set(self.inner.destination.physical_name())
            })?;

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                // buffered messages for a closed consumer are discarded
                if inner.is_closed() || !inner.broker.is_running() {
                    continue;
                }
                listener.on_message(message).await;
            }
            debug!(
                consumer_id = %inner.consumer_id,
                destination = %inner.destination,
                "Listener delivery finished"
            );
        });
        Ok(())
    }

    async fn receive(&self, timeout: Duration) -> BrokerResult<Option<Message>> {
        let destination = self.inner.destination.physical_name();
        if self.inner.is_closed() {
            return Err(BrokerError::consumer_closed(destination));
        }

        let mut guard = self.inner.receiver.lock().await;
        let receiver = guard
            .as_mut()
            .ok_or_else(|| BrokerError::listener_already_set(destination))?;

        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(message)) if !self.inner.is_closed() => Ok(Some(message)),
            Ok(_) => Err(BrokerError::consumer_closed(destination)),
            Err(_elapsed) => Ok(None),
        }
    }

    async fn close(&self) -> BrokerResult<()> {
        self.inner.shutdown();
        Ok(())
    }
}

struct ProducerInner {
    destination: Destination,
    broker: InMemoryBroker,
    closed: AtomicBool,
}

/// Producer created by an [`InMemorySession`]
pub struct InMemoryProducer {
    inner: Arc<ProducerInner>,
}

#[async_trait]
impl MessageProducer for InMemoryProducer {
    fn destination(&self) -> &Destination {
        &self.inner.destination
    }

    async fn send(&self, message: Message) -> BrokerResult<String> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(BrokerError::producer_closed(
                self.inner.destination.physical_name(),
            ));
        }
        self.inner.broker.deliver(&self.inner.destination, message)
    }

    async fn close(&self) -> BrokerResult<()> {
        self.inner.closed.store(true, Ordering::Release);
        Ok(())
    }
}
