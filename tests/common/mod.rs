//! Shared helpers for the stubber integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use mq_stubber::broker::{Connection, ConsumerOptions, MessageConsumer, Session};
use mq_stubber::error::{HandlerError, HandlerResult};
use mq_stubber::handler::{HandlerSession, MessageHandler};
use mq_stubber::messaging::{Destination, Message};
use mq_stubber::Stubber;

pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(2);

/// Short wait used to assert that nothing else arrives
pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

/// Client connection and session through the stubber's broker, as the system under
/// test would open them
pub async fn client_session(
    stubber: &Stubber,
) -> anyhow::Result<(Arc<dyn Connection>, Arc<dyn Session>)> {
    let connection = stubber.connection_factory().create_connection().await?;
    connection.start().await?;
    let session = connection.create_session().await?;
    Ok((connection, session))
}

pub async fn send_text(session: &Arc<dyn Session>, queue: &str, text: &str) -> anyhow::Result<String> {
    let producer = session.create_producer(&Destination::queue(queue)).await?;
    let message_id = producer.send(Message::text(text)).await?;
    producer.close().await?;
    Ok(message_id)
}

pub async fn queue_consumer(
    session: &Arc<dyn Session>,
    queue: &str,
) -> anyhow::Result<Box<dyn MessageConsumer>> {
    Ok(session
        .create_consumer(&Destination::queue(queue), ConsumerOptions::new())
        .await?)
}

pub async fn receive(consumer: &dyn MessageConsumer) -> anyhow::Result<Option<Message>> {
    Ok(consumer.receive(RECEIVE_TIMEOUT).await?)
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Appends its label to a shared journal for every message
pub struct RecordingHandler {
    label: String,
    journal: Arc<Mutex<Vec<String>>>,
}

impl RecordingHandler {
    pub fn new(label: &str, journal: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            journal: Arc::clone(journal),
        })
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, _session: &HandlerSession, _message: &Message) -> HandlerResult {
        self.journal.lock().push(self.label.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.label
    }
}

pub struct FailingHandler;

#[async_trait]
impl MessageHandler for FailingHandler {
    async fn handle(&self, _session: &HandlerSession, _message: &Message) -> HandlerResult {
        Err(HandlerError::failed("simulated handler failure"))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

pub struct PanickingHandler;

#[async_trait]
impl MessageHandler for PanickingHandler {
    async fn handle(&self, _session: &HandlerSession, _message: &Message) -> HandlerResult {
        panic!("simulated handler panic");
    }

    fn name(&self) -> &str {
        "panicking"
    }
}
