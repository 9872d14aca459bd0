//! End-to-end stubbing of statically declared queues on the embedded broker

mod common;

use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;

use common::*;
use mq_stubber::config::{DestinationConfig, QueueConfig};
use mq_stubber::handler::{ForwardingHandler, MessageHandler};
use mq_stubber::{InMemoryBroker, Stubber, StubberError, StubberState, PROCESSED_PROPERTY};

#[tokio::test]
async fn forwards_to_out_and_republishes_marked_copy_to_in() -> anyhow::Result<()> {
    let config = DestinationConfig::builder()
        .add_queue(QueueConfig::new("in").with_handler(Arc::new(ForwardingHandler::to_queue("out"))))
        .build()?;
    let mut stubber = Stubber::with_embedded_broker(InMemoryBroker::new("scenario-forward"), config);
    stubber.start().await?;

    let (_connection, session) = client_session(&stubber).await?;
    let out = queue_consumer(&session, "out").await?;
    let real_consumer = queue_consumer(&session, "in").await?;

    send_text(&session, "in", "hello").await?;

    let forwarded = receive(out.as_ref()).await?.context("nothing forwarded to out")?;
    assert_eq!(forwarded.text_body(), Some("hello"));
    assert!(!forwarded.has_property(PROCESSED_PROPERTY));

    let republished = receive(real_consumer.as_ref())
        .await?
        .context("marked copy never reached in")?;
    assert_eq!(republished.text_body(), Some("hello"));
    assert_eq!(republished.bool_property(PROCESSED_PROPERTY), Some(true));

    // the marked copy must not run the chain again
    assert!(out.receive(QUIET_PERIOD).await?.is_none());
    assert!(wait_until(RECEIVE_TIMEOUT, || {
        stubber.dispatch_stats().is_some_and(|s| s.messages_dispatched == 1)
    })
    .await);
    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(stubber.dispatch_stats().map(|s| s.messages_dispatched), Some(1));

    stubber.stop().await?;
    Ok(())
}

#[tokio::test]
async fn marked_copy_waits_for_a_late_application_consumer() -> anyhow::Result<()> {
    let config = DestinationConfig::builder()
        .add_queue(QueueConfig::new("in").with_handler(Arc::new(ForwardingHandler::to_queue("out"))))
        .build()?;
    let broker = InMemoryBroker::new("scenario-late-consumer");
    let mut stubber = Stubber::with_embedded_broker(broker.clone(), config);
    stubber.start().await?;

    let (_connection, session) = client_session(&stubber).await?;
    send_text(&session, "in", "early").await?;
    assert!(wait_until(RECEIVE_TIMEOUT, || broker.pending_count("in") == 1).await);

    let real_consumer = queue_consumer(&session, "in").await?;
    let republished = receive(real_consumer.as_ref())
        .await?
        .context("marked copy was dropped")?;
    assert_eq!(republished.text_body(), Some("early"));
    assert_eq!(republished.bool_property(PROCESSED_PROPERTY), Some(true));

    // nobody consumed "out" yet either
    let out = queue_consumer(&session, "out").await?;
    let forwarded = receive(out.as_ref()).await?.context("forwarded copy was dropped")?;
    assert_eq!(forwarded.text_body(), Some("early"));

    stubber.stop().await?;
    Ok(())
}

#[tokio::test]
async fn common_handlers_run_before_queue_handlers() -> anyhow::Result<()> {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let config = DestinationConfig::builder()
        .add_common_handler(RecordingHandler::new("a", &journal))
        .add_common_handler(RecordingHandler::new("b", &journal))
        .add_queue(QueueConfig::new("in").with_handler(RecordingHandler::new("c", &journal)))
        .build()?;
    let mut stubber = Stubber::with_embedded_broker(InMemoryBroker::new("scenario-order"), config);
    stubber.start().await?;

    let (_connection, session) = client_session(&stubber).await?;
    let real_consumer = queue_consumer(&session, "in").await?;

    for text in ["one", "two", "three"] {
        send_text(&session, "in", text).await?;
    }

    let mut republished = Vec::new();
    for _ in 0..3 {
        let message = receive(real_consumer.as_ref())
            .await?
            .context("missing republished copy")?;
        republished.push(message.text_body().map(str::to_owned));
    }
    assert_eq!(
        republished,
        vec![Some("one".to_string()), Some("two".to_string()), Some("three".to_string())]
    );

    assert!(wait_until(RECEIVE_TIMEOUT, || journal.lock().len() == 9).await);
    let entries = journal.lock().clone();
    for chunk in entries.chunks(3) {
        assert_eq!(chunk, ["a", "b", "c"]);
    }

    stubber.stop().await?;
    Ok(())
}

#[tokio::test]
async fn failing_handlers_do_not_stop_the_chain() -> anyhow::Result<()> {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let handlers: Vec<Arc<dyn MessageHandler>> = vec![
        RecordingHandler::new("first", &journal),
        Arc::new(FailingHandler),
        Arc::new(PanickingHandler),
        RecordingHandler::new("last", &journal),
    ];
    let config = DestinationConfig::builder()
        .add_queue(QueueConfig::new("in").with_handlers(handlers))
        .build()?;
    let mut stubber = Stubber::with_embedded_broker(InMemoryBroker::new("scenario-isolation"), config);
    stubber.start().await?;

    let (_connection, session) = client_session(&stubber).await?;
    let real_consumer = queue_consumer(&session, "in").await?;
    send_text(&session, "in", "payload").await?;

    // the terminal handler still republished
    let republished = receive(real_consumer.as_ref())
        .await?
        .context("terminal handler did not run")?;
    assert_eq!(republished.bool_property(PROCESSED_PROPERTY), Some(true));

    assert!(wait_until(RECEIVE_TIMEOUT, || {
        stubber.dispatch_stats().is_some_and(|s| s.handler_failures == 2)
    })
    .await);
    assert_eq!(*journal.lock(), vec!["first".to_string(), "last".to_string()]);

    // the listener survived the panic
    send_text(&session, "in", "again").await?;
    assert!(receive(real_consumer.as_ref()).await?.is_some());

    stubber.stop().await?;
    Ok(())
}

#[tokio::test]
async fn undeclared_queues_are_left_alone_without_dynamic_attachment() -> anyhow::Result<()> {
    let config = DestinationConfig::builder()
        .add_queue(QueueConfig::new("in"))
        .build()?;
    let mut stubber = Stubber::with_embedded_broker(InMemoryBroker::new("scenario-static"), config);
    stubber.start().await?;

    let (_connection, session) = client_session(&stubber).await?;
    let other = queue_consumer(&session, "other").await?;
    send_text(&session, "other", "untouched").await?;

    let message = receive(other.as_ref()).await?.context("message lost")?;
    assert!(!message.has_property(PROCESSED_PROPERTY));

    let registry = stubber.registry().context("registry missing while running")?;
    assert!(!registry.is_attached("other"));
    assert_eq!(registry.attached_queues(), vec!["in".to_string()]);

    stubber.stop().await?;
    Ok(())
}

#[tokio::test]
async fn stop_closes_the_broker_and_guards_state() -> anyhow::Result<()> {
    let broker = InMemoryBroker::new("scenario-stop");
    let config = DestinationConfig::builder()
        .add_queue(QueueConfig::new("in"))
        .build()?;
    let mut stubber = Stubber::with_embedded_broker(broker.clone(), config);

    assert!(matches!(
        stubber.stop().await,
        Err(StubberError::InvalidState { .. })
    ));

    stubber.start().await?;
    assert_eq!(stubber.state(), StubberState::Running);

    stubber.stop().await?;
    assert_eq!(stubber.state(), StubberState::Stopped);
    assert!(!broker.is_running());
    assert!(stubber.connection_factory().create_connection().await.is_err());

    assert!(matches!(
        stubber.stop().await,
        Err(StubberError::InvalidState {
            expected: StubberState::Running,
            actual: StubberState::Stopped,
        })
    ));
    Ok(())
}
