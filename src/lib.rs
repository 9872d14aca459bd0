#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # MQ Stubber
//!
//! Stands in for the services on the other end of a message broker during integration
//! tests.
//!
//! ## Overview
//!
//! The stubber attaches a high-priority consumer to each queue it manages. Every
//! message that arrives runs through an ordered handler chain: the common handlers,
//! then the queue's own handlers, then a terminal handler that republishes a marked
//! copy to the source queue so the real consumers still receive it. The stub's
//! consumers filter out marked messages, so a copy never loops back into the chain.
//!
//! Queues are either declared up front in a [`DestinationConfig`] or, in dynamic
//! attachment mode, discovered from the broker's advisory topics as soon as anything
//! creates, produces to or consumes from them.
//!
//! ## Module Organization
//!
//! - [`broker`] - Broker seam traits and the embedded in-memory broker
//! - [`messaging`] - Message model, selectors, the copy codec and broker errors
//! - [`handler`] - The handler contract, its session and built-in handlers
//! - [`dispatch`] - Runs handler chains with per-handler failure isolation
//! - [`registry`] - At-most-once queue attachment and descriptor-based handler creation
//! - [`events`] - Advisory events and the destination watcher
//! - [`lifecycle`] - The [`Stubber`] and its states
//! - [`config`] - Destination configuration and loadable settings
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mq_stubber::broker::in_memory::InMemoryBroker;
//! use mq_stubber::broker::ConsumerOptions;
//! use mq_stubber::config::{DestinationConfig, QueueConfig};
//! use mq_stubber::handler::ForwardingHandler;
//! use mq_stubber::messaging::{Destination, Message};
//! use mq_stubber::Stubber;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DestinationConfig::builder()
//!     .add_queue(QueueConfig::new("in").with_handler(Arc::new(ForwardingHandler::to_queue("out"))))
//!     .build()?;
//! let mut stubber = Stubber::with_embedded_broker(InMemoryBroker::new("demo"), config);
//! stubber.start().await?;
//!
//! let connection = stubber.connection_factory().create_connection().await?;
//! let session = connection.create_session().await?;
//! let out = session
//!     .create_consumer(&Destination::queue("out"), ConsumerOptions::new())
//!     .await?;
//! let producer = session.create_producer(&Destination::queue("in")).await?;
//! producer.send(Message::text("hello")).await?;
//!
//! let forwarded = out.receive(Duration::from_secs(1)).await?;
//! assert_eq!(forwarded.and_then(|m| m.text_body().map(str::to_owned)).as_deref(), Some("hello"));
//!
//! stubber.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod handler;
pub mod lifecycle;
pub mod logging;
pub mod messaging;
pub mod registry;

pub use broker::in_memory::InMemoryBroker;
pub use broker::{
    Connection, ConnectionFactory, ConsumerOptions, MessageConsumer, MessageListener,
    MessageProducer, Session,
};
pub use config::{DestinationConfig, QueueConfig, QueueSettings, StubberSettings};
pub use constants::PROCESSED_PROPERTY;
pub use dispatch::{DispatchEngine, DispatchReport, DispatchStats};
pub use error::{HandlerError, HandlerResult, Result, StubberError};
pub use events::{AdvisoryEvent, DestinationWatcher, WatcherStats};
pub use handler::{HandlerSession, MessageHandler};
pub use lifecycle::{Stubber, StubberState};
pub use messaging::{BrokerError, CodecError, Destination, Message, MessageKind};
pub use registry::{HandlerFactory, QueueRegistry};
