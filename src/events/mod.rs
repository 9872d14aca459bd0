//! # Broker Events
//!
//! Advisory events published by the broker and the watcher that turns them into
//! queue attachments.

pub mod advisory;
pub mod watcher;

pub use advisory::{
    AdvisoryEvent, ConnectionCreatedEvent, ConsumerCreatedEvent, DestinationCreatedEvent,
    ProducerCreatedEvent,
};
pub use watcher::{DestinationWatcher, WatcherStats};
