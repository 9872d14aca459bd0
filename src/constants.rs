//! # System Constants
//!
//! Names and limits that define how the stubber marks, filters and copies messages,
//! and the well-known advisory topics the embedded broker publishes on.

/// Boolean property set on copies republished by the terminal handler.
///
/// The stubber's own consumers only accept messages where this property is absent,
/// so a republished copy can never re-enter the dispatch path it came from.
pub const PROCESSED_PROPERTY: &str = "stubber_processed";

/// Consumer priority used for the stubber's queue consumers.
///
/// Higher than any default client consumer so the stub sees unprocessed messages first.
pub const STUBBER_CONSUMER_PRIORITY: u8 = 100;

/// Priority given to consumers that do not ask for one.
pub const DEFAULT_CONSUMER_PRIORITY: u8 = 0;

/// Size of the fixed buffer used to copy binary and stream bodies.
pub const COPY_BUFFER_SIZE: usize = 1024;

/// Name used by the embedded broker when none is configured.
pub const DEFAULT_BROKER_NAME: &str = "mq-stubber";

/// Advisory topics published by brokers that support lifecycle notifications
pub mod advisory {
    /// Prefix shared by every advisory topic
    pub const TOPIC_PREFIX: &str = "advisory.";

    pub const CONNECTION_TOPIC: &str = "advisory.connection";
    pub const DESTINATION_TOPIC: &str = "advisory.destination";
    pub const PRODUCER_TOPIC: &str = "advisory.producer";
    pub const CONSUMER_TOPIC: &str = "advisory.consumer";

    /// Every advisory topic the destination watcher subscribes to
    pub const ALL_TOPICS: [&str; 4] = [
        CONNECTION_TOPIC,
        DESTINATION_TOPIC,
        PRODUCER_TOPIC,
        CONSUMER_TOPIC,
    ];

    /// Whether a destination name belongs to the advisory namespace
    pub fn is_advisory_name(name: &str) -> bool {
        name.starts_with(TOPIC_PREFIX)
    }
}

/// Handler descriptor names understood by the handler factory
pub mod handler_names {
    pub const LOG: &str = "log";
    pub const COLLECT: &str = "collect";
    pub const FORWARD: &str = "forward";
    pub const FORWARD_QUEUE: &str = "forward_queue";
    pub const FORWARD_TOPIC: &str = "forward_topic";
    pub const SCRIPT: &str = "script";
}
