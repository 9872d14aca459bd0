//! # Messaging Error Types
//!
//! Structured error types for broker operations and message copying, using thiserror
//! instead of `Box<dyn Error>` patterns.

use thiserror::Error;

use crate::messaging::message::MessageKind;

/// Errors raised by a broker connection, session, producer or consumer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerError {
    #[error("Broker is not running: {broker}")]
    NotRunning { broker: String },

    #[error("Connection is closed: {connection_id}")]
    ConnectionClosed { connection_id: String },

    #[error("Session is closed: {session_id}")]
    SessionClosed { session_id: String },

    #[error("Producer is closed for destination: {destination}")]
    ProducerClosed { destination: String },

    #[error("Consumer is closed for destination: {destination}")]
    ConsumerClosed { destination: String },

    #[error("Consumer on {destination} already has a message listener")]
    ListenerAlreadySet { destination: String },

    #[error("Invalid selector expression: {expression}: {reason}")]
    InvalidSelector { expression: String, reason: String },

    #[error("Invalid destination name: {name}: {reason}")]
    InvalidDestination { name: String, reason: String },

    #[error("Destination operation failed: {destination}: {operation}: {message}")]
    DestinationOperation {
        destination: String,
        operation: String,
        message: String,
    },

    #[error("Internal broker error: {message}")]
    Internal { message: String },
}

impl BrokerError {
    /// Create a broker not running error
    pub fn not_running(broker: impl Into<String>) -> Self {
        Self::NotRunning {
            broker: broker.into(),
        }
    }

    /// Create a connection closed error
    pub fn connection_closed(connection_id: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            connection_id: connection_id.into(),
        }
    }

    /// Create a session closed error
    pub fn session_closed(session_id: impl Into<String>) -> Self {
        Self::SessionClosed {
            session_id: session_id.into(),
        }
    }

    /// Create a producer closed error
    pub fn producer_closed(destination: impl Into<String>) -> Self {
        Self::ProducerClosed {
            destination: destination.into(),
        }
    }

    /// Create a consumer closed error
    pub fn consumer_closed(destination: impl Into<String>) -> Self {
        Self::ConsumerClosed {
            destination: destination.into(),
        }
    }

    /// Create a listener already set error
    pub fn listener_already_set(destination: impl Into<String>) -> Self {
        Self::ListenerAlreadySet {
            destination: destination.into(),
        }
    }

    /// Create an invalid selector error
    pub fn invalid_selector(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSelector {
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid destination error
    pub fn invalid_destination(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDestination {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a destination operation error
    pub fn destination_operation(
        destination: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::DestinationOperation {
            destination: destination.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Errors raised while duplicating a message
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Unsupported message kind for copy: {kind}")]
    UnsupportedMessageKind { kind: MessageKind },

    #[error("Property rejected: {name}: {reason}")]
    PropertyRejected { name: String, reason: String },

    #[error("Failed to read message body: {0}")]
    BodyRead(#[from] std::io::Error),

    #[error("Broker refused to create message: {0}")]
    Broker(#[from] BrokerError),
}

impl CodecError {
    /// Create an unsupported message kind error
    pub fn unsupported_kind(kind: MessageKind) -> Self {
        Self::UnsupportedMessageKind { kind }
    }

    /// Create a property rejected error
    pub fn property_rejected(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PropertyRejected {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Result type alias for message copy operations
pub type CodecResult<T> = Result<T, CodecError>;
