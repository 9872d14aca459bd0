//! # Stubber Error Types
//!
//! Handler failures are isolated per handler by the dispatch engine. Attachment,
//! lifecycle and configuration failures surface to whoever drives the stubber.

use thiserror::Error;

use crate::lifecycle::states::StubberState;
use crate::messaging::errors::{BrokerError, CodecError};

/// Errors raised by the stubber outside of a handler
#[derive(Error, Debug)]
pub enum StubberError {
    #[error("Failed to attach to queue {queue_name}: {source}")]
    Attachment {
        queue_name: String,
        #[source]
        source: BrokerError,
    },

    #[error("Lifecycle operation failed: {operation}: {source}")]
    Lifecycle {
        operation: String,
        #[source]
        source: BrokerError,
    },

    #[error("Invalid stubber state: expected {expected}, was {actual}")]
    InvalidState {
        expected: StubberState,
        actual: StubberState,
    },

    #[error("Configuration error in {component}: {message}")]
    Configuration { component: String, message: String },
}

impl StubberError {
    /// Create an attachment error
    pub fn attachment(queue_name: impl Into<String>, source: BrokerError) -> Self {
        Self::Attachment {
            queue_name: queue_name.into(),
            source,
        }
    }

    /// Create a lifecycle error
    pub fn lifecycle(operation: impl Into<String>, source: BrokerError) -> Self {
        Self::Lifecycle {
            operation: operation.into(),
            source,
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(expected: StubberState, actual: StubberState) -> Self {
        Self::InvalidState { expected, actual }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Errors a handler may return from `handle`
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Broker operation failed: {0}")]
    Broker(#[from] BrokerError),

    #[error("Message copy failed: {0}")]
    Codec(#[from] CodecError),

    #[error("Script {script} failed: {message}")]
    Script { script: String, message: String },

    #[error("No script found for destination {destination} under {location}")]
    ScriptNotFound {
        destination: String,
        location: String,
    },

    #[error("Message has no destination for {operation}")]
    MissingDestination { operation: String },

    #[error("Handler failed: {message}")]
    Failed { message: String },

    #[error("Handler panicked: {message}")]
    Panicked { message: String },
}

impl HandlerError {
    /// Create a script evaluation error
    pub fn script(script: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Script {
            script: script.into(),
            message: message.into(),
        }
    }

    /// Create a script not found error
    pub fn script_not_found(destination: impl Into<String>, location: impl Into<String>) -> Self {
        Self::ScriptNotFound {
            destination: destination.into(),
            location: location.into(),
        }
    }

    /// Create a missing destination error
    pub fn missing_destination(operation: impl Into<String>) -> Self {
        Self::MissingDestination {
            operation: operation.into(),
        }
    }

    /// Create a generic handler failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Create a panic report
    pub fn panicked(message: impl Into<String>) -> Self {
        Self::Panicked {
            message: message.into(),
        }
    }
}

/// Result type alias for handler invocations
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Result type alias for stubber operations
pub type Result<T> = std::result::Result<T, StubberError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_attachment_error_keeps_source() {
        let err = StubberError::attachment("orders", BrokerError::session_closed("s-1"));
        assert!(format!("{err}").contains("orders"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_invalid_state_display() {
        let err = StubberError::invalid_state(StubberState::Stopped, StubberState::Running);
        assert_eq!(
            format!("{err}"),
            "Invalid stubber state: expected stopped, was running"
        );
    }

    #[test]
    fn test_handler_error_conversions() {
        let err: HandlerError = BrokerError::not_running("embedded").into();
        assert!(matches!(err, HandlerError::Broker(_)));

        let err: HandlerError = CodecError::property_rejected(" ", "blank").into();
        assert!(matches!(err, HandlerError::Codec(_)));

        let err = HandlerError::script_not_found("orders", "/scripts");
        assert!(format!("{err}").contains("/scripts"));
    }
}
