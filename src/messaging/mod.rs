//! # Messaging
//!
//! The broker-neutral message model, the selector expressions consumers filter with,
//! the copy codec handlers use to republish messages and the broker/codec error types.

pub mod codec;
pub mod errors;
pub mod message;
pub mod selector;

pub use codec::{copy_message, is_copyable};
pub use errors::{BrokerError, BrokerResult, CodecError, CodecResult};
pub use message::{Destination, DestinationKind, Message, MessageBody, MessageKind, PropertyValue};
pub use selector::Selector;
