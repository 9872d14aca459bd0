//! # Message Handlers
//!
//! The unit of extension for the stubber. Each queue runs an ordered chain of handlers
//! over every message it receives; a handler inspects the message and may send new
//! messages through the [`HandlerSession`] it is given.
//!
//! Built-in handlers:
//!
//! - [`ForwardingHandler`] copies the message to another queue or topic
//! - [`LoggingHandler`] records the message through `tracing`
//! - [`MessageCollectingHandler`] keeps received messages in memory, keyed by destination
//! - [`ResendToOriginHandler`] republishes a marked copy to the source queue; the default
//!   terminal handler of every chain
//! - [`ScriptHandler`] delegates to a pluggable [`ScriptEvaluator`]
//!
//! Handlers are shared between concurrent dispatches and must be `Send + Sync`.

pub mod collecting;
pub mod forwarding;
pub mod logging;
pub mod resend;
pub mod script;
pub mod session;

use async_trait::async_trait;

use crate::error::HandlerResult;
use crate::messaging::message::Message;

pub use collecting::MessageCollectingHandler;
pub use forwarding::{ForwardKind, ForwardingHandler};
pub use logging::LoggingHandler;
pub use resend::ResendToOriginHandler;
pub use script::{ScriptContext, ScriptEvaluator, ScriptHandler};
pub use session::{DestinationRef, HandlerSession};

/// A step in a queue's handler chain
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Act on one message. Errors are reported by the dispatch engine and never stop
    /// the handlers after this one.
    async fn handle(&self, session: &HandlerSession, message: &Message) -> HandlerResult;

    /// Name used in logs and dispatch reports
    fn name(&self) -> &str {
        "unnamed_handler"
    }
}
