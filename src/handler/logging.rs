use async_trait::async_trait;
use tracing::info;

use crate::error::HandlerResult;
use crate::handler::{HandlerSession, MessageHandler};
use crate::messaging::message::{Message, MessageBody};

/// Records each message it sees at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl LoggingHandler {
    pub fn new() -> Self {
        Self
    }
}

/// Short human readable rendering of a body
fn describe_body(body: &MessageBody) -> String {
    match body {
        MessageBody::Empty => String::new(),
        MessageBody::Text(text) => text.clone(),
        MessageBody::Map(entries) => format!("{entries:?}"),
        MessageBody::Bytes(bytes) | MessageBody::Stream(bytes) => {
            format!("<{} bytes>", bytes.len())
        }
        MessageBody::Object(value) => value.to_string(),
        MessageBody::Advisory(event) => event.event_type().to_string(),
    }
}

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(&self, _session: &HandlerSession, message: &Message) -> HandlerResult {
        let properties: Vec<String> = message
            .properties()
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();

        info!(
            destination = ?message.destination().map(ToString::to_string),
            message_id = ?message.message_id(),
            kind = %message.kind(),
            properties = %properties.join(", "),
            body = %describe_body(message.body()),
            "Received message"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
