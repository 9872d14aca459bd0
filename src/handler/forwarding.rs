use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::HandlerResult;
use crate::handler::{HandlerSession, MessageHandler};
use crate::messaging::message::Message;

/// How a forwarding target name is turned into a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardKind {
    /// Queue if the broker knows one by that name, otherwise topic
    Resolve,
    Queue,
    Topic,
}

/// Copies every message to a fixed target destination
#[derive(Debug, Clone)]
pub struct ForwardingHandler {
    forward_to: String,
    kind: ForwardKind,
    name: String,
}

impl ForwardingHandler {
    pub fn new(forward_to: impl Into<String>) -> Self {
        Self::with_kind(forward_to, ForwardKind::Resolve)
    }

    pub fn to_queue(forward_to: impl Into<String>) -> Self {
        Self::with_kind(forward_to, ForwardKind::Queue)
    }

    pub fn to_topic(forward_to: impl Into<String>) -> Self {
        Self::with_kind(forward_to, ForwardKind::Topic)
    }

    pub fn with_kind(forward_to: impl Into<String>, kind: ForwardKind) -> Self {
        let forward_to = forward_to.into();
        let name = format!("forward:{forward_to}");
        Self {
            forward_to,
            kind,
            name,
        }
    }

    pub fn forward_to(&self) -> &str {
        &self.forward_to
    }

    pub fn kind(&self) -> ForwardKind {
        self.kind
    }
}

#[async_trait]
impl MessageHandler for ForwardingHandler {
    async fn handle(&self, session: &HandlerSession, message: &Message) -> HandlerResult {
        let destination = match self.kind {
            ForwardKind::Resolve => session.resolve(&self.forward_to).await?,
            ForwardKind::Queue => session.queue(&self.forward_to).await?,
            ForwardKind::Topic => session.topic(&self.forward_to).await?,
        };

        let copy = session.copy(message)?;
        let message_id = session.send(&destination, copy).await?;

        debug!(
            from = ?message.destination().map(|d| d.physical_name()),
            to = %destination,
            message_id = %message_id,
            "Forwarded message"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
