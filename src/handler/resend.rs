use async_trait::async_trait;
use tracing::debug;

use crate::constants::PROCESSED_PROPERTY;
use crate::error::{HandlerError, HandlerResult};
use crate::handler::{HandlerSession, MessageHandler};
use crate::messaging::message::Message;

/// Terminal handler: republishes a marked copy to the queue the message came from.
///
/// The copy carries `stubber_processed = true`, which the stubber's own consumers
/// filter out, so only the application's consumers ever see it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResendToOriginHandler;

impl ResendToOriginHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageHandler for ResendToOriginHandler {
    async fn handle(&self, session: &HandlerSession, message: &Message) -> HandlerResult {
        let origin = message
            .destination()
            .cloned()
            .ok_or_else(|| HandlerError::missing_destination("resend to origin"))?;

        let mut copy = session.copy(message)?;
        copy.set_property(PROCESSED_PROPERTY, true)?;
        copy.set_message_id(None);
        copy.set_destination(None);

        let message_id = session.send(&origin, copy).await?;
        debug!(
            destination = %origin,
            original_id = ?message.message_id(),
            message_id = %message_id,
            "Republished processed copy"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "resend_to_origin"
    }
}
