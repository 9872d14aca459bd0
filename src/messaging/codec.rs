//! # Message Copy Codec
//!
//! Type-preserving duplication of broker messages for forwarding and republishing.
//!
//! A copy keeps every property and the kind-specific body, plus the reply-to and
//! correlation headers. It never keeps the message id, destination or timestamp:
//! the broker assigns fresh ones when the copy is sent. Binary and stream bodies are
//! moved through a fixed [`COPY_BUFFER_SIZE`] buffer so large payloads are copied in
//! bounded chunks.

use std::io::Read;

use crate::broker::Session;
use crate::constants::COPY_BUFFER_SIZE;
use crate::messaging::errors::{CodecError, CodecResult};
use crate::messaging::message::{Message, MessageBody, MessageKind};

/// Duplicate `message` as a new message created by `session`
pub fn copy_message(session: &dyn Session, message: &Message) -> CodecResult<Message> {
    let kind = message.kind();
    if !is_copyable(kind) {
        return Err(CodecError::unsupported_kind(kind));
    }

    let mut copy = session.create_message(kind)?;

    for (name, value) in message.properties() {
        copy.set_property(name.clone(), value.clone())?;
    }

    let body = match message.body() {
        MessageBody::Text(text) => MessageBody::Text(text.clone()),
        MessageBody::Map(entries) => MessageBody::Map(entries.clone()),
        MessageBody::Object(value) => MessageBody::Object(value.clone()),
        MessageBody::Bytes(bytes) => MessageBody::Bytes(copy_chunked(bytes)?),
        MessageBody::Stream(bytes) => MessageBody::Stream(copy_chunked(bytes)?),
        MessageBody::Empty | MessageBody::Advisory(_) => {
            return Err(CodecError::unsupported_kind(kind))
        }
    };
    copy.set_body(body);

    copy.set_reply_to(message.reply_to().cloned());
    copy.set_correlation_id(message.correlation_id().map(str::to_string));
    copy.set_message_id(None);
    copy.set_destination(None);

    Ok(copy)
}

/// Kinds the codec knows how to duplicate
pub fn is_copyable(kind: MessageKind) -> bool {
    matches!(
        kind,
        MessageKind::Text
            | MessageKind::Map
            | MessageKind::Bytes
            | MessageKind::Object
            | MessageKind::Stream
    )
}

fn copy_chunked(source: &[u8]) -> CodecResult<Vec<u8>> {
    let mut reader = source;
    let mut buffer = [0u8; COPY_BUFFER_SIZE];
    let mut copied = Vec::with_capacity(source.len());

    loop {
        let count = reader.read(&mut buffer)?;
        if count == 0 {
            break;
        }
        copied.extend_from_slice(&buffer[..count]);
    }

    Ok(copied)
}
