//! Message types and the payloads [`Conn::write_message`](crate::Conn::write_message)
//! accepts.

use std::borrow::Cow;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::protocol::OpCode;

/// Kind of a WebSocket message, with the RFC 6455 opcode as discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// UTF-8 text (1).
    Text = 1,
    /// Binary data (2).
    Binary = 2,
    /// Close control message (8).
    Close = 8,
    /// Ping control message (9).
    Ping = 9,
    /// Pong control message (10).
    Pong = 10,
}

impl MessageType {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(
            self,
            MessageType::Close | MessageType::Ping | MessageType::Pong
        )
    }
}

impl TryFrom<u8> for MessageType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(MessageType::Text),
            2 => Ok(MessageType::Binary),
            8 => Ok(MessageType::Close),
            9 => Ok(MessageType::Ping),
            10 => Ok(MessageType::Pong),
            other => Err(Error::InvalidOpcode(other)),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        value.as_u8()
    }
}

impl From<MessageType> for OpCode {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Text => OpCode::Text,
            MessageType::Binary => OpCode::Binary,
            MessageType::Close => OpCode::Close,
            MessageType::Ping => OpCode::Ping,
            MessageType::Pong => OpCode::Pong,
        }
    }
}

impl TryFrom<OpCode> for MessageType {
    type Error = Error;

    /// Continuation frames never surface as messages.
    fn try_from(value: OpCode) -> Result<Self> {
        Self::try_from(value.as_u8())
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Text => write!(f, "Text"),
            MessageType::Binary => write!(f, "Binary"),
            MessageType::Close => write!(f, "Close"),
            MessageType::Ping => write!(f, "Ping"),
            MessageType::Pong => write!(f, "Pong"),
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Something that can be turned into the bytes of one message.
///
/// Implemented by [`RawPayload`], [`TextPayload`] and [`EncodablePayload`]
/// only.
pub trait EncodePayload: sealed::Sealed {
    /// The message body. Borrowed whenever no conversion is needed.
    ///
    /// # Errors
    ///
    /// `Error::Encode` if the value cannot be serialized.
    fn encode(&self) -> Result<Cow<'_, [u8]>>;
}

/// Bytes written exactly as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload<B>(pub B);

impl<B: AsRef<[u8]>> sealed::Sealed for RawPayload<B> {}

impl<B: AsRef<[u8]>> EncodePayload for RawPayload<B> {
    fn encode(&self) -> Result<Cow<'_, [u8]>> {
        Ok(Cow::Borrowed(self.0.as_ref()))
    }
}

/// Text written as its UTF-8 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPayload<S>(pub S);

impl<S: AsRef<str>> sealed::Sealed for TextPayload<S> {}

impl<S: AsRef<str>> EncodePayload for TextPayload<S> {
    fn encode(&self) -> Result<Cow<'_, [u8]>> {
        Ok(Cow::Borrowed(self.0.as_ref().as_bytes()))
    }
}

/// A structured value written as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodablePayload<V>(pub V);

impl<V: Serialize> sealed::Sealed for EncodablePayload<V> {}

impl<V: Serialize> EncodePayload for EncodablePayload<V> {
    fn encode(&self) -> Result<Cow<'_, [u8]>> {
        Ok(Cow::Owned(serde_json::to_vec(&self.0)?))
    }
}
