//! Application message framing: one kind byte ahead of every payload.

use bytes::{BufMut, Bytes, BytesMut};

/// Leading byte of every message carried by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// Greeting; from the client it carries the admission token.
    Hello = 0,
    /// The sender is closing the connection.
    Goodbye = 1,
    /// Application payload.
    Data = 2,
    /// Keep-alive, no payload.
    Ping = 3,
}

impl TryFrom<u8> for MessageKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Hello),
            1 => Ok(Self::Goodbye),
            2 => Ok(Self::Data),
            3 => Ok(Self::Ping),
            other => Err(other),
        }
    }
}

/// Prefix `payload` with its kind byte.
pub fn encode(kind: MessageKind, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + payload.len());
    buf.put_u8(kind as u8);
    buf.put_slice(payload);
    buf.freeze()
}

/// Split a received message into its kind and payload.
///
/// `Err` carries the unknown kind byte; an empty message has none.
pub fn decode(mut message: Bytes) -> Result<(MessageKind, Bytes), Option<u8>> {
    let Some(&first) = message.first() else {
        return Err(None);
    };
    let kind = MessageKind::try_from(first).map_err(Some)?;
    let payload = message.split_off(1);
    Ok((kind, payload))
}
