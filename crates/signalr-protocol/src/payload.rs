//! The payload shape exchanged between a transport and a hub protocol.
//!
//! A transport delivers one message per network frame, as either a UTF-8
//! string (Text transfer format) or opaque bytes (Binary transfer format).
//! `Text`/`Binary` here, not `TransferFormat`, because a protocol's `parse`
//! needs to see which one actually arrived, not which one was negotiated.

/// Declared encoding of payload bytes over a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferFormat {
    Text,
    Binary,
}

/// A single inbound or outbound message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn transfer_format(&self) -> TransferFormat {
        match self {
            Payload::Text(_) => TransferFormat::Text,
            Payload::Binary(_) => TransferFormat::Binary,
        }
    }
}
