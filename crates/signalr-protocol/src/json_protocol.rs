//! The JSON hub protocol: framing + hub message model, wired together into
//! the `parse`/`write` contract a transport-agnostic connection relies on.

use thiserror::Error;

use crate::framing::{self, FramingError};
use crate::message::{HubMessage, MessageError};
use crate::payload::{Payload, TransferFormat};

#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("binary payload given to the JSON hub protocol, which only accepts text")]
    ProtocolMismatch,
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error("frame is not a JSON object: {0}")]
    InvalidJson(String),
    #[error(transparent)]
    Message(#[from] MessageError),
}

/// The JSON variant of the SignalR hub protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonHubProtocol;

impl JsonHubProtocol {
    pub const NAME: &'static str = "json";
    pub const VERSION: u32 = 2;

    pub fn new() -> Self {
        JsonHubProtocol
    }

    pub fn name(&self) -> &'static str {
        Self::NAME
    }

    pub fn version(&self) -> u32 {
        Self::VERSION
    }

    pub fn transfer_format(&self) -> TransferFormat {
        TransferFormat::Text
    }

    /// Parse a transport payload into zero or more hub messages, in order.
    ///
    /// Empty text input parses to an empty list. Binary input is always a
    /// protocol mismatch — the JSON protocol never declares Binary transfer.
    pub fn parse(&self, payload: &Payload) -> Result<Vec<HubMessage>, ProtocolError> {
        let text = match payload {
            Payload::Text(t) => t,
            Payload::Binary(_) => return Err(ProtocolError::ProtocolMismatch),
        };

        if text.is_empty() {
            return Ok(Vec::new());
        }

        let frames = framing::parse_frames(text.as_bytes())?;
        let mut messages = Vec::with_capacity(frames.len());
        for frame in frames {
            let frame_text =
                std::str::from_utf8(frame).expect("frame sliced from a validated &str");
            let value: serde_json::Value = serde_json::from_str(frame_text)
                .map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
            if let Some(message) = HubMessage::from_value(&value)? {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    /// Encode a hub message as a single framed text payload.
    pub fn write(&self, message: &HubMessage) -> String {
        let json = serde_json::to_string(&message.to_value())
            .expect("hub message values always serialize");
        let framed = framing::write_frame(json.as_bytes());
        String::from_utf8(framed).expect("framing a valid UTF-8 string stays valid UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{CompletionMessage, InvocationMessage};
    use serde_json::json;

    fn protocol() -> JsonHubProtocol {
        JsonHubProtocol::new()
    }

    #[test]
    fn empty_input_parses_to_empty_list() {
        let messages = protocol().parse(&Payload::Text(String::new())).unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn binary_input_is_a_protocol_mismatch() {
        let err = protocol().parse(&Payload::Binary(vec![1, 2, 3])).unwrap_err();
        assert_eq!(err, ProtocolError::ProtocolMismatch);
    }

    #[test]
    fn unknown_message_type_is_dropped() {
        let messages = protocol()
            .parse(&Payload::Text("{\"type\":99}\x1E".to_owned()))
            .unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn write_then_parse_round_trips_an_invocation() {
        let message = HubMessage::Invocation(InvocationMessage {
            invocation_id: Some("123".to_owned()),
            target: "testTarget".to_owned(),
            arguments: vec![json!("arg1"), json!(123)],
            stream_ids: Some(vec!["456".to_owned()]),
            headers: Some(std::collections::HashMap::from([
                ("key1".to_owned(), "value1".to_owned()),
                ("key2".to_owned(), "value2".to_owned()),
            ])),
        });

        let written = protocol().write(&message);
        assert!(written.ends_with('\x1E'));

        let parsed = protocol().parse(&Payload::Text(written)).unwrap();
        assert_eq!(parsed, vec![message]);
    }

    #[test]
    fn parse_yields_exactly_n_messages_in_order() {
        let mut text = String::new();
        for i in 0..5 {
            text.push_str(&protocol().write(&HubMessage::Completion(CompletionMessage {
                invocation_id: i.to_string(),
                result: None,
                error: None,
                headers: None,
            })));
        }

        let parsed = protocol().parse(&Payload::Text(text)).unwrap();
        assert_eq!(parsed.len(), 5);
        for (i, message) in parsed.iter().enumerate() {
            match message {
                HubMessage::Completion(c) => assert_eq!(c.invocation_id, i.to_string()),
                other => panic!("expected Completion, got {other:?}"),
            }
        }
    }

    #[test]
    fn malformed_trailing_frame_is_an_error() {
        let err = protocol()
            .parse(&Payload::Text("{\"type\":6}\x1Enot json\x1E".to_owned()))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidJson(_)));
    }
}
