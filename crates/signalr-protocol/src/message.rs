//! The hub message model: a tagged sum over the nine SignalR hub message
//! kinds, dispatched on the integer `type` discriminator.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Integer `type` discriminators, per the SignalR hub protocol.
pub mod type_id {
    pub const INVOCATION: i64 = 1;
    pub const STREAM_ITEM: i64 = 2;
    pub const COMPLETION: i64 = 3;
    pub const STREAM_INVOCATION: i64 = 4;
    pub const CANCEL_INVOCATION: i64 = 5;
    pub const PING: i64 = 6;
    pub const CLOSE: i64 = 7;
    pub const ACK: i64 = 8;
    pub const SEQUENCE: i64 = 9;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("message has no integer `type` field")]
    MissingType,
    #[error("malformed {0} message: {1}")]
    Malformed(&'static str, String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationMessage {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub invocation_id: Option<String>,
    pub target: String,
    pub arguments: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stream_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamItemMessage {
    pub invocation_id: String,
    pub item: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionMessage {
    pub invocation_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInvocationMessage {
    pub invocation_id: String,
    pub target: String,
    pub arguments: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stream_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelInvocationMessage {
    pub invocation_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingMessage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseMessage {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub allow_reconnect: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckMessage {
    pub sequence_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceMessage {
    pub sequence_id: u64,
}

/// Any of the nine hub message kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Invocation(InvocationMessage),
    StreamItem(StreamItemMessage),
    Completion(CompletionMessage),
    StreamInvocation(StreamInvocationMessage),
    CancelInvocation(CancelInvocationMessage),
    Ping(PingMessage),
    Close(CloseMessage),
    Ack(AckMessage),
    Sequence(SequenceMessage),
}

impl HubMessage {
    /// The numeric `type` discriminator for this variant.
    pub fn type_id(&self) -> i64 {
        match self {
            HubMessage::Invocation(_) => type_id::INVOCATION,
            HubMessage::StreamItem(_) => type_id::STREAM_ITEM,
            HubMessage::Completion(_) => type_id::COMPLETION,
            HubMessage::StreamInvocation(_) => type_id::STREAM_INVOCATION,
            HubMessage::CancelInvocation(_) => type_id::CANCEL_INVOCATION,
            HubMessage::Ping(_) => type_id::PING,
            HubMessage::Close(_) => type_id::CLOSE,
            HubMessage::Ack(_) => type_id::ACK,
            HubMessage::Sequence(_) => type_id::SEQUENCE,
        }
    }

    /// Encode this message as a JSON value with its `type` field set.
    ///
    /// Field ordering is not significant; `type` is merged in alongside
    /// whatever fields the variant struct serializes.
    pub fn to_value(&self) -> Value {
        let mut value = match self {
            HubMessage::Invocation(m) => serde_json::to_value(m),
            HubMessage::StreamItem(m) => serde_json::to_value(m),
            HubMessage::Completion(m) => serde_json::to_value(m),
            HubMessage::StreamInvocation(m) => serde_json::to_value(m),
            HubMessage::CancelInvocation(m) => serde_json::to_value(m),
            HubMessage::Ping(m) => serde_json::to_value(m),
            HubMessage::Close(m) => serde_json::to_value(m),
            HubMessage::Ack(m) => serde_json::to_value(m),
            HubMessage::Sequence(m) => serde_json::to_value(m),
        }
        .expect("hub message variants always serialize to a JSON object");

        if !value.is_object() {
            // PingMessage is a unit struct; serde_json serializes it as `null`.
            value = Value::Object(serde_json::Map::new());
        }
        value
            .as_object_mut()
            .expect("ensured object above")
            .insert("type".to_owned(), Value::from(self.type_id()));
        value
    }

    /// Decode a single JSON object into a hub message.
    ///
    /// Returns `Ok(None)` when `type` is not one of the nine known
    /// discriminators — this is a silent drop, not an error, to preserve
    /// forward compatibility with newer server-side message kinds.
    /// Returns `Err` when `type` is known but the payload does not match
    /// that variant's required fields.
    pub fn from_value(value: &Value) -> Result<Option<HubMessage>, MessageError> {
        let type_num = value
            .get("type")
            .and_then(Value::as_i64)
            .ok_or(MessageError::MissingType)?;

        macro_rules! decode {
            ($name:literal, $variant:ident, $ty:ty) => {
                serde_json::from_value::<$ty>(value.clone())
                    .map(|m| Some(HubMessage::$variant(m)))
                    .map_err(|e| MessageError::Malformed($name, e.to_string()))
            };
        }

        match type_num {
            type_id::INVOCATION => decode!("Invocation", Invocation, InvocationMessage),
            type_id::STREAM_ITEM => decode!("StreamItem", StreamItem, StreamItemMessage),
            type_id::COMPLETION => decode!("Completion", Completion, CompletionMessage),
            type_id::STREAM_INVOCATION => {
                decode!("StreamInvocation", StreamInvocation, StreamInvocationMessage)
            }
            type_id::CANCEL_INVOCATION => {
                decode!("CancelInvocation", CancelInvocation, CancelInvocationMessage)
            }
            type_id::PING => Ok(Some(HubMessage::Ping(PingMessage))),
            type_id::CLOSE => decode!("Close", Close, CloseMessage),
            type_id::ACK => decode!("Ack", Ack, AckMessage),
            type_id::SEQUENCE => decode!("Sequence", Sequence, SequenceMessage),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_type_is_dropped_not_errored() {
        let value = json!({"type": 99});
        assert_eq!(HubMessage::from_value(&value), Ok(None));
    }

    #[test]
    fn missing_type_is_an_error() {
        let value = json!({"target": "x"});
        assert_eq!(HubMessage::from_value(&value), Err(MessageError::MissingType));
    }

    #[test]
    fn invocation_round_trips() {
        let msg = HubMessage::Invocation(InvocationMessage {
            invocation_id: Some("123".to_owned()),
            target: "testTarget".to_owned(),
            arguments: vec![json!("arg1"), json!(123)],
            stream_ids: Some(vec!["456".to_owned()]),
            headers: Some(HashMap::from([
                ("key1".to_owned(), "value1".to_owned()),
                ("key2".to_owned(), "value2".to_owned()),
            ])),
        });
        let value = msg.to_value();
        assert_eq!(value["type"], json!(1));
        let decoded = HubMessage::from_value(&value).unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn completion_with_error_decodes() {
        let value = json!({"type": 3, "invocationId": "345", "error": "Errors"});
        let decoded = HubMessage::from_value(&value).unwrap().unwrap();
        assert_eq!(
            decoded,
            HubMessage::Completion(CompletionMessage {
                invocation_id: "345".to_owned(),
                result: None,
                error: Some("Errors".to_owned()),
                headers: None,
            })
        );
    }

    #[test]
    fn completion_with_neither_result_nor_error_is_legal() {
        let value = json!({"type": 3, "invocationId": "void-call"});
        let decoded = HubMessage::from_value(&value).unwrap().unwrap();
        match decoded {
            HubMessage::Completion(c) => {
                assert!(c.result.is_none());
                assert!(c.error.is_none());
            }
            other => panic!("expected Completion, got {other:?}"),
        }
    }

    #[test]
    fn completion_never_serializes_both_result_and_error() {
        // Constructing this directly is a misuse, but the writer still must not
        // fabricate absent fields: both round-trip as provided.
        let msg = CompletionMessage {
            invocation_id: "x".to_owned(),
            result: Some(json!(1)),
            error: None,
            headers: None,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("result").is_some());
        assert!(value.get("error").is_none());
    }

    #[test]
    fn ping_round_trips_with_no_payload() {
        let msg = HubMessage::Ping(PingMessage);
        let value = msg.to_value();
        assert_eq!(value, json!({"type": 6}));
        assert_eq!(HubMessage::from_value(&value).unwrap().unwrap(), msg);
    }

    #[test]
    fn ack_and_sequence_carry_a_u64_sequence_id() {
        let ack = HubMessage::Ack(AckMessage { sequence_id: 42 });
        let value = ack.to_value();
        assert_eq!(value, json!({"type": 8, "sequenceId": 42}));
        assert_eq!(HubMessage::from_value(&value).unwrap().unwrap(), ack);

        let seq = HubMessage::Sequence(SequenceMessage { sequence_id: 7 });
        assert_eq!(seq.to_value(), json!({"type": 9, "sequenceId": 7}));
    }

    #[test]
    fn close_allows_no_error_and_no_allow_reconnect() {
        let value = json!({"type": 7});
        let decoded = HubMessage::from_value(&value).unwrap().unwrap();
        assert_eq!(
            decoded,
            HubMessage::Close(CloseMessage {
                error: None,
                allow_reconnect: None,
            })
        );
    }

    #[test]
    fn malformed_known_type_is_an_error() {
        // type 1 (Invocation) requires `target`.
        let value = json!({"type": 1, "arguments": []});
        assert!(matches!(
            HubMessage::from_value(&value),
            Err(MessageError::Malformed("Invocation", _))
        ));
    }
}
