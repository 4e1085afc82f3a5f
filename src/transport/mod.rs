//! Transport abstraction: the uniform connect/send/stop surface every
//! concrete transport (WebSocket, and eventually SSE/long-polling) presents
//! to the connection state machine.

pub mod websocket;

use std::sync::Mutex;

use async_trait::async_trait;
use signalr_protocol::{Payload, TransferFormat};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

pub use websocket::WebSocketTransport;

/// Errors raised by a transport's connect/send/stop operations.
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("transport handshake failed: {0}")]
    Handshake(String),
    #[error("transport is not open")]
    NotOpen,
    #[error("transport closed: {reason}")]
    Closed {
        code: Option<u16>,
        reason: String,
    },
}

/// A bitset over the transport kinds a client may request or a server may
/// advertise. `0` (`TransportType::NONE`) means "no preference" — any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportType(u8);

impl TransportType {
    pub const NONE: Self = Self(0);
    pub const WEBSOCKETS: Self = Self(1);
    pub const SERVER_SENT_EVENTS: Self = Self(2);
    pub const LONG_POLLING: Self = Self(4);
    pub const ALL: Self = Self(1 | 2 | 4);

    /// True if `self` permits every kind set in `other`. `NONE` (`0`) means
    /// "no preference" and so permits anything.
    pub fn contains(self, other: Self) -> bool {
        self.is_any() || self.0 & other.0 == other.0
    }

    /// True if no preference was expressed.
    pub fn is_any(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for TransportType {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A single named transport kind (one bit of [`TransportType`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    WebSockets,
    ServerSentEvents,
    LongPolling,
}

impl TransportKind {
    /// Parse a transport name as sent by the server in a negotiate response,
    /// case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "websockets" => Some(Self::WebSockets),
            "serversentevents" => Some(Self::ServerSentEvents),
            "longpolling" => Some(Self::LongPolling),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::WebSockets => "WebSockets",
            Self::ServerSentEvents => "ServerSentEvents",
            Self::LongPolling => "LongPolling",
        }
    }

    pub fn as_bit(self) -> TransportType {
        match self {
            Self::WebSockets => TransportType::WEBSOCKETS,
            Self::ServerSentEvents => TransportType::SERVER_SENT_EVENTS,
            Self::LongPolling => TransportType::LONG_POLLING,
        }
    }
}

/// Parse a transfer format name (`"Text"`/`"Binary"`), case-insensitively.
pub fn parse_transfer_format(name: &str) -> Option<TransferFormat> {
    match name.to_ascii_lowercase().as_str() {
        "text" => Some(TransferFormat::Text),
        "binary" => Some(TransferFormat::Binary),
        _ => None,
    }
}

/// The callback channels a transport reports inbound messages and its
/// terminal close event through. Handed to `Transport::connect`.
pub struct TransportHandles {
    pub on_receive: mpsc::UnboundedSender<Payload>,
    pub on_close: CloseNotifier,
}

/// A one-shot close signal that only ever fires once, no matter whether the
/// firing comes from a remote close, a read error, or an explicit `stop()`.
#[derive(Clone)]
pub struct CloseNotifier {
    inner: std::sync::Arc<Mutex<Option<oneshot::Sender<Option<TransportError>>>>>,
}

impl CloseNotifier {
    pub fn new() -> (Self, oneshot::Receiver<Option<TransportError>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                inner: std::sync::Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Fire the close signal with `error`. A no-op if already fired.
    pub fn fire(&self, error: Option<TransportError>) {
        if let Some(sender) = self.inner.lock().expect("close notifier mutex poisoned").take() {
            let _ = sender.send(error);
        }
    }
}

/// The uniform capability set any transport exposes to the connection.
///
/// `connect` resolves only once the transport has reached the OPEN state;
/// `send` fails with [`TransportError::NotOpen`] outside OPEN; `stop` is
/// idempotent and guarantees `handles.on_close` fires exactly once.
#[async_trait]
pub trait Transport: Send {
    async fn connect(
        &mut self,
        url: &str,
        transfer_format: TransferFormat,
        handles: TransportHandles,
    ) -> Result<(), TransportError>;

    async fn send(&mut self, payload: Payload) -> Result<(), TransportError>;

    async fn stop(&mut self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_type_none_means_any() {
        assert!(TransportType::NONE.is_any());
        assert!(!TransportType::WEBSOCKETS.is_any());
    }

    #[test]
    fn transport_type_none_contains_every_kind() {
        assert!(TransportType::NONE.contains(TransportType::WEBSOCKETS));
        assert!(TransportType::NONE.contains(TransportType::SERVER_SENT_EVENTS));
        assert!(TransportType::NONE.contains(TransportType::LONG_POLLING));
        assert!(TransportType::NONE.contains(TransportType::ALL));
    }

    #[test]
    fn transport_type_union_and_contains() {
        let both = TransportType::WEBSOCKETS | TransportType::LONG_POLLING;
        assert!(both.contains(TransportType::WEBSOCKETS));
        assert!(both.contains(TransportType::LONG_POLLING));
        assert!(!both.contains(TransportType::SERVER_SENT_EVENTS));
    }

    #[test]
    fn transport_kind_name_parsing_is_case_insensitive() {
        assert_eq!(TransportKind::from_name("websockets"), Some(TransportKind::WebSockets));
        assert_eq!(TransportKind::from_name("WebSockets"), Some(TransportKind::WebSockets));
        assert_eq!(TransportKind::from_name("LONGPOLLING"), Some(TransportKind::LongPolling));
        assert_eq!(TransportKind::from_name("carrier-pigeon"), None);
    }

    #[test]
    fn transfer_format_parsing_is_case_insensitive() {
        assert_eq!(parse_transfer_format("text"), Some(TransferFormat::Text));
        assert_eq!(parse_transfer_format("Binary"), Some(TransferFormat::Binary));
        assert_eq!(parse_transfer_format("nonsense"), None);
    }

    #[tokio::test]
    async fn close_notifier_fires_exactly_once() {
        let (notifier, rx) = CloseNotifier::new();
        notifier.fire(None);
        notifier.fire(Some(TransportError::NotOpen)); // no-op, already fired
        assert_eq!(rx.await.unwrap(), None);
    }
}
