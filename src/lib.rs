//! Client-side SignalR core: negotiate, transport selection, the WebSocket
//! transport, the ordered send queue, and the connection lifecycle state
//! machine that ties them together.
//!
//! Hub message framing and the JSON hub protocol live in the
//! [`signalr_protocol`] crate this one depends on — pure encode/decode, no
//! networking. This crate is the async half: it negotiates a connection,
//! picks a transport, and moves bytes.
//!
//! Out of scope here (consumers' responsibility): the `invoke`/`on`/`stream`
//! façade that turns raw payloads into typed method calls, MessagePack
//! framing, and server-side SignalR.

pub mod access_token;
pub mod config;
pub mod connection;
pub mod error;
pub mod negotiate;
pub mod send_queue;
pub mod transport;
pub mod url_util;

pub use access_token::{AccessTokenClient, AccessTokenProvider, ConstantTokenProvider};
pub use config::{ConfigError, ConnectionOptions};
pub use connection::{Connection, ConnectionError, StartHandles, State};
pub use error::Error;
pub use negotiate::{NegotiateClient, NegotiateError, NegotiateResponse};
pub use send_queue::{SendQueue, SendQueueError};
pub use transport::{Transport, TransportError, TransportKind, TransportType};

pub use signalr_protocol::{
    HubMessage, JsonHubProtocol, Payload, ProtocolError, TransferFormat,
};
