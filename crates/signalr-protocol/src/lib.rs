// signalr-protocol: hub message model and JSON hub protocol framing.
//
// Pure encode/decode — no networking, no async. `signalr-client` layers the
// transport, negotiate, and connection-lifecycle machinery on top of this.

pub mod framing;
pub mod json_protocol;
pub mod message;
pub mod payload;

pub use framing::{parse_frames, write_frame, FramingError, RECORD_SEPARATOR};
pub use json_protocol::{JsonHubProtocol, ProtocolError};
pub use message::{
    AckMessage, CancelInvocationMessage, CloseMessage, CompletionMessage, HubMessage,
    InvocationMessage, MessageError, PingMessage, SequenceMessage, StreamInvocationMessage,
    StreamItemMessage,
};
pub use payload::{Payload, TransferFormat};
