//! A mock negotiate + WebSocket server for integration tests, following the
//! shape of `rt-test-utils::mock_ws_server`: bind to a random port, accept
//! connections in a background task, drop to tear down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;

#[derive(Clone)]
pub struct NegotiateBehavior {
    pub body: serde_json::Value,
    /// If set, the negotiate handler waits on this before responding —
    /// lets a test deterministically observe "negotiate is in flight".
    pub gate: Option<Arc<Notify>>,
}

#[derive(Clone)]
struct ServerState {
    behavior: NegotiateBehavior,
}

pub struct MockServer {
    pub addr: SocketAddr,
    _task: tokio::task::JoinHandle<()>,
}

impl MockServer {
    pub async fn start(behavior: NegotiateBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
        let addr = listener.local_addr().expect("local_addr");

        let state = ServerState { behavior };
        let app = Router::new()
            .route("/hub/negotiate", post(negotiate_handler))
            .route("/hub", get(ws_handler))
            .with_state(state);

        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server crashed");
        });

        Self { addr, _task: task }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/hub", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/hub", self.addr)
    }
}

async fn negotiate_handler(State(state): State<ServerState>) -> Response {
    if let Some(gate) = &state.behavior.gate {
        gate.notified().await;
    }
    axum::Json(state.behavior.body.clone()).into_response()
}

async fn ws_handler(ws: WebSocketUpgrade, State(_state): State<ServerState>) -> Response {
    ws.on_upgrade(echo_socket)
}

/// Echoes every text frame back verbatim — enough to exercise the full
/// send -> transport -> socket -> transport -> on_receive round trip without
/// a real hub-protocol-speaking server.
async fn echo_socket(mut socket: WebSocket) {
    while let Some(Ok(msg)) = socket.next().await {
        match msg {
            Message::Text(text) => {
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

/// A default successful negotiate response pointing back at this same
/// server's WebSocket endpoint.
pub fn default_negotiate_body(connection_id: &str) -> serde_json::Value {
    serde_json::json!({
        "connectionId": connection_id,
        "negotiateVersion": 1,
        "availableTransports": [
            { "transport": "WebSockets", "transferFormats": ["Text", "Binary"] }
        ]
    })
}

pub fn long_polling_only_body() -> serde_json::Value {
    serde_json::json!({
        "connectionId": "C-lp",
        "negotiateVersion": 1,
        "availableTransports": [
            { "transport": "LongPolling", "transferFormats": ["Text"] }
        ]
    })
}

/// A negotiate response that only carries a redirect `url` — no
/// `availableTransports` — so a connection can only reach `Connected` by
/// actually re-negotiating against `target_url`, not by reusing this body.
pub fn redirect_negotiate_body(target_url: &str) -> serde_json::Value {
    serde_json::json!({ "url": target_url })
}

/// A negotiate response granting stateful reconnect without the client
/// having requested it.
pub fn stateful_reconnect_mismatch_body() -> serde_json::Value {
    serde_json::json!({
        "connectionId": "C-src",
        "negotiateVersion": 1,
        "useStatefulReconnect": true,
        "availableTransports": [
            { "transport": "WebSockets", "transferFormats": ["Text", "Binary"] }
        ]
    })
}

pub const NEGOTIATE_TIMEOUT: Duration = Duration::from_secs(5);
