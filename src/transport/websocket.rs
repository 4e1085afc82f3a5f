//! WebSocket transport: connects, performs Bearer-header and caller-header
//! injection, and spawns a background read loop forwarding frames through
//! `TransportHandles`.

use futures_util::{SinkExt, StreamExt};
use reqwest::header::HeaderMap;
use signalr_protocol::{Payload, TransferFormat};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::{CloseNotifier, Transport, TransportError, TransportHandles};
use crate::access_token::SharedTokenProvider;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// The WebSocket transport (§4.E). Connects eagerly; inbound frames are
/// dispatched from a spawned task so `send` and reading never contend.
pub struct WebSocketTransport {
    token_provider: Option<SharedTokenProvider>,
    headers: HeaderMap,
    log_message_content: bool,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    read_task: Option<tokio::task::JoinHandle<()>>,
}

impl WebSocketTransport {
    /// `headers` is the per-connection header set from `ConnectionOptions`
    /// (§6), attached to the handshake request alongside the bearer token.
    /// `log_message_content` (§6) gates whether inbound frames are logged
    /// verbatim or just by byte length.
    pub fn new(
        token_provider: Option<SharedTokenProvider>,
        headers: HeaderMap,
        log_message_content: bool,
    ) -> Self {
        Self {
            token_provider,
            headers,
            log_message_content,
            outbound: None,
            read_task: None,
        }
    }
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn connect(
        &mut self,
        url: &str,
        transfer_format: TransferFormat,
        handles: TransportHandles,
    ) -> Result<(), TransportError> {
        let token = match &self.token_provider {
            Some(provider) => provider.get_token().await,
            None => None,
        };

        let request = build_ws_request(url, token.as_deref(), &self.headers)?;
        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

        let on_receive = handles.on_receive;
        let on_close = handles.on_close;
        let close_for_reader = on_close.clone();
        let log_message_content = self.log_message_content;

        let read_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    outgoing = out_rx.recv() => {
                        match outgoing {
                            Some(message) => {
                                if let Err(e) = sink.send(message).await {
                                    warn!(error = %e, "websocket send failed");
                                    close_for_reader.fire(Some(TransportError::Closed {
                                        code: None,
                                        reason: e.to_string(),
                                    }));
                                    return;
                                }
                            }
                            None => {
                                let _ = sink.send(Message::Close(None)).await;
                                return;
                            }
                        }
                    }
                    incoming = stream.next() => {
                        match incoming {
                            None => {
                                close_for_reader.fire(None);
                                return;
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "websocket read failed");
                                close_for_reader.fire(Some(TransportError::Closed {
                                    code: None,
                                    reason: e.to_string(),
                                }));
                                return;
                            }
                            Some(Ok(message)) => match message {
                                Message::Text(text) => {
                                    if log_message_content {
                                        debug!(payload = %text, "websocket text frame received");
                                    } else {
                                        debug!(bytes = text.len(), "websocket text frame received");
                                    }
                                    let _ = on_receive.send(Payload::Text(text.to_string()));
                                }
                                Message::Binary(data) => {
                                    if log_message_content {
                                        debug!(payload = ?data, "websocket binary frame received");
                                    } else {
                                        debug!(bytes = data.len(), "websocket binary frame received");
                                    }
                                    let _ = on_receive.send(Payload::Binary(data.to_vec()));
                                }
                                Message::Ping(_) | Message::Pong(_) => continue,
                                Message::Close(frame) => {
                                    let (code, reason) = match frame {
                                        Some(f) => (Some(u16::from(f.code)), f.reason.to_string()),
                                        None => (None, String::new()),
                                    };
                                    if code.is_some() || !reason.is_empty() {
                                        close_for_reader.fire(Some(TransportError::Closed { code, reason }));
                                    } else {
                                        close_for_reader.fire(None);
                                    }
                                    return;
                                }
                                Message::Frame(_) => continue,
                            },
                        }
                    }
                }
            }
        });

        self.outbound = Some(out_tx);
        self.read_task = Some(read_task);
        debug!(%url, transfer_format = ?transfer_format, "websocket transport connected");
        Ok(())
    }

    async fn send(&mut self, payload: Payload) -> Result<(), TransportError> {
        let message = match payload {
            Payload::Text(text) => Message::Text(text.into()),
            Payload::Binary(data) => Message::Binary(data.into()),
        };
        self.outbound
            .as_ref()
            .ok_or(TransportError::NotOpen)?
            .send(message)
            .map_err(|_| TransportError::NotOpen)
    }

    async fn stop(&mut self) -> Result<(), TransportError> {
        if let Some(outbound) = self.outbound.take() {
            drop(outbound);
        }
        if let Some(task) = self.read_task.take() {
            let _ = task.await;
        }
        Ok(())
    }
}

fn build_ws_request(
    url: &str,
    token: Option<&str>,
    extra_headers: &HeaderMap,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, TransportError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| TransportError::Handshake(format!("invalid URL '{url}': {e}")))?;

    for (name, value) in extra_headers {
        let header_name = HeaderName::from_bytes(name.as_str().as_bytes())
            .map_err(|e| TransportError::Handshake(format!("invalid header name '{name}': {e}")))?;
        let header_value = HeaderValue::from_bytes(value.as_bytes())
            .map_err(|e| TransportError::Handshake(format!("invalid header value for '{name}': {e}")))?;
        request.headers_mut().insert(header_name, header_value);
    }

    if let Some(token) = token.filter(|t| !t.is_empty()) {
        let value = format!("Bearer {token}")
            .parse()
            .map_err(|e: tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue| {
                TransportError::Handshake(format!("invalid auth header: {e}"))
            })?;
        request.headers_mut().insert("Authorization", value);
    }

    Ok(request)
}
