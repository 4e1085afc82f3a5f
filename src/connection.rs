//! Connection state machine (§4.G): orchestrates negotiate, transport
//! selection, the steady-state send/receive plumbing, and stop.
//!
//! Implemented as a single actor task owning all mutable connection state,
//! the "actor-like single-task loop" option licensed by §5 — the same shape
//! as `services/receiver::session::run_session_loop`'s `tokio::select!` loop,
//! generalized from one race-timing session to this crate's one connection.

use std::sync::Arc;

use signalr_protocol::{Payload, TransferFormat};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};

use crate::access_token::{AccessTokenClient, ConstantTokenProvider};
use crate::config::{ConfigError, ConnectionOptions};
use crate::negotiate::{AvailableTransport, NegotiateClient, NegotiateError, NegotiateResponse};
use crate::send_queue::{SendQueue, SendQueueError, SendQueueHandle};
use crate::transport::{
    parse_transfer_format, CloseNotifier, Transport, TransportError, TransportHandles,
    TransportKind,
};
use crate::url_util::{self, UrlError};

const MAX_NEGOTIATE_REDIRECTS: u32 = 100;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid state transition: {0}")]
    InvalidState(&'static str),
    #[error("exceeded {MAX_NEGOTIATE_REDIRECTS} negotiate redirects")]
    RedirectLimit,
    #[error("no transport available: {0:?}")]
    NoTransportAvailable(Vec<(String, String)>),
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Negotiate(#[from] NegotiateError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Url(#[from] UrlError),
    #[error(transparent)]
    SendQueue(#[from] SendQueueError),
}

/// Connection lifecycle state (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// What `Connection::start` hands back to the caller on success: the
/// inbound-payload channel and a one-shot that fires exactly once when the
/// connection later closes, per the Design Notes' callback-slots-as-channels
/// license.
pub struct StartHandles {
    pub on_receive: mpsc::UnboundedReceiver<Payload>,
    pub on_close: oneshot::Receiver<Option<ConnectionError>>,
}

enum ActorCommand {
    Start {
        transfer_format: TransferFormat,
        respond: oneshot::Sender<Result<StartHandles, ConnectionError>>,
    },
    Send {
        payload: Payload,
        respond: oneshot::Sender<Result<(), ConnectionError>>,
    },
    Stop {
        respond: oneshot::Sender<()>,
    },
    StartFinished(Result<StartSuccess, ConnectionError>),
    TransportClosed(Option<TransportError>),
}

struct StartSuccess {
    connection_id: Option<String>,
    transport: Box<dyn Transport>,
    on_receive_rx: mpsc::UnboundedReceiver<Payload>,
    close_rx: oneshot::Receiver<Option<TransportError>>,
}

/// Public handle to a connection. Cloning shares the same underlying actor.
#[derive(Clone)]
pub struct Connection {
    cmd_tx: mpsc::UnboundedSender<ActorCommand>,
}

impl Connection {
    /// Construct a connection bound to `url`, spawning its actor task.
    /// Fails only if `options` itself is invalid (§6 precondition on
    /// `skip_negotiation`).
    pub fn new(url: impl Into<String>, options: ConnectionOptions) -> Result<Self, ConfigError> {
        let options = options.validated()?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let actor = Actor {
            url: url.into(),
            options,
            state: State::Disconnected,
            connection_id: None,
            connection_started: false,
            send_queue: None,
            send_queue_owner: None,
            on_close_tx: None,
            pending_start_respond: None,
            pending_start_task: None,
            cancel_tx: None,
            cmd_tx: cmd_tx.clone(),
        };
        tokio::spawn(actor.run(cmd_rx));
        Ok(Self { cmd_tx })
    }

    pub async fn start(&self, transfer_format: TransferFormat) -> Result<StartHandles, ConnectionError> {
        let (respond, rx) = oneshot::channel();
        self.cmd_tx
            .send(ActorCommand::Start { transfer_format, respond })
            .map_err(|_| ConnectionError::InvalidState("actor task has stopped"))?;
        rx.await.map_err(|_| ConnectionError::InvalidState("actor task has stopped"))?
    }

    pub async fn send(&self, payload: Payload) -> Result<(), ConnectionError> {
        let (respond, rx) = oneshot::channel();
        self.cmd_tx
            .send(ActorCommand::Send { payload, respond })
            .map_err(|_| ConnectionError::InvalidState("actor task has stopped"))?;
        rx.await.map_err(|_| ConnectionError::InvalidState("actor task has stopped"))?
    }

    pub async fn stop(&self) -> Result<(), ConnectionError> {
        let (respond, rx) = oneshot::channel();
        self.cmd_tx
            .send(ActorCommand::Stop { respond })
            .map_err(|_| ConnectionError::InvalidState("actor task has stopped"))?;
        rx.await.map_err(|_| ConnectionError::InvalidState("actor task has stopped"))?;
        Ok(())
    }
}

struct Actor {
    url: String,
    options: ConnectionOptions,
    state: State,
    connection_id: Option<String>,
    connection_started: bool,
    send_queue: Option<SendQueueHandle>,
    send_queue_owner: Option<SendQueue>,
    on_close_tx: Option<oneshot::Sender<Option<ConnectionError>>>,
    pending_start_respond: Option<oneshot::Sender<Result<StartHandles, ConnectionError>>>,
    pending_start_task: Option<tokio::task::JoinHandle<()>>,
    cancel_tx: Option<watch::Sender<bool>>,
    cmd_tx: mpsc::UnboundedSender<ActorCommand>,
}

impl Actor {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<ActorCommand>) {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                ActorCommand::Start { transfer_format, respond } => {
                    self.handle_start(transfer_format, respond);
                }
                ActorCommand::Send { payload, respond } => {
                    self.handle_send(payload, respond);
                }
                ActorCommand::Stop { respond } => {
                    self.handle_stop(respond).await;
                }
                ActorCommand::StartFinished(result) => {
                    self.handle_start_finished(result).await;
                }
                ActorCommand::TransportClosed(error) => {
                    self.handle_transport_closed(error);
                }
            }
        }
    }

    fn handle_start(
        &mut self,
        transfer_format: TransferFormat,
        respond: oneshot::Sender<Result<StartHandles, ConnectionError>>,
    ) {
        if self.state != State::Disconnected {
            let _ = respond.send(Err(ConnectionError::InvalidState(
                "start is only valid from Disconnected",
            )));
            return;
        }

        self.state = State::Connecting;
        self.pending_start_respond = Some(respond);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.cancel_tx = Some(cancel_tx);

        let url = self.url.clone();
        let options = self.options.clone();
        let cmd_tx = self.cmd_tx.clone();

        self.pending_start_task = Some(tokio::spawn(async move {
            let result = run_start(url, options, transfer_format, cancel_rx).await;
            let _ = cmd_tx.send(ActorCommand::StartFinished(result));
        }));
    }

    async fn handle_start_finished(&mut self, result: Result<StartSuccess, ConnectionError>) {
        self.pending_start_task = None;
        let respond = self.pending_start_respond.take();

        if self.state != State::Connecting {
            // A `stop()` raced in while this start attempt was still in
            // flight and already moved the state away from `Connecting` —
            // even if the start task won its internal race against
            // cancellation, don't resurrect the connection. Stop whatever it
            // produced and report `Cancelled` to the original `start()` caller.
            if let Ok(mut success) = result {
                let _ = success.transport.stop().await;
            }
            if let Some(respond) = respond {
                let _ = respond.send(Err(ConnectionError::Cancelled));
            }
            return;
        }

        match result {
            Ok(success) => {
                self.state = State::Connected;
                self.connection_id = success.connection_id;
                self.connection_started = true;

                let (close_tx, close_rx) = oneshot::channel();
                self.on_close_tx = Some(close_tx);

                let send_queue = SendQueue::start(success.transport, self.options.log_message_content);
                self.send_queue = Some(send_queue.handle());
                self.send_queue_owner = Some(send_queue);

                let cmd_tx = self.cmd_tx.clone();
                tokio::spawn(async move {
                    let error = success.close_rx.await.unwrap_or(None);
                    let _ = cmd_tx.send(ActorCommand::TransportClosed(error));
                });

                if let Some(respond) = respond {
                    let _ = respond.send(Ok(StartHandles {
                        on_receive: success.on_receive_rx,
                        on_close: close_rx,
                    }));
                }
            }
            Err(e) => {
                self.state = State::Disconnected;
                if let Some(respond) = respond {
                    let _ = respond.send(Err(e));
                }
            }
        }
    }

    fn handle_send(&mut self, payload: Payload, respond: oneshot::Sender<Result<(), ConnectionError>>) {
        if self.state != State::Connected {
            let _ = respond.send(Err(ConnectionError::InvalidState("send requires Connected")));
            return;
        }
        let Some(handle) = self.send_queue.clone() else {
            let _ = respond.send(Err(ConnectionError::InvalidState("no active transport")));
            return;
        };
        tokio::spawn(async move {
            let result = handle.send(payload).await.map_err(ConnectionError::from);
            let _ = respond.send(result);
        });
    }

    async fn handle_stop(&mut self, respond: oneshot::Sender<()>) {
        match self.state {
            State::Disconnected => {
                let _ = respond.send(());
            }
            State::Connecting => {
                if let Some(cancel_tx) = &self.cancel_tx {
                    let _ = cancel_tx.send(true);
                }
                self.state = State::Disconnecting;
                if let Some(task) = self.pending_start_task.take() {
                    let _ = task.await;
                }
                self.state = State::Disconnected;
                let _ = respond.send(());
            }
            State::Connected | State::Disconnecting => {
                self.state = State::Disconnecting;
                self.send_queue = None;
                if let Some(queue) = self.send_queue_owner.take() {
                    queue.stop().await;
                }
                self.finish_stop(None);
                let _ = respond.send(());
            }
        }
    }

    fn handle_transport_closed(&mut self, error: Option<TransportError>) {
        if self.state == State::Disconnected {
            return;
        }
        self.state = State::Disconnecting;
        self.send_queue = None;
        self.send_queue_owner = None;
        self.finish_stop(error.map(ConnectionError::from));
    }

    /// Common tail of the stop path: transitions to Disconnected and, iff
    /// the connection ever reached Connected, fires `on_close` exactly once.
    fn finish_stop(&mut self, error: Option<ConnectionError>) {
        self.state = State::Disconnected;
        if self.connection_started {
            if let Some(tx) = self.on_close_tx.take() {
                let _ = tx.send(error);
            }
        }
    }
}

async fn run_start(
    mut url: String,
    options: ConnectionOptions,
    transfer_format: TransferFormat,
    mut cancel_rx: watch::Receiver<bool>,
) -> Result<StartSuccess, ConnectionError> {
    let http_client = options.http_client.clone().unwrap_or_default();
    let token_client = AccessTokenClient::new(http_client, options.access_token_provider.clone());
    let mut negotiate_client = NegotiateClient::new(token_client);
    let mut token_provider = options.access_token_provider.clone();

    if options.skip_negotiation {
        let mut connect_url = url::Url::parse(&url).map_err(UrlError::Parse)?;
        url_util::promote_to_ws_scheme(&mut connect_url)?;
        return connect_chosen_transport(
            vec![AvailableTransport {
                transport: TransportKind::WebSockets.name().to_owned(),
                transfer_formats: vec!["Text".to_owned(), "Binary".to_owned()],
            }],
            connect_url,
            None,
            &options,
            transfer_format,
            token_provider,
            &mut cancel_rx,
        )
        .await;
    }

    let mut response: NegotiateResponse;
    let mut attempts = 0u32;
    loop {
        if *cancel_rx.borrow() {
            return Err(ConnectionError::Cancelled);
        }
        attempts += 1;
        if attempts > MAX_NEGOTIATE_REDIRECTS {
            return Err(ConnectionError::RedirectLimit);
        }

        let negotiated = tokio::select! {
            biased;
            _ = cancel_rx.changed() => return Err(ConnectionError::Cancelled),
            res = negotiate_client.negotiate(&url, &options) => res?,
        };

        if let Some(token) = &negotiated.access_token {
            let provider: Arc<dyn crate::access_token::AccessTokenProvider> =
                Arc::new(ConstantTokenProvider::new(token.clone()));
            token_provider = Some(provider.clone());
            negotiate_client = NegotiateClient::new(AccessTokenClient::new(
                options.http_client.clone().unwrap_or_default(),
                Some(provider),
            ));
        }

        if let Some(redirect) = negotiated.url.clone() {
            url = redirect;
            continue;
        }

        response = negotiated;
        break;
    }

    let connection_token = response.connection_token.clone();
    let connect_url = url_util::connect_url(&url, connection_token.as_deref().unwrap_or_default())?;

    let available = response.available_transports.clone().unwrap_or_default();
    connect_chosen_transport(
        available,
        connect_url,
        response.connection_id.clone(),
        &options,
        transfer_format,
        token_provider,
        &mut cancel_rx,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn connect_chosen_transport(
    available: Vec<AvailableTransport>,
    connect_url: url::Url,
    connection_id: Option<String>,
    options: &ConnectionOptions,
    transfer_format: TransferFormat,
    token_provider: Option<Arc<dyn crate::access_token::AccessTokenProvider>>,
    cancel_rx: &mut watch::Receiver<bool>,
) -> Result<StartSuccess, ConnectionError> {
    let mut errors = Vec::new();
    let wanted_format_name = match transfer_format {
        TransferFormat::Text => "text",
        TransferFormat::Binary => "binary",
    };

    for entry in available {
        if *cancel_rx.borrow() {
            return Err(ConnectionError::Cancelled);
        }

        let Some(kind) = TransportKind::from_name(&entry.transport) else {
            errors.push((entry.transport.clone(), "unknown transport".to_owned()));
            continue;
        };

        if !options.transport.contains(kind.as_bit()) {
            errors.push((
                entry.transport.clone(),
                format!("'{}' is disabled by the client", kind.name()),
            ));
            continue;
        }

        let supports_format = entry.transfer_formats.iter().any(|f| {
            parse_transfer_format(f)
                .map(|parsed| {
                    let name = match parsed {
                        TransferFormat::Text => "text",
                        TransferFormat::Binary => "binary",
                    };
                    name == wanted_format_name
                })
                .unwrap_or(false)
        });
        if !supports_format {
            errors.push((
                entry.transport.clone(),
                format!("'{}' does not support the '{wanted_format_name}' transfer format", kind.name()),
            ));
            continue;
        }

        if kind != TransportKind::WebSockets {
            errors.push((
                entry.transport.clone(),
                format!("'{}' transport is not implemented by this client", kind.name()),
            ));
            continue;
        }

        let mut transport = crate::transport::WebSocketTransport::new(
            token_provider.clone(),
            options.headers.clone(),
            options.log_message_content,
        );
        let (on_receive_tx, on_receive_rx) = mpsc::unbounded_channel();
        let (close_notifier, close_rx) = CloseNotifier::new();
        let handles = TransportHandles { on_receive: on_receive_tx, on_close: close_notifier };

        let connect_result = tokio::select! {
            biased;
            _ = cancel_rx.changed() => return Err(ConnectionError::Cancelled),
            res = transport.connect(connect_url.as_str(), transfer_format, handles) => res,
        };

        match connect_result {
            Ok(()) => {
                info!(transport = kind.name(), %connect_url, "transport connected");
                return Ok(StartSuccess {
                    connection_id,
                    transport: Box::new(transport),
                    on_receive_rx,
                    close_rx,
                });
            }
            Err(e) => {
                warn!(transport = kind.name(), error = %e, "transport failed to connect");
                errors.push((entry.transport.clone(), e.to_string()));
            }
        }
    }

    Err(ConnectionError::NoTransportAvailable(errors))
}
