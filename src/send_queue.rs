//! Ordered, coalescing send queue (§4.H): a single worker task drains
//! buffered payloads, concatenates whatever is currently queued into one
//! batch, and hands it to the transport — the corrected single-consumer
//! design the spec's Design Notes call for, replacing the teacher source's
//! two drafts (one of which re-initialised its continuation inside the
//! loop).

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use signalr_protocol::Payload;

use crate::transport::{Transport, TransportError};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SendQueueError {
    #[error(transparent)]
    Transport(#[from] TransportErrorClone),
    #[error("send queue has been stopped")]
    Stopped,
}

/// `TransportError` as given to `thiserror`'s `#[from]` — cloned so that
/// every waiter on a failed batch can receive the same error value.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct TransportErrorClone(String);

impl From<TransportError> for TransportErrorClone {
    fn from(e: TransportError) -> Self {
        Self(e.to_string())
    }
}

struct SendQueueItem {
    payload: Payload,
    ack: oneshot::Sender<Result<(), SendQueueError>>,
}

/// Handle producers use to enqueue outbound payloads.
#[derive(Clone)]
pub struct SendQueueHandle {
    tx: mpsc::UnboundedSender<SendQueueItem>,
}

impl SendQueueHandle {
    /// Enqueue `payload`; resolves once it has been flushed to the transport
    /// (as part of whatever batch the worker formed), or once the queue has
    /// entered a failed/stopped state.
    pub async fn send(&self, payload: Payload) -> Result<(), SendQueueError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(SendQueueItem { payload, ack: ack_tx })
            .map_err(|_| SendQueueError::Stopped)?;
        ack_rx.await.map_err(|_| SendQueueError::Stopped)?
    }
}

/// Owns the worker task and the transport it drains into.
pub struct SendQueue {
    handle: SendQueueHandle,
    worker: tokio::task::JoinHandle<()>,
}

impl SendQueue {
    /// `log_message_content` (§6) gates whether the flushed batch is logged
    /// verbatim or just by byte length — payloads can carry arbitrary
    /// application data, so verbatim logging is opt-in.
    pub fn start(mut transport: Box<dyn Transport>, log_message_content: bool) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<SendQueueItem>();

        let worker = tokio::spawn(async move {
            let mut failed: Option<SendQueueError> = None;

            while let Some(first) = rx.recv().await {
                if let Some(error) = &failed {
                    let _ = first.ack.send(Err(error.clone()));
                    continue;
                }

                let mut batch = vec![first];
                while let Ok(next) = rx.try_recv() {
                    batch.push(next);
                }

                let payloads: Vec<&Payload> = batch.iter().map(|item| &item.payload).collect();
                let concatenated = concat_batch(&payloads);
                if log_message_content {
                    debug!(frames = batch.len(), payload = ?concatenated, "flushing coalesced send-queue batch");
                } else {
                    debug!(frames = batch.len(), bytes = payload_len(&concatenated), "flushing coalesced send-queue batch");
                }

                match transport.send(concatenated).await {
                    Ok(()) => {
                        for item in batch {
                            let _ = item.ack.send(Ok(()));
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "send queue transport.send failed, entering failed state");
                        let error = SendQueueError::Transport(TransportErrorClone::from(e));
                        for item in batch {
                            let _ = item.ack.send(Err(error.clone()));
                        }
                        failed = Some(error);
                    }
                }
            }

            let _ = transport.stop().await;
        });

        Self {
            handle: SendQueueHandle { tx },
            worker,
        }
    }

    pub fn handle(&self) -> SendQueueHandle {
        self.handle.clone()
    }

    /// Stop the queue: flushes nothing new, drops the producer side so the
    /// worker drains its remaining backlog (failing it, since the transport
    /// is being stopped) and exits, then joins the worker.
    pub async fn stop(self) {
        drop(self.handle);
        let _ = self.worker.await;
    }
}

fn payload_len(payload: &Payload) -> usize {
    match payload {
        Payload::Text(t) => t.len(),
        Payload::Binary(b) => b.len(),
    }
}

fn concat_batch(items: &[&Payload]) -> Payload {
    match items.first() {
        Some(Payload::Binary(_)) => {
            let mut bytes = Vec::new();
            for item in items {
                if let Payload::Binary(b) = item {
                    bytes.extend_from_slice(b);
                }
            }
            Payload::Binary(bytes)
        }
        _ => {
            let mut text = String::new();
            for item in items {
                if let Payload::Text(t) = item {
                    text.push_str(t);
                }
            }
            Payload::Text(text)
        }
    }
}
