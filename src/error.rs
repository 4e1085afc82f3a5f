//! Top-level error type composing every sub-module's error via `#[from]`,
//! mirroring the layering `services/receiver` uses between its narrower
//! `DbError`/`SessionError` types and their call sites.

use thiserror::Error;

use crate::config::ConfigError;
use crate::connection::ConnectionError;
use crate::negotiate::NegotiateError;
use crate::send_queue::SendQueueError;
use crate::transport::TransportError;
use crate::url_util::UrlError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Negotiate(#[from] NegotiateError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    SendQueue(#[from] SendQueueError),
    #[error(transparent)]
    Url(#[from] UrlError),
}
