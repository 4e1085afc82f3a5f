//! Negotiate client (§4.F): POSTs to `<base>/negotiate`, decodes the
//! response, and applies the version-compatibility normalisation.

use reqwest::header::HeaderMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::access_token::AccessTokenClient;
use crate::config::{user_agent, ConnectionOptions};
use crate::url_util::{self, UrlError};

#[derive(Debug, Error)]
pub enum NegotiateError {
    #[error("negotiate request failed: {0}")]
    Request(String),
    #[error("negotiate returned status {0}: not a SignalR endpoint or a proxy is blocking")]
    Status404,
    #[error("negotiate returned status {0}")]
    Status(u16),
    #[error("negotiate response was not valid JSON: {0}")]
    Decode(String),
    #[error("negotiate server error: {0}")]
    ServerError(String),
    #[error("server enabled stateful reconnect but the client did not request it")]
    StatefulReconnectMismatch,
    #[error(transparent)]
    Url(#[from] UrlError),
}

/// A single entry in a negotiate response's `availableTransports` list.
#[derive(Debug, Clone, Deserialize)]
pub struct AvailableTransport {
    pub transport: String,
    #[serde(rename = "transferFormats")]
    pub transfer_formats: Vec<String>,
}

/// The decoded and normalised negotiate response (§3).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NegotiateResponse {
    #[serde(rename = "connectionId")]
    pub connection_id: Option<String>,
    #[serde(rename = "connectionToken")]
    pub connection_token: Option<String>,
    #[serde(rename = "negotiateVersion")]
    pub negotiate_version: Option<u32>,
    #[serde(rename = "availableTransports")]
    pub available_transports: Option<Vec<AvailableTransport>>,
    pub url: Option<String>,
    #[serde(rename = "accessToken")]
    pub access_token: Option<String>,
    pub error: Option<String>,
    #[serde(rename = "useStatefulReconnect")]
    pub use_stateful_reconnect: Option<bool>,
}

pub struct NegotiateClient {
    http: AccessTokenClient,
}

impl NegotiateClient {
    pub fn new(http: AccessTokenClient) -> Self {
        Self { http }
    }

    /// Perform one negotiate round-trip against `base_url`, applying the
    /// `negotiateVersion<1 ⇒ connectionToken := connectionId` normalisation
    /// and rejecting an unrequested stateful-reconnect grant.
    pub async fn negotiate(
        &self,
        base_url: &str,
        options: &ConnectionOptions,
    ) -> Result<NegotiateResponse, NegotiateError> {
        let url = url_util::negotiate_url(base_url, options.use_stateful_reconnect)?;
        debug!(%url, "sending negotiate request");

        let headers = merged_headers(&options.headers);
        let response = self
            .http
            .post(url, headers)
            .await
            .map_err(|e| NegotiateError::Request(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(NegotiateError::Status404);
        }
        if !status.is_success() {
            return Err(NegotiateError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| NegotiateError::Request(e.to_string()))?;
        let mut decoded: NegotiateResponse =
            serde_json::from_str(&body).map_err(|e| NegotiateError::Decode(e.to_string()))?;

        if let Some(error) = &decoded.error {
            return Err(NegotiateError::ServerError(error.clone()));
        }

        if decoded.negotiate_version.unwrap_or(0) < 1 {
            decoded.connection_token = decoded.connection_id.clone();
        }

        if decoded.use_stateful_reconnect == Some(true) && !options.use_stateful_reconnect {
            return Err(NegotiateError::StatefulReconnectMismatch);
        }

        if decoded.url.is_none() {
            warn_if_no_transports(&decoded);
        }

        Ok(decoded)
    }
}

fn warn_if_no_transports(response: &NegotiateResponse) {
    if response
        .available_transports
        .as_ref()
        .map(Vec::is_empty)
        .unwrap_or(true)
    {
        warn!("negotiate response carried no available transports");
    }
}

fn merged_headers(caller_headers: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        user_agent().parse().expect("user-agent string is valid ASCII"),
    );
    for (name, value) in caller_headers {
        headers.insert(name.clone(), value.clone());
    }
    headers
}
