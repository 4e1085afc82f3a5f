//! Connection configuration (§6): a typed struct with documented defaults,
//! built through a validating constructor rather than a bare `Default` that
//! would silently accept nonsensical combinations.

use std::time::Duration;

use reqwest::header::HeaderMap;

use crate::access_token::SharedTokenProvider;
use crate::transport::TransportType;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("skip_negotiation requires transport == TransportType::WEBSOCKETS")]
    SkipNegotiationRequiresWebSocketsOnly,
}

/// Per-connection configuration options (§6).
#[derive(Clone)]
pub struct ConnectionOptions {
    pub access_token_provider: Option<SharedTokenProvider>,
    pub http_client: Option<reqwest::Client>,
    pub transport: TransportType,
    pub skip_negotiation: bool,
    pub headers: HeaderMap,
    pub with_credentials: bool,
    pub timeout: Duration,
    pub log_message_content: bool,
    pub use_stateful_reconnect: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            access_token_provider: None,
            http_client: None,
            transport: TransportType::ALL,
            skip_negotiation: false,
            headers: HeaderMap::new(),
            with_credentials: true,
            timeout: Duration::from_secs(100),
            log_message_content: false,
            use_stateful_reconnect: false,
        }
    }
}

impl ConnectionOptions {
    /// Validate the combination of options, per §6's precondition that
    /// `skip_negotiation` is only valid with `transport == WebSockets`.
    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.skip_negotiation && self.transport != TransportType::WEBSOCKETS {
            return Err(ConfigError::SkipNegotiationRequiresWebSocketsOnly);
        }
        Ok(self)
    }

    pub fn with_access_token_provider(mut self, provider: SharedTokenProvider) -> Self {
        self.access_token_provider = Some(provider);
        self
    }

    pub fn with_transport(mut self, transport: TransportType) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_skip_negotiation(mut self, skip: bool) -> Self {
        self.skip_negotiation = skip;
        self
    }
}

pub(crate) fn user_agent() -> String {
    format!("signalr-client-rust/{}", env!("CARGO_PKG_VERSION"))
}
