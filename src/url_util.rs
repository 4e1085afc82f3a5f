//! Negotiate/connect URL composition (§4.F, §4.J), using structured `url::Url`
//! manipulation rather than string splicing or regex scheme substitution.

use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum UrlError {
    #[error("invalid base URL: {0}")]
    Parse(#[from] url::ParseError),
    #[error("URL has no scheme that can be promoted to a WebSocket scheme: {0}")]
    UnsupportedScheme(String),
}

/// Append `/negotiate`, ensuring exactly one `/` joins the base path, then
/// add `negotiateVersion=1` and optionally `useStatefulReconnect=true`,
/// preserving any existing query parameters.
pub fn negotiate_url(base: &str, use_stateful_reconnect: bool) -> Result<Url, UrlError> {
    let mut url = Url::parse(base)?;

    let joined_path = {
        let path = url.path();
        if path.ends_with('/') {
            format!("{path}negotiate")
        } else {
            format!("{path}/negotiate")
        }
    };
    url.set_path(&joined_path);

    url.query_pairs_mut().append_pair("negotiateVersion", "1");
    if use_stateful_reconnect {
        url.query_pairs_mut().append_pair("useStatefulReconnect", "true");
    }

    Ok(url)
}

/// Append `id=<connection_token>` to `base`, preserving existing query
/// parameters, and promote `http`/`https` schemes to `ws`/`wss`
/// case-insensitively.
pub fn connect_url(base: &str, connection_token: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut().append_pair("id", connection_token);
    promote_to_ws_scheme(&mut url)?;
    Ok(url)
}

/// Promote `http`/`https` (any case) to `ws`/`wss` in place. Already-`ws`/
/// `wss` URLs are left untouched; any other scheme is an error.
pub fn promote_to_ws_scheme(url: &mut Url) -> Result<(), UrlError> {
    let scheme = url.scheme().to_ascii_lowercase();
    let promoted = match scheme.as_str() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => return Ok(()),
        other => return Err(UrlError::UnsupportedScheme(other.to_owned())),
    };
    url.set_scheme(promoted)
        .map_err(|()| UrlError::UnsupportedScheme(scheme))
}
