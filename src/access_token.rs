//! Access-token injection: wraps outgoing HTTP requests with a bearer token
//! sourced from an async provider, refreshing once on a 401.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};

/// An async source of bearer tokens.
///
/// The negotiate response's `accessToken` field replaces whatever provider
/// was configured with a [`ConstantTokenProvider`] for the rest of the
/// connection's lifetime (§4.F).
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn get_token(&self) -> Option<String>;
}

/// A provider that always returns the same token.
pub struct ConstantTokenProvider(String);

impl ConstantTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AccessTokenProvider for ConstantTokenProvider {
    async fn get_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

type BoxedTokenFuture = Pin<Box<dyn Future<Output = Option<String>> + Send>>;

/// Adapts an async closure (the shape an `accessTokenFactory` configuration
/// option is given in) into an [`AccessTokenProvider`].
pub struct FnTokenProvider<F>(F)
where
    F: Fn() -> BoxedTokenFuture + Send + Sync;

impl<F> FnTokenProvider<F>
where
    F: Fn() -> BoxedTokenFuture + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> AccessTokenProvider for FnTokenProvider<F>
where
    F: Fn() -> BoxedTokenFuture + Send + Sync,
{
    async fn get_token(&self) -> Option<String> {
        (self.0)().await
    }
}

pub type SharedTokenProvider = Arc<dyn AccessTokenProvider>;

/// Wraps a `reqwest::Client`, attaching `Authorization: Bearer <token>` to
/// every request when a provider is configured, and retrying once on a 401.
pub struct AccessTokenClient {
    inner: Client,
    provider: Option<SharedTokenProvider>,
}

impl AccessTokenClient {
    pub fn new(inner: Client, provider: Option<SharedTokenProvider>) -> Self {
        Self { inner, provider }
    }

    /// Replace the provider — used once negotiate returns an `accessToken`.
    pub fn set_provider(&mut self, provider: SharedTokenProvider) {
        self.provider = Some(provider);
    }

    /// POST to `url` with `headers` and an empty body, injecting the bearer
    /// token and retrying once on a 401.
    pub async fn post(
        &self,
        url: reqwest::Url,
        headers: HeaderMap,
    ) -> Result<Response, reqwest::Error> {
        let token = self.current_token().await;
        let response = self.send_once(url.clone(), headers.clone(), token.as_deref()).await?;

        if response.status() == StatusCode::UNAUTHORIZED && self.provider.is_some() {
            let refreshed = self.current_token().await;
            return self.send_once(url, headers, refreshed.as_deref()).await;
        }

        Ok(response)
    }

    async fn current_token(&self) -> Option<String> {
        match &self.provider {
            Some(p) => p.get_token().await,
            None => None,
        }
    }

    async fn send_once(
        &self,
        url: reqwest::Url,
        mut headers: HeaderMap,
        token: Option<&str>,
    ) -> Result<Response, reqwest::Error> {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let value = format!("Bearer {token}")
                .parse()
                .expect("bearer header value is always valid ASCII");
            headers.insert(AUTHORIZATION, value);
        }
        self.inner.post(url).headers(headers).send().await
    }
}
