//! JSON-over-HTTP exchange used by the session client.
//!
//! [`JsonTransport`] is the seam between the login/reservation logic and the
//! network, so the client can be exercised against a scripted transport.
//! [`HttpTransport`] is the real implementation on top of reqwest.

#![allow(async_fn_in_trait)]

use crate::error::{ApiError, Result};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Request/response exchange of JSON documents.
pub trait JsonTransport: Send + Sync {
    /// GET `url`, optionally with a bearer token.
    ///
    /// # Errors
    ///
    /// `Http` for non-2xx answers, `Transport` if the request failed,
    /// `Decode` if the body is not JSON.
    async fn get(&self, url: &str, token: Option<&str>) -> Result<Value>;

    /// POST `body` (or an empty body) to `url`, optionally with a bearer token.
    ///
    /// # Errors
    ///
    /// Same as [`JsonTransport::get`].
    async fn post(&self, url: &str, body: Option<&Value>, token: Option<&str>) -> Result<Value>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    /// Build a transport with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ride-kiosk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::transport(e.to_string()))?;
        Ok(Self { http })
    }

    /// Wrap an existing client.
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::transport(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, url, "API request rejected");
            return Err(ApiError::http(status.as_u16(), url));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::transport(format!("{url}: {e}")))?;
        debug!(%status, url, len = body.len(), "API response");

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| ApiError::decode(format!("{url} returned invalid JSON: {e}")))
    }
}

fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

impl JsonTransport for HttpTransport {
    async fn get(&self, url: &str, token: Option<&str>) -> Result<Value> {
        debug!(url, "GET");
        let request = authorize(self.http.get(url), token);
        self.send(request, url).await
    }

    async fn post(&self, url: &str, body: Option<&Value>, token: Option<&str>) -> Result<Value> {
        debug!(url, "POST");
        let mut request = authorize(self.http.post(url), token);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(request, url).await
    }
}
