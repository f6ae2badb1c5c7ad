// src/api/client.rs
//! HTTP client for the platform REST API
//!
//! Wraps `reqwest` with session-cookie propagation and the retry policy:
//! network errors and 5xx are retried with exponential backoff and jitter;
//! 4xx are final, except 408 and 429.

use rand::Rng;
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::types::ApiErrorBody;
use crate::error::EngineError;
use crate::session::SessionStore;

const SESSION_COOKIE_NAME: &str = "driver.sid";
const BACKOFF_BASE_MS: u64 = 400;
const BACKOFF_CAP_MS: u64 = 8_000;

pub struct ApiClient {
    http_client: Client,
    base_url: String,
    session: SessionStore,
    client_host: String,
    max_retries: u32,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root (e.g. "https://api.ride-platform.io")
    /// * `timeout_ms` - per-request timeout in milliseconds
    /// * `max_retries` - additional attempts after the first failure
    pub fn new(
        base_url: &str,
        timeout_ms: u64,
        max_retries: u32,
        session: SessionStore,
    ) -> Result<Self, EngineError> {
        let http_client = ClientBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
            client_host: crate::client_host().to_string(),
            max_retries,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub(crate) async fn get<R>(&self, path: &str) -> Result<R, EngineError>
    where
        R: DeserializeOwned,
    {
        self.request::<(), R>(Method::GET, path, None).await
    }

    pub(crate) async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, EngineError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        self.request(Method::POST, path, Some(body)).await
    }

    pub(crate) async fn patch<B, R>(&self, path: &str, body: &B) -> Result<R, EngineError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        self.request(Method::PATCH, path, Some(body)).await
    }

    /// Execute a request with the retry policy applied.
    #[instrument(skip(self, body), fields(method = %method, path = %path))]
    async fn request<B, R>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<R, EngineError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let mut attempt: u32 = 0;

        loop {
            match self.execute_once(method.clone(), path, body).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        "Request {} {} failed ({}), retry {}/{} in {:?}",
                        method,
                        path,
                        e,
                        attempt + 1,
                        self.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn execute_once<B, R>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<R, EngineError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .http_client
            .request(method, &url)
            .header("x-client-host", &self.client_host)
            .header("accept", "application/json");

        if let Some(token) = self.session.token().await {
            builder = builder.header("cookie", format!("{}={}", SESSION_COOKIE_NAME, token));
        }

        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(EngineError::from)?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await.map_err(EngineError::from)?;
            debug!("API response {}: {} bytes", status, body.len());
            return serde_json::from_str(&body)
                .map_err(|e| EngineError::Parse(format!("{} - Body: {}", e, body)));
        }

        Err(Self::classify_failure(status, response.text().await.ok()))
    }

    /// Map a non-2xx response to an error honoring the retry table.
    fn classify_failure(status: StatusCode, body: Option<String>) -> EngineError {
        match status.as_u16() {
            401 => EngineError::Unauthorized,
            // Retryable 4xx stay as plain HTTP errors
            408 | 429 => EngineError::Http(status.as_u16()),
            code if (400..500).contains(&code) => {
                if let Some(body) = body {
                    if let Ok(envelope) = serde_json::from_str::<ApiErrorBody>(&body) {
                        return EngineError::Api {
                            code: envelope.error,
                            message: envelope.message,
                        };
                    }
                }
                EngineError::Http(status.as_u16())
            }
            _ => EngineError::Http(status.as_u16()),
        }
    }
}

/// Exponential backoff with ±25% jitter, capped.
fn backoff_delay(attempt: u32) -> Duration {
    let base = BACKOFF_BASE_MS.saturating_mul(1u64 << attempt.min(16));
    let capped = base.min(BACKOFF_CAP_MS);
    let jitter_range = capped / 4;
    let jitter = rand::thread_rng().gen_range(0..=jitter_range * 2);
    Duration::from_millis(capped - jitter_range + jitter)
}
