// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Transport seam towards the collector.
//!
//! The coordinator only talks to [`HttpClient`] trait objects produced by an
//! [`HttpClientProvider`], so tests and embedders can swap the transport. The
//! default implementation is backed by `reqwest`. This module also hosts the
//! exponential backoff helper used while the handshake keeps failing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, trace};

/// Agent technology type reported with every request.
const TECHNOLOGY_TYPE: &str = "okrust";
/// Protocol version understood by the collector.
const PROTOCOL_VERSION: &str = "1";
/// Content type of beacon payloads.
const BEACON_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings a transport client is built from.
///
/// A new configuration is published whenever the collector hands out a new
/// monitor name or server id; clients never mutate their configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientConfiguration {
    /// Collector endpoint including the monitor name path segment.
    pub base_url: String,
    pub application_id: String,
    pub server_id: i32,
    /// Log every request and response at debug level.
    pub verbose: bool,
}

/// Status, body and headers of a collector reply.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    pub headers: HeaderMap,
}

/// Failures while talking to the collector.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, DNS, TLS or timeout failure while sending a request.
    #[error("request to collector failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Failure reported by a custom transport implementation.
    #[error("collector unreachable: {0}")]
    Unreachable(String),
    /// The client could not be constructed from its configuration.
    #[error("failed to build collector client: {0}")]
    ClientBuild(String),
}

impl TransportError {
    /// Whether repeating the request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Request(_) | TransportError::Unreachable(_)
        )
    }
}

/// Sends status checks and beacon payloads to the collector.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Requests the current collector configuration without a payload.
    async fn send_status_request(&self) -> Result<RawResponse, TransportError>;

    /// Ships one beacon chunk.
    async fn send_beacon_request(&self, payload: Vec<u8>) -> Result<RawResponse, TransportError>;
}

/// Creates transport clients for a given configuration.
pub trait HttpClientProvider: Send + Sync {
    fn create_client(
        &self,
        configuration: &HttpClientConfiguration,
    ) -> Result<Arc<dyn HttpClient>, TransportError>;
}

/// Provider building [`ReqwestHttpClient`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHttpClientProvider;

impl HttpClientProvider for DefaultHttpClientProvider {
    fn create_client(
        &self,
        configuration: &HttpClientConfiguration,
    ) -> Result<Arc<dyn HttpClient>, TransportError> {
        Ok(Arc::new(ReqwestHttpClient::new(configuration.clone())?))
    }
}

/// `reqwest`-backed collector client.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Client,
    configuration: HttpClientConfiguration,
}

impl ReqwestHttpClient {
    pub fn new(configuration: HttpClientConfiguration) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        let user_agent = format!("beacon-core/{AGENT_VERSION}");
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent)
                .map_err(|e| TransportError::ClientBuild(e.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TransportError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            configuration,
        })
    }

    pub fn configuration(&self) -> &HttpClientConfiguration {
        &self.configuration
    }

    fn query(&self) -> [(&'static str, String); 6] {
        [
            ("type", "m".to_string()),
            ("srvid", self.configuration.server_id.to_string()),
            ("app", self.configuration.application_id.clone()),
            ("va", AGENT_VERSION.to_string()),
            ("pt", PROTOCOL_VERSION.to_string()),
            ("tt", TECHNOLOGY_TYPE.to_string()),
        ]
    }

    async fn read_response(
        &self,
        kind: &'static str,
        response: reqwest::Response,
    ) -> Result<RawResponse, TransportError> {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;

        if self.configuration.verbose {
            debug!(
                kind = kind,
                status = status,
                headers = ?headers,
                body = %body,
                "collector response"
            );
        } else {
            trace!(kind = kind, status = status, "collector response");
        }

        Ok(RawResponse {
            status,
            body,
            headers,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send_status_request(&self) -> Result<RawResponse, TransportError> {
        if self.configuration.verbose {
            debug!(
                url = %self.configuration.base_url,
                server_id = self.configuration.server_id,
                "sending status request"
            );
        }

        let response = self
            .client
            .get(&self.configuration.base_url)
            .query(&self.query())
            .send()
            .await?;
        self.read_response("status", response).await
    }

    async fn send_beacon_request(&self, payload: Vec<u8>) -> Result<RawResponse, TransportError> {
        if self.configuration.verbose {
            debug!(
                url = %self.configuration.base_url,
                server_id = self.configuration.server_id,
                body_len = payload.len(),
                "sending beacon request"
            );
        }

        let response = self
            .client
            .post(&self.configuration.base_url)
            .query(&self.query())
            .header(CONTENT_TYPE, BEACON_CONTENT_TYPE)
            .body(payload)
            .send()
            .await?;
        self.read_response("beacon", response).await
    }
}

/// Configuration parameters for exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Delay after the first failure, in seconds.
    pub base_seconds: f64,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Exponential factor applied per consecutive failure.
    pub factor: f64,
    /// Number of consecutive successes required to decrease the error count.
    pub recovery_interval: usize,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_seconds: 1.0,
            max_backoff: Duration::from_secs(10 * 60),
            factor: 2.0,
            recovery_interval: 1,
        }
    }
}

/// Tracks consecutive failures and derives the next retry delay.
#[derive(Debug)]
pub struct BackoffState {
    config: BackoffConfig,
    error_count: usize,
    success_streak: usize,
}

impl BackoffState {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            error_count: 0,
            success_streak: 0,
        }
    }

    /// Registers a failure and returns the delay before retrying.
    pub fn register_error(&mut self) -> Duration {
        self.success_streak = 0;
        self.error_count = self.error_count.saturating_add(1);
        let exponent = self.error_count.saturating_sub(1).min(64) as i32;
        let backoff_secs = self.config.base_seconds * self.config.factor.powi(exponent);
        let capped = backoff_secs
            .min(self.config.max_backoff.as_secs_f64())
            .max(0.0);
        Duration::from_secs_f64(capped)
    }

    /// Registers a success, decaying the error count once the streak is long enough.
    pub fn register_success(&mut self) {
        self.success_streak = self.success_streak.saturating_add(1);
        if self.success_streak >= self.config.recovery_interval {
            self.error_count = 0;
            self.success_streak = 0;
        }
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }
}
