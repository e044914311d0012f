// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Delivery of encoded payloads to the collector.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

#[cfg(feature = "telemetry")]
use tracing::debug;

use crate::error::FlushError;

/// Default collector base URL.
pub const DEFAULT_BASE_URL: &str = "https://trace-internal.agent.datad0g.com";

/// Path the payloads are POSTed to.
pub const DATAPATHS_ENDPOINT: &str = "/api/v0.2/datapaths";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "DD-API-KEY";

/// Something that can carry one encoded payload to a collector.
///
/// Implementations return the HTTP status of any response they receive and
/// reserve `Err` for failures where no response arrived.
#[async_trait]
pub trait CollectorTransport: Send + Sync {
    async fn send(&self, body: Vec<u8>) -> Result<u16, FlushError>;

    /// Where payloads go, for logs.
    fn target(&self) -> String;
}

/// Collector reached over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpCollector {
    client: Client,
    url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpCollector {
    /// Create a collector client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Collector base URL
    /// * `endpoint` - Path appended to the base URL
    /// * `api_key` - Value of the `DD-API-KEY` header
    /// * `timeout` - Per-request timeout
    pub fn new(
        base_url: &str,
        endpoint: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FlushError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FlushError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), endpoint),
            api_key: api_key.into(),
            timeout,
        })
    }

    /// Collector at the default endpoint under `base_url`.
    pub fn with_defaults(base_url: &str, api_key: impl Into<String>) -> Result<Self, FlushError> {
        Self::new(
            base_url,
            DATAPATHS_ENDPOINT,
            api_key,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CollectorTransport for HttpCollector {
    async fn send(&self, body: Vec<u8>) -> Result<u16, FlushError> {
        #[cfg(feature = "telemetry")]
        debug!(url = %self.url, bytes = body.len(), "Posting pathway payload");

        let response = self
            .client
            .post(&self.url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("content-type", "application/x-protobuf")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FlushError::Timeout(self.timeout.as_millis() as u64)
                } else {
                    FlushError::NetworkError(e.to_string())
                }
            })?;

        Ok(response.status().as_u16())
    }

    fn target(&self) -> String {
        self.url.clone()
    }
}
