// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! Defines the file format (JSON or YAML) and the fully resolved
//! configuration handed to the tracker.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::flush::{DATAPATHS_ENDPOINT, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
use crate::node::{NodeIdentity, DEFAULT_ENV, DEFAULT_SERVICE};

/// Default flush interval and bucket width in seconds.
pub const DEFAULT_INTERVAL_SECS: u64 = 10;

/// AccuPath configuration as written in `.accupath.json` or `.accupath.yaml`.
///
/// Every field is optional; unset fields fall through to lower-precedence
/// sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccuPathConfig {
    /// Service name of this node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    /// Deployment environment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Collector API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Collector base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Path appended to the base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub flush_interval_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_size_secs: Option<u64>,

    /// Collector request timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Tag stamped on pathways this node starts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Master switch for tracking and flushing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Verify the checkpoint chain before submitting stats
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_chain: Option<bool>,
}

/// Fully resolved configuration with defaults applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub service: String,
    pub env: String,
    pub hostname: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub endpoint: String,
    pub flush_interval_secs: u64,
    pub bucket_size_secs: u64,
    pub timeout_secs: u64,
    pub tag: String,
    pub enabled: bool,
    pub verify_chain: bool,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            env: DEFAULT_ENV.to_string(),
            hostname: String::new(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            endpoint: DATAPATHS_ENDPOINT.to_string(),
            flush_interval_secs: DEFAULT_INTERVAL_SECS,
            bucket_size_secs: DEFAULT_INTERVAL_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            tag: String::new(),
            enabled: true,
            verify_chain: false,
        }
    }
}

impl ResolvedConfig {
    /// Identity of the node this configuration describes.
    pub fn node(&self) -> NodeIdentity {
        NodeIdentity::new(&self.service, &self.env, &self.hostname)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn bucket_size_ns(&self) -> i64 {
        (self.bucket_size_secs as i64).saturating_mul(1_000_000_000)
    }

    pub fn collector_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.endpoint)
    }

    /// Reject values the tracker cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("flushIntervalSecs", self.flush_interval_secs),
            ("bucketSizeSecs", self.bucket_size_secs),
            ("timeoutSecs", self.timeout_secs),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "baseUrl".to_string(),
                message: format!("not an http(s) URL: {}", self.base_url),
            });
        }
        Ok(())
    }
}
