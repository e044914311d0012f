// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logical service node identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PropagationError;
use crate::hash::fnv1a_64;

/// Default service name when `DD_SERVICE` is not set.
pub const DEFAULT_SERVICE: &str = "unnamed-service";

/// Default environment when `DD_ENV` is not set.
pub const DEFAULT_ENV: &str = "none";

/// Identifies a logical service node by service, environment and host.
///
/// The hash is the linchpin of cross-process path matching: two processes
/// that describe the same node must produce byte-identical fields, so no
/// normalization is applied here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub service: String,
    pub env: String,
    pub hostname: String,
}

impl NodeIdentity {
    /// Create a node identity from its three fields.
    pub fn new(
        service: impl Into<String>,
        env: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            env: env.into(),
            hostname: hostname.into(),
        }
    }

    /// Read the identity from `DD_SERVICE`, `DD_ENV` and `DD_HOSTNAME`.
    pub fn from_local_environment() -> Self {
        Self::new(
            std::env::var("DD_SERVICE").unwrap_or_else(|_| DEFAULT_SERVICE.to_string()),
            std::env::var("DD_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string()),
            std::env::var("DD_HOSTNAME").unwrap_or_default(),
        )
    }

    /// Stable 64-bit hash over `service || env || hostname`.
    ///
    /// There is no separator between the fields, so ("ab", "c") and
    /// ("a", "bc") collide.
    pub fn hash(&self) -> u64 {
        let mut bytes =
            Vec::with_capacity(self.service.len() + self.env.len() + self.hostname.len());
        bytes.extend_from_slice(self.service.as_bytes());
        bytes.extend_from_slice(self.env.as_bytes());
        bytes.extend_from_slice(self.hostname.as_bytes());
        fnv1a_64(&bytes)
    }

    /// Encode as the value of `header`.
    pub fn to_wire(&self, header: &str) -> Result<String, PropagationError> {
        serde_json::to_string(self).map_err(|e| PropagationError::malformed(header, e))
    }

    /// Decode a header value produced by [`NodeIdentity::to_wire`].
    pub fn from_wire(header: &str, value: &str) -> Result<Self, PropagationError> {
        serde_json::from_str(value).map_err(|e| PropagationError::malformed(header, e))
    }
}

impl Default for NodeIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE, DEFAULT_ENV, "")
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hostname.is_empty() {
            write!(f, "{}@{}", self.service, self.env)
        } else {
            write!(f, "{}@{}/{}", self.service, self.env, self.hostname)
        }
    }
}
