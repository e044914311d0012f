// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Hash-chained checkpoints recorded along a pathway.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::PropagationError;
use crate::hash;
use crate::node::NodeIdentity;

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub fn now_ns() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// The causal event a checkpoint records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointLabel {
    RootRequestIn,
    RequestOut,
    RequestIn,
    ResponseIn,
    ResponseOut,
}

impl CheckpointLabel {
    /// All labels in pathway order.
    pub const ALL: [CheckpointLabel; 5] = [
        Self::RootRequestIn,
        Self::RequestOut,
        Self::RequestIn,
        Self::ResponseIn,
        Self::ResponseOut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RootRequestIn => "root_request_in",
            Self::RequestOut => "request_out",
            Self::RequestIn => "request_in",
            Self::ResponseIn => "response_in",
            Self::ResponseOut => "response_out",
        }
    }

    /// Whether this label marks the point where a node joined the request path.
    pub fn is_ingress(&self) -> bool {
        matches!(self, Self::RootRequestIn | Self::RequestIn)
    }
}

impl fmt::Display for CheckpointLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| format!("unknown checkpoint label: {}", s))
    }
}

/// One timestamped, hash-chained event within a pathway.
///
/// The hash is computed once, by the node that creates the checkpoint, and is
/// carried verbatim across the wire. Receivers resume the chain from it rather
/// than re-deriving it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    label: CheckpointLabel,
    parent_hash: u64,
    time: i64,
    #[serde(default = "default_success")]
    success: bool,
    hash: u64,
}

fn default_success() -> bool {
    true
}

impl Checkpoint {
    /// Create a checkpoint created by `node`, chained to `parent_hash`.
    pub fn new(
        node: &NodeIdentity,
        label: CheckpointLabel,
        parent_hash: u64,
        time: i64,
        success: bool,
    ) -> Self {
        Self {
            label,
            parent_hash,
            time,
            success,
            hash: hash::chain(node.hash(), parent_hash),
        }
    }

    /// Create a successful checkpoint stamped with the current time.
    pub fn now(node: &NodeIdentity, label: CheckpointLabel, parent_hash: u64) -> Self {
        Self::new(node, label, parent_hash, now_ns(), true)
    }

    pub fn label(&self) -> CheckpointLabel {
        self.label
    }

    pub fn parent_hash(&self) -> u64 {
        self.parent_hash
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Encode as the value of `header`, including the precomputed hash.
    pub fn to_wire(&self, header: &str) -> Result<String, PropagationError> {
        serde_json::to_string(self).map_err(|e| PropagationError::malformed(header, e))
    }

    /// Decode a header value produced by [`Checkpoint::to_wire`].
    pub fn from_wire(header: &str, value: &str) -> Result<Self, PropagationError> {
        serde_json::from_str(value).map_err(|e| PropagationError::malformed(header, e))
    }
}
