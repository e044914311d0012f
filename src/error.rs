// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for AccuPath.
//!
//! This module provides strongly-typed errors for the different parts of the
//! subsystem, using `thiserror` for ergonomic error definitions and `anyhow`
//! for error propagation in glue code and the CLI.

use thiserror::Error;

/// Errors that can occur while propagating pathway context through headers.
#[derive(Error, Debug)]
pub enum PropagationError {
    #[error("Missing header: {0}")]
    MissingHeader(String),

    #[error("Malformed header {header}: {message}")]
    MalformedHeader { header: String, message: String },

    #[error("No pathway context in request scope")]
    NoContext,

    #[error("Checkpoint chain failed verification at index {0}")]
    BrokenChain(usize),
}

impl PropagationError {
    /// Create a malformed header error.
    pub fn malformed(header: impl Into<String>, message: impl ToString) -> Self {
        Self::MalformedHeader {
            header: header.into(),
            message: message.to_string(),
        }
    }

    /// Check if the error simply means the peer is not instrumented.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::MissingHeader(_))
    }
}

/// Errors that can occur while flushing buckets to the collector.
#[derive(Error, Debug)]
pub enum FlushError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Collector endpoint not found (404): {0}")]
    NotFound(String),

    #[error("Collector rejected payload with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl FlushError {
    /// Check if the failed entry should stay buffered for the next interval.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_) | Self::Rejected { .. } | Self::Timeout(_)
        )
    }

    /// Check if the failure abandons the whole flush cycle.
    pub fn aborts_cycle(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Errors raised when a rule schema does not hold together.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Schema {schema}: unknown generator '{name}'")]
    UnknownGenerator { schema: String, name: String },

    #[error("Schema {schema}: metric '{metric}' reads observation '{observation}' that no rule produces")]
    UnobservedInput {
        schema: String,
        metric: String,
        observation: String,
    },

    #[error("Schema {schema}: dispatch '{dispatch}' has no submission binding")]
    UnboundDispatch { schema: String, dispatch: String },

    #[error("Schema {schema}: duplicate name '{name}'")]
    Duplicate { schema: String, name: String },
}

/// Umbrella error for everything that can go wrong inside an event handler.
///
/// Handlers never let these escape into host code: the event bus logs and
/// drops them.
#[derive(Error, Debug)]
pub enum AccuPathError {
    #[error("Propagation error: {0}")]
    Propagation(#[from] PropagationError),

    #[error("Flush error: {0}")]
    Flush(#[from] FlushError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;
