// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging and internal metrics.
//!
//! - **Tracing**: structured logs through `tracing-subscriber`
//! - **Flush metrics**: counters for the collector flush path
//!
//! # Usage
//!
//! Initialize logging at application startup:
//!
//! ```rust,ignore
//! use accupath::telemetry::{init_telemetry, TelemetryConfig};
//!
//! init_telemetry(&TelemetryConfig::from_verbosity(1))?;
//! ```
//!
//! Extraction and checkpoint details log at `debug`, collector failures at
//! `error` and flusher start/stop at `info`. Pass `-v` (or set
//! `RUST_LOG=accupath=debug`) to follow a pathway hop by hop.

mod init;
pub mod metrics;

pub use init::{init_telemetry, TelemetryConfig};
pub use metrics::{FlushMetrics, FlushMetricsSnapshot};
