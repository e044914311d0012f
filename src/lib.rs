// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! AccuPath - distributed pathway tracking and latency aggregation.
//!
//! Every request that crosses an instrumented service carries a small
//! pathway context in HTTP headers. Each node appends hash-chained
//! checkpoints to it, derives per-hop latencies, and folds them into
//! latency histograms grouped by time bucket and pathway. A background
//! flusher posts the buckets to a collector as protobuf DDSketches.
//!
//! # Architecture
//!
//! - [`node`] - Service identity and its stable hash
//! - [`checkpoint`] - Hash-chained causal events
//! - [`pathway`] - Per-request context, header propagation and state
//! - [`events`] - Typed event bus and the declarative rule schema
//! - [`stats`] - Time-bucketed sketch aggregation
//! - [`flush`] - Collector transport and the periodic flusher
//! - [`payload`] - Protobuf messages sent to the collector
//! - [`sketch`] - HDR latency histograms and their DDSketch wire form
//! - [`config`] - Configuration loading and merging
//! - [`telemetry`] - Logging setup and flush counters
//! - [`tracker`] - Composition root tying the above together
//!
//! # Example
//!
//! ```rust,ignore
//! use accupath::config::{load_config, CliOptions};
//! use accupath::events::{EventArgs, TriggerEvent};
//! use accupath::pathway::PathwayState;
//! use accupath::Tracker;
//!
//! let config = load_config(Path::new("."), CliOptions::default())?;
//! let mut tracker = Tracker::new(config)?;
//! tracker.start();
//!
//! // Inside a request handler
//! let mut state = PathwayState::new();
//! tracker.dispatch(
//!     TriggerEvent::HttpRequestHeaderExtraction,
//!     &mut state,
//!     &mut EventArgs::with_headers(&mut request_headers),
//! );
//!
//! tracker.shutdown().await?;
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod events;
pub mod flush;
pub mod hash;
pub mod node;
pub mod pathway;
pub mod payload;
pub mod sketch;
pub mod stats;
pub mod telemetry;
pub mod tracker;

// Re-export commonly used types at crate root
pub use checkpoint::{Checkpoint, CheckpointLabel};
pub use error::{AccuPathError, ConfigError, FlushError, PropagationError, Result, SchemaError};
pub use events::{EventArgs, EventBus, TriggerEvent};
pub use node::NodeIdentity;
pub use pathway::{HeaderCarrier, PathwayContext, PathwayState};
pub use stats::{PathKey, PathwayStats, StatName, StatsAggregator};
pub use tracker::Tracker;

/// AccuPath version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_public_exports() {
        let node = NodeIdentity::new("svc", "env", "host");
        let context = PathwayContext::new(&node, "");
        assert_eq!(context.checkpoints().len(), 1);
        assert_eq!(StatName::ALL.len(), 10);
    }
}
