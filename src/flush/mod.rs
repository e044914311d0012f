// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shipping aggregated buckets to the collector.
//!
//! - [`CollectorTransport`] - the seam payloads leave through
//! - [`HttpCollector`] - `reqwest` implementation posting protobuf bodies
//! - [`Flusher`] - one drain/encode/send cycle
//! - [`PeriodicFlusher`] - background task running cycles on an interval
//!
//! # Example
//!
//! ```rust,ignore
//! use accupath::flush::{Flusher, HttpCollector, PeriodicFlusher};
//!
//! let transport = Arc::new(HttpCollector::with_defaults(base_url, api_key)?);
//! let flusher = Arc::new(Flusher::new(aggregator, transport, node));
//! let periodic = PeriodicFlusher::start(flusher, Duration::from_secs(10));
//! // ...
//! periodic.shutdown().await?;
//! ```

mod flusher;
mod transport;

pub use flusher::{FlushOutcome, Flusher, PeriodicFlusher, DEFAULT_FLUSH_INTERVAL};
pub use transport::{
    CollectorTransport, HttpCollector, API_KEY_HEADER, DATAPATHS_ENDPOINT, DEFAULT_BASE_URL,
    DEFAULT_TIMEOUT_SECS,
};
