// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Time-bucketed latency statistics.
//!
//! Completed pathways are turned into [`BucketEntry`] values and folded into
//! a [`StatsAggregator`]. Each bucket maps a [`PathKey`] to a
//! [`PathwayStats`] record holding one sketch per [`StatName`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use accupath::stats::{submission_entries, StatsAggregator};
//!
//! let aggregator = StatsAggregator::new(10_000_000_000);
//! aggregator.add_bucket_data(submission_entries(&state));
//! println!("{}", aggregator.report());
//! ```

mod aggregator;
mod key;

pub use aggregator::{bucket_floor, Bucket, StatsAggregator};
pub use key::PathKey;

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::pathway::{Observation, PathwayState};
use crate::sketch::LatencySketch;

/// The latency categories tracked per path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatName {
    RequestLatency,
    ResponseLatency,
    RootToRequestInLatency,
    RootToRequestInLatencyErrors,
    RootToRequestOutLatency,
    RootToRequestOutLatencyErrors,
    RootToResponseInLatency,
    RootToResponseInLatencyErrors,
    RootToResponseOutLatency,
    RootToResponseOutLatencyErrors,
}

impl StatName {
    pub const ALL: [StatName; 10] = [
        StatName::RequestLatency,
        StatName::ResponseLatency,
        StatName::RootToRequestInLatency,
        StatName::RootToRequestInLatencyErrors,
        StatName::RootToRequestOutLatency,
        StatName::RootToRequestOutLatencyErrors,
        StatName::RootToResponseInLatency,
        StatName::RootToResponseInLatencyErrors,
        StatName::RootToResponseOutLatency,
        StatName::RootToResponseOutLatencyErrors,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestLatency => "request_latency",
            Self::ResponseLatency => "response_latency",
            Self::RootToRequestInLatency => "root_to_request_in_latency",
            Self::RootToRequestInLatencyErrors => "root_to_request_in_latency_errors",
            Self::RootToRequestOutLatency => "root_to_request_out_latency",
            Self::RootToRequestOutLatencyErrors => "root_to_request_out_latency_errors",
            Self::RootToResponseInLatency => "root_to_response_in_latency",
            Self::RootToResponseInLatencyErrors => "root_to_response_in_latency_errors",
            Self::RootToResponseOutLatency => "root_to_response_out_latency",
            Self::RootToResponseOutLatencyErrors => "root_to_response_out_latency_errors",
        }
    }

    /// The `_errors` counterpart of a root-to-* stat when `failed` is set.
    pub fn for_outcome(self, failed: bool) -> Self {
        if !failed {
            return self;
        }
        match self {
            Self::RootToRequestInLatency => Self::RootToRequestInLatencyErrors,
            Self::RootToRequestOutLatency => Self::RootToRequestOutLatencyErrors,
            Self::RootToResponseInLatency => Self::RootToResponseInLatencyErrors,
            Self::RootToResponseOutLatency => Self::RootToResponseOutLatencyErrors,
            other => other,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for StatName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("Unknown stat name: {}", s))
    }
}

/// One sketch per [`StatName`] for a single path.
#[derive(Debug, Clone)]
pub struct PathwayStats {
    sketches: [LatencySketch; 10],
}

impl PathwayStats {
    pub fn new() -> Self {
        Self {
            sketches: std::array::from_fn(|_| LatencySketch::default()),
        }
    }

    pub fn get(&self, name: StatName) -> &LatencySketch {
        &self.sketches[name.index()]
    }

    /// Add a latency in nanoseconds. Negative values are recorded as zero.
    pub fn add(&mut self, name: StatName, value: f64) {
        self.sketches[name.index()].add(value.max(0.0));
    }

    pub fn merge(&mut self, other: &PathwayStats) {
        for (ours, theirs) in self.sketches.iter_mut().zip(other.sketches.iter()) {
            ours.merge(theirs);
        }
    }

    /// Total number of values across every sketch.
    pub fn count(&self) -> u64 {
        self.sketches.iter().map(|s| s.count()).sum()
    }
}

impl Default for PathwayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// A single value to fold into the aggregator.
#[derive(Debug, Clone)]
pub struct BucketEntry {
    pub time_ns: i64,
    pub key: PathKey,
    pub stat: StatName,
    pub value: f64,
}

impl BucketEntry {
    pub fn new(time_ns: i64, key: PathKey, stat: StatName, value: f64) -> Self {
        Self {
            time_ns,
            key,
            stat,
            value,
        }
    }

    /// Build an entry from a stat name given as a string.
    ///
    /// Unknown names yield `None`.
    pub fn named(time_ns: i64, key: PathKey, stat: &str, value: f64) -> Option<Self> {
        match stat.parse::<StatName>() {
            Ok(stat) => Some(Self::new(time_ns, key, stat, value)),
            Err(err) => {
                debug!(error = %err, "Ignoring stat");
                None
            }
        }
    }
}

/// Turn the pathway held by `state` into aggregator entries.
///
/// A stat is skipped when one of its observations has not happened yet.
/// Root-to-* stats go to their `_errors` variant when any hop failed.
pub fn submission_entries(state: &PathwayState) -> Vec<BucketEntry> {
    let Some(context) = state.context() else {
        return Vec::new();
    };

    let key = PathKey::new(
        context.request_pathway_hash(),
        context.downstream_hash().unwrap_or(0),
        context.root_node().clone(),
        context.node_hash(),
        context.uid(),
    );
    let time_ns = context.last_checkpoint().time();
    let failed = context.has_failure();

    let spans = [
        (StatName::RequestLatency, Observation::UpstreamOut, Observation::RequestIn),
        (StatName::ResponseLatency, Observation::RequestOut, Observation::ResponseIn),
        (StatName::RootToRequestInLatency, Observation::RootOut, Observation::RequestIn),
        (StatName::RootToRequestOutLatency, Observation::RootOut, Observation::RequestOut),
        (StatName::RootToResponseInLatency, Observation::RootOut, Observation::ResponseIn),
        (StatName::RootToResponseOutLatency, Observation::RootOut, Observation::ResponseOut),
    ];

    spans
        .into_iter()
        .filter_map(|(stat, from, to)| {
            let start = state.observation(from)?;
            let end = state.observation(to)?;
            Some(BucketEntry::new(
                time_ns,
                key.clone(),
                stat.for_outcome(failed),
                (end - start).max(0) as f64,
            ))
        })
        .collect()
}
