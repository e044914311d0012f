// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Latency distributions.
//!
//! Values are recorded into an HDR histogram and converted to the DDSketch
//! wire form only when a payload is built.

use std::collections::BTreeMap;

use hdrhistogram::{CreationError, Histogram};

use crate::payload::{DdSketch, IndexMapping, Interpolation, Store};

/// Relative accuracy of the DDSketch index mapping sent to the collector.
pub const DEFAULT_RELATIVE_ACCURACY: f64 = 0.00775;

/// Maximum number of contiguous bins in a serialized sketch.
pub const DEFAULT_BIN_LIMIT: usize = 2048;

/// Significant decimal digits kept by the recording histogram.
pub const SIGNIFICANT_FIGURES: u8 = 3;

/// Largest latency tracked, one hour in nanoseconds. Larger values saturate.
pub const MAX_TRACKABLE_NS: u64 = 3_600_000_000_000;

/// Latency distribution in nanoseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencySketch {
    histogram: Histogram<u64>,
}

impl LatencySketch {
    pub fn new() -> Result<Self, CreationError> {
        Ok(Self {
            histogram: Histogram::new_with_bounds(1, MAX_TRACKABLE_NS, SIGNIFICANT_FIGURES)?,
        })
    }

    /// Add a value. Negative and non-finite values are recorded as zero.
    pub fn add(&mut self, value: f64) {
        let value = if value.is_finite() {
            value.max(0.0).round() as u64
        } else {
            0
        };
        self.histogram.saturating_record(value);
    }

    pub fn count(&self) -> u64 {
        self.histogram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    pub fn min(&self) -> Option<u64> {
        (!self.is_empty()).then(|| self.histogram.min())
    }

    pub fn max(&self) -> Option<u64> {
        (!self.is_empty()).then(|| self.histogram.max())
    }

    pub fn mean(&self) -> Option<f64> {
        (!self.is_empty()).then(|| self.histogram.mean())
    }

    /// Approximate value at quantile `q` (0.0 to 1.0).
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if !(0.0..=1.0).contains(&q) || self.is_empty() {
            return None;
        }
        Some(self.histogram.value_at_quantile(q) as f64)
    }

    pub fn merge(&mut self, other: &Self) {
        for bucket in other.histogram.iter_recorded() {
            self.histogram
                .saturating_record_n(bucket.value_iterated_to(), bucket.count_at_value());
        }
    }

    /// Convert to the DDSketch protobuf message.
    ///
    /// Each recorded histogram bucket is re-indexed at its median value onto
    /// the logarithmic mapping with `gamma = (1 + a) / (1 - a)`.
    pub fn to_proto(&self) -> DdSketch {
        let gamma = (1.0 + DEFAULT_RELATIVE_ACCURACY) / (1.0 - DEFAULT_RELATIVE_ACCURACY);
        let multiplier = 1.0 / gamma.ln();

        let mut zero_count = 0.0;
        let mut bins: BTreeMap<i32, f64> = BTreeMap::new();
        for bucket in self.histogram.iter_recorded() {
            let count = bucket.count_at_value() as f64;
            let value = self.histogram.median_equivalent(bucket.value_iterated_to());
            if value == 0 {
                zero_count += count;
            } else {
                let key = ((value as f64).ln() * multiplier).ceil() as i32;
                *bins.entry(key).or_insert(0.0) += count;
            }
        }

        DdSketch {
            mapping: Some(IndexMapping {
                gamma,
                index_offset: 0.0,
                interpolation: Interpolation::None as i32,
            }),
            positive_values: Some(dense_store(&bins, DEFAULT_BIN_LIMIT)),
            negative_values: Some(Store::default()),
            zero_count,
        }
    }
}

impl Default for LatencySketch {
    fn default() -> Self {
        Self::new().expect("Failed to create latency histogram")
    }
}

/// Lay `bins` out contiguously, folding keys below the last `bin_limit` into the lowest kept bin.
fn dense_store(bins: &BTreeMap<i32, f64>, bin_limit: usize) -> Store {
    let (Some((&low, _)), Some((&high, _))) = (bins.first_key_value(), bins.last_key_value())
    else {
        return Store::default();
    };
    let offset = low.max(high - bin_limit.max(1) as i32 + 1);

    let mut counts = vec![0.0; (high - offset + 1) as usize];
    for (&key, &count) in bins {
        counts[(key.max(offset) - offset) as usize] += count;
    }

    Store {
        bin_counts: Default::default(),
        contiguous_bin_counts: counts,
        contiguous_bin_index_offset: offset,
    }
}
