// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Two-level bucket map behind one lock.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use super::{BucketEntry, PathKey, PathwayStats, StatName};

/// Floor `time_ns` to the start of its bucket.
pub fn bucket_floor(time_ns: i64, bucket_size_ns: i64) -> i64 {
    time_ns - time_ns.rem_euclid(bucket_size_ns)
}

/// The stats of one time bucket, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    pub pathway_stats: HashMap<PathKey, PathwayStats>,
}

impl Bucket {
    pub fn is_empty(&self) -> bool {
        self.pathway_stats.is_empty()
    }

    fn merge(&mut self, other: Bucket) {
        for (key, stats) in other.pathway_stats {
            match self.pathway_stats.get_mut(&key) {
                Some(existing) => existing.merge(&stats),
                None => {
                    self.pathway_stats.insert(key, stats);
                }
            }
        }
    }
}

/// Aggregates latency values into fixed-width time buckets.
///
/// Inserts and drains both take the same mutex, so a flush never walks the
/// live map and no insert is lost while one is in progress.
#[derive(Debug)]
pub struct StatsAggregator {
    bucket_size_ns: i64,
    buckets: Mutex<BTreeMap<i64, Bucket>>,
}

impl StatsAggregator {
    /// Create an aggregator with buckets `bucket_size_ns` wide.
    ///
    /// Sizes below one nanosecond are raised to one.
    pub fn new(bucket_size_ns: i64) -> Self {
        Self {
            bucket_size_ns: bucket_size_ns.max(1),
            buckets: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn bucket_size_ns(&self) -> i64 {
        self.bucket_size_ns
    }

    /// Fold entries into their buckets, creating buckets and paths on demand.
    pub fn add_bucket_data(&self, entries: impl IntoIterator<Item = BucketEntry>) {
        let mut buckets = self.buckets.lock();
        for entry in entries {
            let start = bucket_floor(entry.time_ns, self.bucket_size_ns);
            buckets
                .entry(start)
                .or_default()
                .pathway_stats
                .entry(entry.key)
                .or_default()
                .add(entry.stat, entry.value);
        }
    }

    /// Remove and return every bucket that started before `before`.
    pub fn drain_ready_buckets(&self, before: i64) -> Vec<(i64, Bucket)> {
        let mut buckets = self.buckets.lock();
        let pending = buckets.split_off(&before);
        let ready = std::mem::replace(&mut *buckets, pending);
        ready.into_iter().collect()
    }

    /// Put drained buckets back, merging with anything inserted meanwhile.
    pub fn restore(&self, drained: impl IntoIterator<Item = (i64, Bucket)>) {
        let mut buckets = self.buckets.lock();
        for (start, bucket) in drained {
            if bucket.is_empty() {
                continue;
            }
            buckets.entry(start).or_default().merge(bucket);
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Number of (bucket, path) entries held.
    pub fn len(&self) -> usize {
        self.buckets
            .lock()
            .values()
            .map(|b| b.pathway_stats.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total values recorded per stat across every bucket and path.
    pub fn snapshot_counts(&self) -> BTreeMap<StatName, u64> {
        let buckets = self.buckets.lock();
        let mut counts = BTreeMap::new();
        for bucket in buckets.values() {
            for stats in bucket.pathway_stats.values() {
                for name in StatName::ALL {
                    let count = stats.get(name).count();
                    if count > 0 {
                        *counts.entry(name).or_insert(0) += count;
                    }
                }
            }
        }
        counts
    }

    /// Format the held stats as a human-readable report.
    pub fn report(&self) -> String {
        let buckets = self.buckets.lock();
        let mut report = String::new();

        report.push_str("=== Pathway Stats ===\n\n");
        report.push_str(&format!(
            "Buckets: {} ({}s wide)\n",
            buckets.len(),
            self.bucket_size_ns / 1_000_000_000
        ));

        for (start, bucket) in buckets.iter() {
            report.push_str(&format!("\nBucket {}:\n", start));
            let mut paths: Vec<_> = bucket.pathway_stats.iter().collect();
            paths.sort_by_key(|(key, _)| (key.request_pathway_id, key.response_pathway_id));

            for (key, stats) in paths {
                report.push_str(&format!(
                    "  {:016x} -> {:016x} (root {})\n",
                    key.request_pathway_id, key.response_pathway_id, key.root_node
                ));
                for name in StatName::ALL {
                    let sketch = stats.get(name);
                    if sketch.is_empty() {
                        continue;
                    }
                    report.push_str(&format!(
                        "    {:<38} n={:<6} p50={:>10.3}ms p99={:>10.3}ms\n",
                        name.as_str(),
                        sketch.count(),
                        sketch.quantile(0.5).unwrap_or(0.0) / 1e6,
                        sketch.quantile(0.99).unwrap_or(0.0) / 1e6,
                    ));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeIdentity;
    use std::sync::Arc;

    const SIZE: i64 = 10_000_000_000;

    fn key(request: u64, response: u64) -> PathKey {
        PathKey::new(request, response, NodeIdentity::new("root", "prod", ""), 0, "")
    }

    #[test]
    fn test_bucket_floor() {
        assert_eq!(bucket_floor(0, SIZE), 0);
        assert_eq!(bucket_floor(SIZE - 1, SIZE), 0);
        assert_eq!(bucket_floor(SIZE, SIZE), SIZE);
        assert_eq!(bucket_floor(SIZE * 3 + 7, SIZE), SIZE * 3);
        assert_eq!(bucket_floor(-1, SIZE), -SIZE);
    }

    #[test]
    fn test_bucket_floor_idempotent() {
        for t in [0, 1, 12_345_678_901, 99_999_999_999, 1_700_000_000_123_456_789] {
            let once = bucket_floor(t, SIZE);
            assert_eq!(bucket_floor(once, SIZE), once);
            assert!(once <= t && t - once < SIZE);
        }
    }

    #[test]
    fn test_add_groups_by_bucket_and_key() {
        let aggregator = StatsAggregator::new(SIZE);
        aggregator.add_bucket_data(vec![
            BucketEntry::new(1, key(1, 2), StatName::RequestLatency, 10.0),
            BucketEntry::new(2, key(1, 2), StatName::RequestLatency, 20.0),
            BucketEntry::new(3, key(3, 4), StatName::RequestLatency, 30.0),
            BucketEntry::new(SIZE + 1, key(1, 2), StatName::ResponseLatency, 40.0),
        ]);

        assert_eq!(aggregator.bucket_count(), 2);
        assert_eq!(aggregator.len(), 3);
        let counts = aggregator.snapshot_counts();
        assert_eq!(counts[&StatName::RequestLatency], 3);
        assert_eq!(counts[&StatName::ResponseLatency], 1);
    }

    #[test]
    fn test_drain_only_ready_buckets() {
        let aggregator = StatsAggregator::new(SIZE);
        aggregator.add_bucket_data(vec![
            BucketEntry::new(1, key(1, 2), StatName::RequestLatency, 10.0),
            BucketEntry::new(SIZE + 1, key(1, 2), StatName::RequestLatency, 10.0),
        ]);

        let drained = aggregator.drain_ready_buckets(SIZE);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, 0);
        assert_eq!(aggregator.bucket_count(), 1);

        let rest = aggregator.drain_ready_buckets(i64::MAX);
        assert_eq!(rest.len(), 1);
        assert!(aggregator.is_empty());
    }

    #[test]
    fn test_restore_merges_with_new_data() {
        let aggregator = StatsAggregator::new(SIZE);
        aggregator.add_bucket_data(vec![BucketEntry::new(
            1,
            key(1, 2),
            StatName::RequestLatency,
            10.0,
        )]);
        let drained = aggregator.drain_ready_buckets(i64::MAX);

        aggregator.add_bucket_data(vec![BucketEntry::new(
            5,
            key(1, 2),
            StatName::RequestLatency,
            20.0,
        )]);
        aggregator.restore(drained);

        assert_eq!(aggregator.len(), 1);
        assert_eq!(aggregator.snapshot_counts()[&StatName::RequestLatency], 2);
    }

    #[test]
    fn test_concurrent_inserts_lose_nothing() {
        let aggregator = Arc::new(StatsAggregator::new(SIZE));
        let threads = 8;
        let per_thread = 1_000;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let aggregator = Arc::clone(&aggregator);
                std::thread::spawn(move || {
                    for i in 0..per_thread {
                        let entry = BucketEntry::new(
                            (i as i64) * 1_000_000,
                            key(t % 3, 0),
                            StatName::RootToResponseInLatency,
                            i as f64,
                        );
                        aggregator.add_bucket_data(std::iter::once(entry));
                    }
                })
            })
            .collect();

        // Drain and restore while writers are running
        for _ in 0..10 {
            let drained = aggregator.drain_ready_buckets(i64::MAX);
            aggregator.restore(drained);
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            aggregator.snapshot_counts()[&StatName::RootToResponseInLatency],
            threads * per_thread
        );
    }

    #[test]
    fn test_report_lists_paths() {
        let aggregator = StatsAggregator::new(SIZE);
        aggregator.add_bucket_data(vec![BucketEntry::new(
            1,
            key(1, 2),
            StatName::ResponseLatency,
            2_000_000.0,
        )]);
        let report = aggregator.report();
        assert!(report.contains("=== Pathway Stats ==="));
        assert!(report.contains("response_latency"));
        assert!(!report.contains("request_latency "));
    }
}
