// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Drain, encode and send cycles, plus the background task that runs them.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use prost::Message;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::checkpoint::now_ns;
use crate::error::FlushError;
use crate::node::NodeIdentity;
use crate::payload::DataPathApiPayload;
use crate::stats::{bucket_floor, Bucket, PathKey, PathwayStats, StatsAggregator};
use crate::telemetry::FlushMetrics;

use super::transport::CollectorTransport;

/// Default time between flush cycles.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// What one flush cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Entries the collector accepted and that were evicted.
    pub sent: usize,
    /// Entries put back for the next cycle.
    pub kept: usize,
}

type Entry = (i64, PathKey, PathwayStats);

/// Sends matured buckets from an aggregator to a collector.
pub struct Flusher {
    aggregator: Arc<StatsAggregator>,
    transport: Arc<dyn CollectorTransport>,
    node: NodeIdentity,
    metrics: FlushMetrics,
}

impl Flusher {
    pub fn new(
        aggregator: Arc<StatsAggregator>,
        transport: Arc<dyn CollectorTransport>,
        node: NodeIdentity,
    ) -> Self {
        Self {
            aggregator,
            transport,
            node,
            metrics: FlushMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &FlushMetrics {
        &self.metrics
    }

    pub fn aggregator(&self) -> &Arc<StatsAggregator> {
        &self.aggregator
    }

    /// Run one cycle over every bucket that started before `before`.
    ///
    /// Accepted entries are evicted; rejected ones are put back. A 404 puts
    /// back everything drained in this cycle, including entries that were
    /// already accepted, and returns [`FlushError::NotFound`]. A transport
    /// failure puts back everything not yet accepted and is returned.
    pub async fn flush_once(&self, before: i64) -> Result<FlushOutcome, FlushError> {
        let drained = self.aggregator.drain_ready_buckets(before);
        if drained.is_empty() {
            return Ok(FlushOutcome::default());
        }

        let started = Instant::now();
        let bucket_size = self.aggregator.bucket_size_ns();
        let mut pending: VecDeque<Entry> = flatten(drained);
        let mut sent: Vec<Entry> = Vec::new();
        let mut kept: Vec<Entry> = Vec::new();

        debug!(entries = pending.len(), target = %self.transport.target(), "Flushing pathway stats");

        while let Some(entry) = pending.pop_front() {
            let (start, key, stats) = &entry;
            let body =
                DataPathApiPayload::for_path(&self.node, *start, bucket_size, key, stats).encode_to_vec();
            let bytes = body.len();

            let status = match self.transport.send(body).await {
                Ok(status) => status,
                Err(err) => {
                    error!(error = %err, "Failed to reach collector");
                    kept.push(entry);
                    let restored = kept.len() + pending.len();
                    self.aggregator.restore(regroup(kept.into_iter().chain(pending)));
                    self.metrics.record_cycle(started.elapsed(), true);
                    debug!(restored, "Restored unsent entries");
                    return Err(err);
                }
            };

            match classify(status, &self.transport.target()) {
                Ok(()) => {
                    self.metrics.record_sent(bytes);
                    sent.push(entry);
                }
                Err(err) if err.aborts_cycle() => {
                    error!(error = %err, "Collector endpoint missing, aborting flush");
                    pending.push_front(entry);
                    let restored = sent.len() + kept.len() + pending.len();
                    self.aggregator
                        .restore(regroup(sent.into_iter().chain(kept).chain(pending)));
                    self.metrics.record_cycle(started.elapsed(), true);
                    debug!(restored, "Restored every drained entry");
                    return Err(err);
                }
                Err(err) => {
                    error!(error = %err, "Collector rejected payload");
                    self.metrics.record_failed();
                    kept.push(entry);
                }
            }
        }

        let outcome = FlushOutcome {
            sent: sent.len(),
            kept: kept.len(),
        };
        if !kept.is_empty() {
            self.aggregator.restore(regroup(kept));
        }
        self.metrics.record_cycle(started.elapsed(), false);
        debug!(sent = outcome.sent, kept = outcome.kept, "Flush cycle finished");
        Ok(outcome)
    }

    /// Flush every bucket older than the one currently filling.
    pub async fn flush_matured(&self) -> Result<FlushOutcome, FlushError> {
        let current = bucket_floor(now_ns(), self.aggregator.bucket_size_ns());
        self.flush_once(current).await
    }
}

fn classify(status: u16, target: &str) -> Result<(), FlushError> {
    match status {
        200..=399 => Ok(()),
        404 => Err(FlushError::NotFound(target.to_string())),
        _ => Err(FlushError::Rejected {
            status,
            message: format!("POST {}", target),
        }),
    }
}

fn flatten(drained: Vec<(i64, Bucket)>) -> VecDeque<Entry> {
    let mut entries: Vec<Entry> = drained
        .into_iter()
        .flat_map(|(start, bucket)| {
            bucket
                .pathway_stats
                .into_iter()
                .map(move |(key, stats)| (start, key, stats))
        })
        .collect();
    entries.sort_by_key(|(start, key, _)| (*start, key.request_pathway_id, key.response_pathway_id));
    entries.into()
}

fn regroup(entries: impl IntoIterator<Item = Entry>) -> Vec<(i64, Bucket)> {
    let mut buckets: Vec<(i64, Bucket)> = Vec::new();
    for (start, key, stats) in entries {
        match buckets.iter_mut().find(|(s, _)| *s == start) {
            Some((_, bucket)) => {
                bucket.pathway_stats.insert(key, stats);
            }
            None => {
                let mut bucket = Bucket::default();
                bucket.pathway_stats.insert(key, stats);
                buckets.push((start, bucket));
            }
        }
    }
    buckets
}

/// Runs [`Flusher::flush_matured`] on a fixed interval until shut down.
pub struct PeriodicFlusher {
    flusher: Arc<Flusher>,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicFlusher {
    /// Spawn the flush loop on the current tokio runtime.
    pub fn start(flusher: Arc<Flusher>, period: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);
        let task_flusher = Arc::clone(&flusher);
        let period = if period.is_zero() {
            DEFAULT_FLUSH_INTERVAL
        } else {
            period
        };

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = task_flusher.flush_matured().await {
                            warn!(error = %err, "Flush cycle failed, retrying next interval");
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        info!(interval_ms = period.as_millis() as u64, "Started pathway stats flusher");

        Self {
            flusher,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn flusher(&self) -> &Arc<Flusher> {
        &self.flusher
    }

    pub fn metrics(&self) -> &FlushMetrics {
        self.flusher.metrics()
    }

    /// Run one cycle now, outside the schedule.
    pub async fn flush_once(&self, before: i64) -> Result<FlushOutcome, FlushError> {
        self.flusher.flush_once(before).await
    }

    /// Stop the loop, then flush everything still buffered.
    pub async fn shutdown(mut self) -> Result<FlushOutcome, FlushError> {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Flush task ended abnormally");
            }
        }
        let outcome = self.flusher.flush_once(i64::MAX).await;
        info!(?outcome, "Stopped pathway stats flusher");
        outcome
    }
}

impl Drop for PeriodicFlusher {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
