// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Internal counters for the collector flush path.
//!
//! Lock-free and owned by the flusher, so several trackers in one process
//! keep separate numbers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters updated by every flush cycle.
#[derive(Debug)]
pub struct FlushMetrics {
    cycles: AtomicU64,
    cycles_aborted: AtomicU64,
    payloads_sent: AtomicU64,
    payloads_failed: AtomicU64,
    bytes_sent: AtomicU64,
    /// Total wall time spent in flush cycles, in microseconds.
    cycle_micros: AtomicU64,
    max_cycle_micros: AtomicU64,
    start_time: Instant,
}

impl FlushMetrics {
    pub fn new() -> Self {
        Self {
            cycles: AtomicU64::new(0),
            cycles_aborted: AtomicU64::new(0),
            payloads_sent: AtomicU64::new(0),
            payloads_failed: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            cycle_micros: AtomicU64::new(0),
            max_cycle_micros: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a payload the collector accepted.
    pub fn record_sent(&self, bytes: usize) {
        self.payloads_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a payload that stays buffered for retry.
    pub fn record_failed(&self) {
        self.payloads_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished cycle.
    pub fn record_cycle(&self, duration: Duration, aborted: bool) {
        let micros = duration.as_micros() as u64;
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.cycle_micros.fetch_add(micros, Ordering::Relaxed);
        self.max_cycle_micros.fetch_max(micros, Ordering::Relaxed);
        if aborted {
            self.cycles_aborted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> FlushMetricsSnapshot {
        FlushMetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            cycles_aborted: self.cycles_aborted.load(Ordering::Relaxed),
            payloads_sent: self.payloads_sent.load(Ordering::Relaxed),
            payloads_failed: self.payloads_failed.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            total_cycle_time: Duration::from_micros(self.cycle_micros.load(Ordering::Relaxed)),
            max_cycle_time: Duration::from_micros(self.max_cycle_micros.load(Ordering::Relaxed)),
            uptime: self.start_time.elapsed(),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.cycles,
            &self.cycles_aborted,
            &self.payloads_sent,
            &self.payloads_failed,
            &self.bytes_sent,
            &self.cycle_micros,
            &self.max_cycle_micros,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for FlushMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`FlushMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushMetricsSnapshot {
    pub cycles: u64,
    pub cycles_aborted: u64,
    pub payloads_sent: u64,
    pub payloads_failed: u64,
    pub bytes_sent: u64,
    pub total_cycle_time: Duration,
    pub max_cycle_time: Duration,
    pub uptime: Duration,
}

impl FlushMetricsSnapshot {
    /// Average wall time per cycle.
    pub fn avg_cycle_time(&self) -> Duration {
        if self.cycles == 0 {
            Duration::ZERO
        } else {
            self.total_cycle_time / self.cycles as u32
        }
    }

    /// Fraction of attempted payloads the collector accepted (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        let attempted = self.payloads_sent + self.payloads_failed;
        if attempted == 0 {
            1.0
        } else {
            self.payloads_sent as f64 / attempted as f64
        }
    }

    /// Format as a human-readable report.
    pub fn format_report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Flush Metrics ===\n\n");
        report.push_str(&format!("Uptime: {:.2?}\n", self.uptime));
        report.push_str(&format!(
            "Cycles: {} ({} aborted), avg {:.2?}, max {:.2?}\n",
            self.cycles,
            self.cycles_aborted,
            self.avg_cycle_time(),
            self.max_cycle_time
        ));
        report.push_str(&format!(
            "Payloads: {} sent, {} kept for retry, {:.1}% success\n",
            self.payloads_sent,
            self.payloads_failed,
            self.success_rate() * 100.0
        ));
        report.push_str(&format!("Bytes sent: {}\n", self.bytes_sent));

        report
    }
}
