// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Composition root for one instrumented service.
//!
//! A [`Tracker`] owns the node identity, the stats aggregator, the compiled
//! event bus and the flusher lifecycle. Host code keeps one per process and
//! dispatches its HTTP hooks through [`Tracker::dispatch`].

use std::sync::Arc;

use tracing::info;

use crate::config::ResolvedConfig;
use crate::error::{AccuPathError, FlushError};
use crate::events::{service_schema, EventArgs, EventBus, ServiceRuntime, TriggerEvent};
use crate::flush::{CollectorTransport, FlushOutcome, Flusher, HttpCollector, PeriodicFlusher};
use crate::node::NodeIdentity;
use crate::pathway::PathwayState;
use crate::stats::StatsAggregator;
use crate::telemetry::FlushMetricsSnapshot;

pub struct Tracker {
    config: ResolvedConfig,
    node: NodeIdentity,
    aggregator: Arc<StatsAggregator>,
    bus: Arc<EventBus>,
    flusher: Arc<Flusher>,
    periodic: Option<PeriodicFlusher>,
}

impl Tracker {
    /// Build a tracker that posts to the collector named in `config`.
    pub fn new(config: ResolvedConfig) -> Result<Self, AccuPathError> {
        let transport = HttpCollector::new(
            &config.base_url,
            &config.endpoint,
            config.api_key.clone().unwrap_or_default(),
            config.timeout(),
        )?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build a tracker around a caller-supplied transport.
    ///
    /// When tracking is disabled the bus has no handlers, so dispatching is
    /// a no-op.
    pub fn with_transport(
        config: ResolvedConfig,
        transport: Arc<dyn CollectorTransport>,
    ) -> Result<Self, AccuPathError> {
        let node = config.node();
        let aggregator = Arc::new(StatsAggregator::new(config.bucket_size_ns()));

        let mut bus = EventBus::new();
        if config.enabled {
            let runtime = ServiceRuntime::new(node.clone(), Arc::clone(&aggregator))
                .with_tag(config.tag.clone())
                .with_verify_chain(config.verify_chain);
            service_schema().compile(&mut bus, Arc::new(runtime))?;
        }

        let flusher = Arc::new(Flusher::new(
            Arc::clone(&aggregator),
            transport,
            node.clone(),
        ));

        Ok(Self {
            config,
            node,
            aggregator,
            bus: Arc::new(bus),
            flusher,
            periodic: None,
        })
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn node(&self) -> &NodeIdentity {
        &self.node
    }

    pub fn aggregator(&self) -> &Arc<StatsAggregator> {
        &self.aggregator
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn is_running(&self) -> bool {
        self.periodic.is_some()
    }

    /// Fire one HTTP hook for the request that owns `state`.
    pub fn dispatch(&self, event: TriggerEvent, state: &mut PathwayState, args: &mut EventArgs<'_>) {
        self.bus.dispatch(event, state, args);
    }

    /// Start the periodic flusher. Must be called inside a tokio runtime.
    ///
    /// Does nothing when tracking is disabled or the flusher already runs.
    pub fn start(&mut self) {
        if !self.config.enabled || self.periodic.is_some() {
            return;
        }
        info!(
            service = %self.node.service,
            env = %self.node.env,
            "Starting pathway tracker"
        );
        self.periodic = Some(PeriodicFlusher::start(
            Arc::clone(&self.flusher),
            self.config.flush_interval(),
        ));
    }

    /// Stop the periodic flusher and drain everything still buffered.
    ///
    /// Without a running flusher nothing is sent.
    pub async fn shutdown(&mut self) -> Result<FlushOutcome, FlushError> {
        match self.periodic.take() {
            Some(periodic) => periodic.shutdown().await,
            None => Ok(FlushOutcome::default()),
        }
    }

    /// Flush every buffered bucket now, matured or not.
    pub async fn flush_now(&self) -> Result<FlushOutcome, FlushError> {
        self.flusher.flush_once(i64::MAX).await
    }

    pub fn flush_metrics(&self) -> FlushMetricsSnapshot {
        self.flusher.metrics().snapshot()
    }

    /// Buffered stats followed by flush counters.
    pub fn report(&self) -> String {
        format!(
            "{}\n{}",
            self.aggregator.report(),
            self.flush_metrics().format_report()
        )
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("node", &self.node)
            .field("enabled", &self.config.enabled)
            .field("running", &self.is_running())
            .field("buffered", &self.aggregator.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatName;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct RecordingTransport {
        bodies: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl CollectorTransport for RecordingTransport {
        async fn send(&self, body: Vec<u8>) -> Result<u16, FlushError> {
            self.bodies.lock().push(body);
            Ok(200)
        }

        fn target(&self) -> String {
            "memory://collector".to_string()
        }
    }

    fn config(service: &str) -> ResolvedConfig {
        ResolvedConfig {
            service: service.to_string(),
            env: "test".to_string(),
            ..Default::default()
        }
    }

    /// A root call that talks to an uninstrumented downstream.
    fn root_request(tracker: &Tracker) {
        let mut state = PathwayState::new();
        let mut inbound: HashMap<String, String> = HashMap::new();
        tracker.dispatch(
            TriggerEvent::HttpRequestHeaderExtraction,
            &mut state,
            &mut EventArgs::with_headers(&mut inbound),
        );
        let mut outbound: HashMap<String, String> = HashMap::new();
        tracker.dispatch(
            TriggerEvent::HttpRequestHeaderInjection,
            &mut state,
            &mut EventArgs::with_headers(&mut outbound),
        );
        let mut response: HashMap<String, String> = HashMap::new();
        tracker.dispatch(
            TriggerEvent::HttpResponseHeaderExtraction,
            &mut state,
            &mut EventArgs::with_headers(&mut response).status(200),
        );
        let mut reply: HashMap<String, String> = HashMap::new();
        tracker.dispatch(
            TriggerEvent::HttpResponseHeaderInjection,
            &mut state,
            &mut EventArgs::with_headers(&mut reply),
        );
    }

    #[test]
    fn test_dispatch_records_stats() {
        let transport = Arc::new(RecordingTransport::default());
        let tracker = Tracker::with_transport(config("gateway"), transport).unwrap();
        root_request(&tracker);

        let counts = tracker.aggregator().snapshot_counts();
        assert_eq!(counts[&StatName::ResponseLatency], 1);
        assert_eq!(tracker.node().service, "gateway");
    }

    #[test]
    fn test_disabled_tracker_is_inert() {
        let transport = Arc::new(RecordingTransport::default());
        let config = ResolvedConfig {
            enabled: false,
            ..config("gateway")
        };
        let mut tracker = Tracker::with_transport(config, transport).unwrap();
        root_request(&tracker);

        assert!(tracker.aggregator().is_empty());
        assert_eq!(
            tracker.bus().handler_count(TriggerEvent::HttpRequestHeaderInjection),
            0
        );
        tracker.start();
        assert!(!tracker.is_running());
    }

    #[tokio::test]
    async fn test_flush_now_sends_buffered_stats() {
        let transport = Arc::new(RecordingTransport::default());
        let tracker =
            Tracker::with_transport(config("gateway"), Arc::clone(&transport) as Arc<dyn CollectorTransport>)
                .unwrap();
        root_request(&tracker);

        let outcome = tracker.flush_now().await.unwrap();
        assert_eq!(outcome.sent, 1);
        assert!(tracker.aggregator().is_empty());
        assert_eq!(transport.bodies.lock().len(), 1);
        assert_eq!(tracker.flush_metrics().payloads_sent, 1);
    }

    #[tokio::test]
    async fn test_start_and_shutdown_drains() {
        let transport = Arc::new(RecordingTransport::default());
        let mut tracker =
            Tracker::with_transport(config("gateway"), Arc::clone(&transport) as Arc<dyn CollectorTransport>)
                .unwrap();
        tracker.start();
        assert!(tracker.is_running());
        root_request(&tracker);

        let outcome = tracker.shutdown().await.unwrap();
        assert_eq!(outcome.sent, 1);
        assert!(!tracker.is_running());
        assert_eq!(transport.bodies.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_without_start() {
        let transport = Arc::new(RecordingTransport::default());
        let mut tracker = Tracker::with_transport(config("gateway"), transport).unwrap();
        root_request(&tracker);

        let outcome = tracker.shutdown().await.unwrap();
        assert_eq!(outcome, FlushOutcome::default());
        assert!(!tracker.aggregator().is_empty());
    }

    #[test]
    fn test_report_includes_both_sections() {
        let transport = Arc::new(RecordingTransport::default());
        let tracker = Tracker::with_transport(config("gateway"), transport).unwrap();
        let report = tracker.report();
        assert!(report.contains("=== Pathway Stats ==="));
        assert!(report.contains("=== Flush Metrics ==="));
    }
}
