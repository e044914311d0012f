// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end pathway propagation across an in-process A -> B -> C chain.

use std::collections::HashMap;

use accupath::checkpoint::CheckpointLabel;
use accupath::config::ResolvedConfig;
use accupath::events::{EventArgs, TriggerEvent};
use accupath::hash;
use accupath::pathway::PathwayState;
use accupath::stats::{PathKey, StatName};
use accupath::Tracker;

fn tracker(service: &str) -> Tracker {
    let config = ResolvedConfig {
        service: service.to_string(),
        env: "test".to_string(),
        hostname: format!("{}-host", service),
        // Wide buckets keep one test's requests together
        bucket_size_secs: 3600,
        ..Default::default()
    };
    Tracker::new(config).unwrap()
}

fn chain() -> Vec<Tracker> {
    vec![tracker("gateway"), tracker("orders"), tracker("inventory")]
}

/// Serve one request at `trackers[0]`, forwarding down the rest of the chain.
///
/// Finished request states are appended to `states` innermost first.
fn serve(
    trackers: &[Tracker],
    inbound: &mut HashMap<String, String>,
    states: &mut Vec<PathwayState>,
) -> HashMap<String, String> {
    let (tracker, downstream) = trackers.split_first().unwrap();
    let mut state = PathwayState::new();

    tracker.dispatch(
        TriggerEvent::HttpRequestHeaderExtraction,
        &mut state,
        &mut EventArgs::with_headers(inbound),
    );

    if !downstream.is_empty() {
        let mut outbound: HashMap<String, String> = HashMap::new();
        tracker.dispatch(
            TriggerEvent::HttpRequestHeaderInjection,
            &mut state,
            &mut EventArgs::with_headers(&mut outbound),
        );
        let mut response = serve(downstream, &mut outbound, states);
        tracker.dispatch(
            TriggerEvent::HttpResponseHeaderExtraction,
            &mut state,
            &mut EventArgs::with_headers(&mut response).status(200),
        );
    }

    let mut reply: HashMap<String, String> = HashMap::new();
    tracker.dispatch(
        TriggerEvent::HttpResponseHeaderInjection,
        &mut state,
        &mut EventArgs::with_headers(&mut reply),
    );
    states.push(state);
    reply
}

/// States of one request in chain order.
fn send_request(trackers: &[Tracker]) -> Vec<PathwayState> {
    let mut states = Vec::new();
    serve(trackers, &mut HashMap::new(), &mut states);
    states.reverse();
    states
}

fn only_key(tracker: &Tracker) -> PathKey {
    let drained = tracker.aggregator().drain_ready_buckets(i64::MAX);
    assert_eq!(drained.len(), 1);
    let keys: Vec<PathKey> = drained[0].1.pathway_stats.keys().cloned().collect();
    tracker.aggregator().restore(drained);
    assert_eq!(keys.len(), 1);
    keys.into_iter().next().unwrap()
}

#[test]
fn test_every_node_submits_exactly_once() {
    let trackers = chain();
    send_request(&trackers);

    for tracker in &trackers {
        assert_eq!(tracker.aggregator().len(), 1, "{}", tracker.node());
        let counts = tracker.aggregator().snapshot_counts();
        assert!(!counts.is_empty());
        assert!(counts.values().all(|&count| count == 1), "{:?}", counts);
    }
}

#[test]
fn test_stats_per_position() {
    let trackers = chain();
    send_request(&trackers);

    let root = trackers[0].aggregator().snapshot_counts();
    assert!(!root.contains_key(&StatName::RequestLatency));
    assert_eq!(root[&StatName::ResponseLatency], 1);
    assert_eq!(root[&StatName::RootToResponseInLatency], 1);

    let middle = trackers[1].aggregator().snapshot_counts();
    assert_eq!(middle[&StatName::RequestLatency], 1);
    assert_eq!(middle[&StatName::ResponseLatency], 1);
    assert_eq!(middle[&StatName::RootToRequestOutLatency], 1);

    // The last hop never calls out, so it has no response latency of its own
    let last = trackers[2].aggregator().snapshot_counts();
    assert_eq!(last[&StatName::RequestLatency], 1);
    assert!(!last.contains_key(&StatName::ResponseLatency));
    assert!(!last.contains_key(&StatName::RootToRequestOutLatency));
    assert_eq!(last[&StatName::RootToResponseOutLatency], 1);
}

#[test]
fn test_checkpoint_counts() {
    let trackers = chain();
    let states = send_request(&trackers);

    let labels = |state: &PathwayState| -> Vec<CheckpointLabel> {
        state
            .context()
            .unwrap()
            .checkpoints()
            .iter()
            .map(|cp| cp.label())
            .collect()
    };

    assert_eq!(
        labels(&states[0]),
        vec![
            CheckpointLabel::RootRequestIn,
            CheckpointLabel::RequestOut,
            CheckpointLabel::ResponseIn,
            CheckpointLabel::ResponseOut,
        ]
    );
    assert_eq!(
        labels(&states[1]),
        vec![
            CheckpointLabel::RootRequestIn,
            CheckpointLabel::RequestOut,
            CheckpointLabel::RequestIn,
            CheckpointLabel::RequestOut,
            CheckpointLabel::ResponseIn,
            CheckpointLabel::ResponseOut,
        ]
    );
    // Degenerate last hop: response_in is synthesized at response_out
    assert_eq!(
        labels(&states[2]),
        vec![
            CheckpointLabel::RootRequestIn,
            CheckpointLabel::RequestOut,
            CheckpointLabel::RequestIn,
            CheckpointLabel::ResponseIn,
            CheckpointLabel::ResponseOut,
        ]
    );
    assert!(states.iter().all(|s| s.context().unwrap().submitted()));
}

#[test]
fn test_all_nodes_share_pathway() {
    let trackers = chain();
    let states = send_request(&trackers);

    let root = states[0].context().unwrap();
    for state in &states[1..] {
        let context = state.context().unwrap();
        assert_eq!(context.uid(), root.uid());
        assert_eq!(context.root_time(), root.root_time());
        assert_eq!(context.root_node(), trackers[0].node());
    }
}

#[test]
fn test_request_hash_matches_receiver_recomputation() {
    let trackers = chain();
    let states = send_request(&trackers);

    for hop in 1..states.len() {
        let sender = states[hop - 1].context().unwrap();
        let receiver = states[hop].context().unwrap();
        let request_out = sender.latest_local(CheckpointLabel::RequestOut).unwrap();
        let request_in = receiver.latest_local(CheckpointLabel::RequestIn).unwrap();

        let expected = hash::chain(trackers[hop].node().hash(), request_out.hash());
        assert_eq!(request_in.hash(), expected);
        assert_eq!(receiver.request_pathway_hash(), expected);
        assert_eq!(receiver.upstream_hash(), request_out.hash());
    }
}

#[test]
fn test_response_hash_preserved_upstream() {
    let trackers = chain();
    let states = send_request(&trackers);

    let keys: Vec<PathKey> = trackers.iter().map(only_key).collect();

    // Each node's downstream id is the hash its callee sent back
    assert_eq!(keys[0].response_pathway_id, states[1].context().unwrap().node_hash());
    assert_eq!(keys[1].response_pathway_id, states[2].context().unwrap().node_hash());
    assert_eq!(keys[1].response_pathway_id, keys[2].node_hash);
    assert_eq!(keys[2].response_pathway_id, 0);
}

#[test]
fn test_repeated_requests_aggregate_under_same_path() {
    let trackers = chain();
    send_request(&trackers);
    let first: Vec<PathKey> = trackers.iter().map(only_key).collect();

    send_request(&trackers);
    send_request(&trackers);
    let again: Vec<PathKey> = trackers.iter().map(only_key).collect();

    assert_eq!(first, again);
    for tracker in &trackers {
        let counts = tracker.aggregator().snapshot_counts();
        assert!(counts.values().all(|&count| count == 3), "{:?}", counts);
    }
}

#[test]
fn test_distinct_services_get_distinct_paths() {
    let trackers = chain();
    send_request(&trackers);

    let keys: Vec<PathKey> = trackers.iter().map(only_key).collect();
    assert_ne!(keys[0].request_pathway_id, keys[1].request_pathway_id);
    assert_ne!(keys[1].request_pathway_id, keys[2].request_pathway_id);
}

#[test]
fn test_failed_downstream_routes_to_error_stats() {
    let trackers = vec![tracker("gateway"), tracker("orders")];
    let mut state = PathwayState::new();
    let root = &trackers[0];

    root.dispatch(
        TriggerEvent::HttpRequestHeaderExtraction,
        &mut state,
        &mut EventArgs::with_headers(&mut HashMap::<String, String>::new()),
    );
    let mut outbound: HashMap<String, String> = HashMap::new();
    root.dispatch(
        TriggerEvent::HttpRequestHeaderInjection,
        &mut state,
        &mut EventArgs::with_headers(&mut outbound),
    );

    let mut downstream_states = Vec::new();
    let mut response = serve(&trackers[1..], &mut outbound, &mut downstream_states);
    root.dispatch(
        TriggerEvent::HttpResponseHeaderExtraction,
        &mut state,
        &mut EventArgs::with_headers(&mut response).status(503),
    );

    let counts = root.aggregator().snapshot_counts();
    assert_eq!(counts[&StatName::RootToResponseInLatencyErrors], 1);
    assert!(!counts.contains_key(&StatName::RootToResponseInLatency));
    assert_eq!(counts[&StatName::ResponseLatency], 1);
}
