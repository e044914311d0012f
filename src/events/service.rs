// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The built-in rule table for HTTP services.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::checkpoint::CheckpointLabel;
use crate::error::{AccuPathError, PropagationError};
use crate::node::NodeIdentity;
use crate::pathway::{Direction, HeaderCarrier, Observation, PathwayContext, PathwayState};
use crate::stats::{submission_entries, StatsAggregator};

use super::schema::{
    ExtractorFn, InjectorFn, MetricFn, MetricRule, ObservationFn, ObservationRule, PropagationRule,
    Schema, StateFn, SubmissionBinding,
};
use super::{EventArgs, MetricDispatch, TriggerEvent};

/// What compiled handlers need from the process that hosts them.
#[derive(Debug)]
pub struct ServiceRuntime {
    node: NodeIdentity,
    tag: String,
    aggregator: Arc<StatsAggregator>,
    verify_chain: bool,
}

impl ServiceRuntime {
    pub fn new(node: NodeIdentity, aggregator: Arc<StatsAggregator>) -> Self {
        Self {
            node,
            tag: String::new(),
            aggregator,
            verify_chain: false,
        }
    }

    /// Set the tag stamped on pathways started by this node.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Check the checkpoint chain before submitting stats.
    pub fn with_verify_chain(mut self, verify: bool) -> Self {
        self.verify_chain = verify;
        self
    }

    pub fn node(&self) -> &NodeIdentity {
        &self.node
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn aggregator(&self) -> &Arc<StatsAggregator> {
        &self.aggregator
    }
}

fn time_checkpoint(
    runtime: &ServiceRuntime,
    state: &mut PathwayState,
    label: CheckpointLabel,
    args: &EventArgs<'_>,
) -> Result<bool, AccuPathError> {
    let node = &runtime.node;
    match label {
        CheckpointLabel::RootRequestIn => {
            state.start_pathway(node, &runtime.tag);
        }
        CheckpointLabel::RequestIn => state.request_in(node)?,
        CheckpointLabel::RequestOut => state.request_out(node)?,
        CheckpointLabel::ResponseIn => state.response_in(node, args.status.unwrap_or(200))?,
        CheckpointLabel::ResponseOut => return Ok(state.response_out(node)?),
    }
    Ok(false)
}

fn checkpoint_diff(state: &PathwayState, from: Observation, to: Observation) -> Option<i64> {
    Some(state.observation(to)? - state.observation(from)?)
}

fn inject_context(
    _runtime: &ServiceRuntime,
    state: &PathwayState,
    headers: &mut dyn HeaderCarrier,
) -> Result<(), PropagationError> {
    state.inject(headers)
}

fn extract_request_context(
    runtime: &ServiceRuntime,
    state: &mut PathwayState,
    headers: &dyn HeaderCarrier,
) -> Result<(), PropagationError> {
    if state.context().is_some() {
        return Ok(());
    }
    let context = PathwayContext::from_headers(headers, Direction::Request, &runtime.node)?;
    state.set_context(context);
    Ok(())
}

fn extract_response_context(
    runtime: &ServiceRuntime,
    state: &mut PathwayState,
    headers: &dyn HeaderCarrier,
) -> Result<(), PropagationError> {
    state.extract_response(headers, &runtime.node)
}

fn new_pathway(runtime: &ServiceRuntime, state: &mut PathwayState) {
    let context = PathwayContext::new(&runtime.node, runtime.tag.as_str());
    debug!(uid = %context.uid(), node = %runtime.node, "Started new pathway");
    state.set_context(context);
}

fn submit_service_metrics(
    runtime: &ServiceRuntime,
    state: &mut PathwayState,
) -> Result<(), AccuPathError> {
    let context = state.context_mut().ok_or(PropagationError::NoContext)?;

    if runtime.verify_chain {
        if let Err(err) = context.verify_chain() {
            warn!(uid = %context.uid(), error = %err, "Skipping stats for broken pathway");
            return Ok(());
        }
    }
    if !context.mark_submitted() {
        return Ok(());
    }

    let entries = submission_entries(state);
    debug!(count = entries.len(), metrics = ?state.metrics(), "Submitting pathway stats");
    runtime.aggregator.add_bucket_data(entries);
    Ok(())
}

/// The rule table every instrumented HTTP service runs.
///
/// Each HTTP header event records one checkpoint, the five latency metrics
/// are derived from those checkpoints and `request_out_to_response_in_latency`
/// submits the pathway's stats. A last hop, which never sees a response
/// come back, submits from `response_out` instead.
pub fn service_schema() -> Schema {
    use CheckpointLabel as L;
    use Observation as O;
    use TriggerEvent as T;

    let submit = Some(MetricDispatch::SubmitMetrics);
    let observation = |trigger, label| ObservationRule {
        trigger,
        label,
        generator: "time_checkpoint",
        on_last_hop: None,
    };
    let metric = |trigger, name, inputs, dispatch| MetricRule {
        trigger,
        name,
        generator: "checkpoint_diff",
        inputs,
        dispatch,
    };

    Schema {
        name: "service",
        observation_generators: vec![("time_checkpoint", time_checkpoint as ObservationFn)],
        metric_generators: vec![("checkpoint_diff", checkpoint_diff as MetricFn)],
        injectors: vec![("inject_context", inject_context as InjectorFn)],
        extractors: vec![
            ("extract_request_context", extract_request_context as ExtractorFn),
            ("extract_response_context", extract_response_context as ExtractorFn),
        ],
        state_generators: vec![("new_pathway", new_pathway as StateFn)],
        propagation: vec![
            PropagationRule {
                storage_key: "request_pathway",
                injection_trigger: T::HttpRequestHeaderInjection,
                injector: "inject_context",
                default_value: Some("new_pathway"),
                use_existing: true,
                extraction_trigger: T::HttpRequestHeaderExtraction,
                extractor: "extract_request_context",
                extraction_default: Some("new_pathway"),
            },
            PropagationRule {
                storage_key: "response_pathway",
                injection_trigger: T::HttpResponseHeaderInjection,
                injector: "inject_context",
                default_value: None,
                use_existing: true,
                extraction_trigger: T::HttpResponseHeaderExtraction,
                extractor: "extract_response_context",
                extraction_default: None,
            },
        ],
        observations: vec![
            observation(T::HttpRequestHeaderExtraction, L::RequestIn),
            observation(T::HttpRequestHeaderInjection, L::RequestOut),
            observation(T::HttpResponseHeaderExtraction, L::ResponseIn),
            ObservationRule {
                on_last_hop: submit,
                ..observation(T::HttpResponseHeaderInjection, L::ResponseOut)
            },
        ],
        metrics: vec![
            metric(L::RequestIn, "root_to_request_in_latency", (O::RootOut, O::RequestIn), None),
            metric(L::RequestIn, "upstream_to_request_in_latency", (O::UpstreamOut, O::RequestIn), None),
            metric(L::RequestOut, "request_in_to_request_out_latency", (O::RequestIn, O::RequestOut), None),
            metric(L::ResponseIn, "request_out_to_response_in_latency", (O::RequestOut, O::ResponseIn), submit),
            metric(L::ResponseOut, "response_in_to_response_out_latency", (O::ResponseIn, O::ResponseOut), None),
        ],
        submissions: vec![SubmissionBinding {
            dispatch: MetricDispatch::SubmitMetrics,
            generator: "checkpoint_diff",
            submit: submit_service_metrics,
        }],
    }
}
