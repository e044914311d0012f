// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Request-scoped pathway state and the checkpoint functions that drive it.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::checkpoint::{now_ns, CheckpointLabel};
use crate::error::PropagationError;
use crate::node::NodeIdentity;

use super::context::{Direction, PathwayContext};
use super::headers::HeaderCarrier;

/// Named timestamps that metric generators read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Observation {
    /// When the pathway started at its root node.
    RootOut,
    /// When the upstream node sent the request that reached us.
    UpstreamOut,
    RequestIn,
    RequestOut,
    ResponseIn,
    ResponseOut,
}

impl Observation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RootOut => "root_out",
            Self::UpstreamOut => "upstream_out",
            Self::RequestIn => "request_in",
            Self::RequestOut => "request_out",
            Self::ResponseIn => "response_in",
            Self::ResponseOut => "response_out",
        }
    }

    /// The checkpoint label whose recording produces this observation, if
    /// it is produced locally rather than propagated.
    pub fn produced_by(&self) -> Option<CheckpointLabel> {
        match self {
            Self::RootOut | Self::UpstreamOut => None,
            Self::RequestIn => Some(CheckpointLabel::RequestIn),
            Self::RequestOut => Some(CheckpointLabel::RequestOut),
            Self::ResponseIn => Some(CheckpointLabel::ResponseIn),
            Self::ResponseOut => Some(CheckpointLabel::ResponseOut),
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one in-flight request knows about its pathway.
///
/// Owned by the request; the host threads it through its handlers.
#[derive(Debug, Default)]
pub struct PathwayState {
    context: Option<PathwayContext>,
    metrics: BTreeMap<String, i64>,
}

impl PathwayState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(&self) -> Option<&PathwayContext> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut PathwayContext> {
        self.context.as_mut()
    }

    pub fn set_context(&mut self, context: PathwayContext) {
        self.context = Some(context);
    }

    fn require_context(&mut self) -> Result<&mut PathwayContext, PropagationError> {
        self.context.as_mut().ok_or(PropagationError::NoContext)
    }

    /// Start a pathway rooted at `node` unless one already exists.
    ///
    /// Returns `true` if a new pathway was created.
    pub fn start_pathway(&mut self, node: &NodeIdentity, tag: &str) -> bool {
        if self.context.is_some() {
            return false;
        }
        let context = PathwayContext::new(node, tag);
        debug!(uid = %context.uid(), node = %node, "Started new pathway");
        self.context = Some(context);
        true
    }

    /// Adopt the pathway carried on an inbound request.
    ///
    /// When the headers carry no pathway a new one is started here instead.
    pub fn extract_request(
        &mut self,
        headers: &dyn HeaderCarrier,
        node: &NodeIdentity,
        tag: &str,
    ) -> Result<(), PropagationError> {
        if self.context.is_some() {
            return Ok(());
        }
        match PathwayContext::from_headers(headers, Direction::Request, node) {
            Ok(context) => {
                self.context = Some(context);
                Ok(())
            }
            Err(err) if err.is_absent() => {
                self.start_pathway(node, tag);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Read the downstream pathway hash from an inbound response.
    pub fn extract_response(
        &mut self,
        headers: &dyn HeaderCarrier,
        node: &NodeIdentity,
    ) -> Result<(), PropagationError> {
        let downstream = PathwayContext::from_headers(headers, Direction::Response, node)?;
        let context = self.require_context()?;
        if downstream.uid() != context.uid() {
            debug!(
                ours = %context.uid(),
                theirs = %downstream.uid(),
                "Response carries a different pathway uid"
            );
        }
        context.set_downstream_hash(downstream.node_hash());
        Ok(())
    }

    /// Serialize the current pathway into outbound headers.
    pub fn inject(&self, headers: &mut dyn HeaderCarrier) -> Result<(), PropagationError> {
        self.context
            .as_ref()
            .ok_or(PropagationError::NoContext)?
            .inject_into(headers)
    }

    /// Record that a request to a downstream node is leaving.
    pub fn request_out(&mut self, node: &NodeIdentity) -> Result<(), PropagationError> {
        self.require_context()?
            .record(node, CheckpointLabel::RequestOut, now_ns(), true);
        Ok(())
    }

    /// Record that a request arrived at this node.
    ///
    /// A pathway started locally already carries its root checkpoint, which
    /// doubles as this node's ingress.
    pub fn request_in(&mut self, node: &NodeIdentity) -> Result<(), PropagationError> {
        let context = self.require_context()?;
        if context.local_checkpoints().is_empty() {
            context.record(node, CheckpointLabel::RequestIn, now_ns(), true);
        }
        Ok(())
    }

    /// Record a response arriving from downstream with HTTP `status`.
    pub fn response_in(&mut self, node: &NodeIdentity, status: u16) -> Result<(), PropagationError> {
        self.require_context()?
            .record(node, CheckpointLabel::ResponseIn, now_ns(), status < 400);
        Ok(())
    }

    /// Record this node's response leaving.
    ///
    /// Returns `true` when this node is the last hop: the missing
    /// response_in/response_out pair is synthesized and stats are due.
    pub fn response_out(&mut self, node: &NodeIdentity) -> Result<bool, PropagationError> {
        let context = self.require_context()?;
        let last_hop = context.is_last_hop();
        let now = now_ns();
        if last_hop {
            context.record(node, CheckpointLabel::ResponseIn, now, true);
        }
        context.record(node, CheckpointLabel::ResponseOut, now, true);
        Ok(last_hop)
    }

    /// The timestamp behind a named observation.
    pub fn observation(&self, observation: Observation) -> Option<i64> {
        let context = self.context.as_ref()?;
        match observation {
            Observation::RootOut => Some(context.root_time()),
            Observation::UpstreamOut => {
                if context.local_checkpoints().len() < context.checkpoints().len() {
                    let received = context.checkpoints().len() - context.local_checkpoints().len();
                    Some(context.checkpoints()[received - 1].time())
                } else {
                    None
                }
            }
            Observation::RequestIn => context
                .local_checkpoints()
                .iter()
                .rev()
                .find(|cp| cp.label().is_ingress())
                .map(|cp| cp.time()),
            other => other
                .produced_by()
                .and_then(|label| context.latest_local(label))
                .map(|cp| cp.time()),
        }
    }

    /// Store a generated metric value.
    pub fn set_metric(&mut self, name: &str, value: i64) {
        self.metrics.insert(name.to_string(), value);
    }

    pub fn metric(&self, name: &str) -> Option<i64> {
        self.metrics.get(name).copied()
    }

    pub fn metrics(&self) -> &BTreeMap<String, i64> {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn node() -> NodeIdentity {
        NodeIdentity::new("inventory", "prod", "c")
    }

    #[test]
    fn test_start_pathway_is_idempotent() {
        let mut state = PathwayState::new();
        assert!(state.start_pathway(&node(), "t"));
        let uid = state.context().unwrap().uid().to_string();
        assert!(!state.start_pathway(&node(), "t"));
        assert_eq!(state.context().unwrap().uid(), uid);
    }

    #[test]
    fn test_checkpoint_functions_require_context() {
        let mut state = PathwayState::new();
        assert!(matches!(
            state.request_out(&node()),
            Err(PropagationError::NoContext)
        ));
        assert!(state.response_out(&node()).is_err());
    }

    #[test]
    fn test_extract_request_without_headers_starts_pathway() {
        let mut state = PathwayState::new();
        let headers: HashMap<String, String> = HashMap::new();
        state.extract_request(&headers, &node(), "tag").unwrap();
        let context = state.context().unwrap();
        assert_eq!(context.checkpoints().len(), 1);
        assert_eq!(context.tag(), "tag");
    }

    #[test]
    fn test_request_in_skipped_for_root() {
        let mut state = PathwayState::new();
        state.start_pathway(&node(), "");
        state.request_in(&node()).unwrap();
        assert_eq!(state.context().unwrap().checkpoints().len(), 1);
    }

    #[test]
    fn test_response_in_success_by_status() {
        let mut state = PathwayState::new();
        state.start_pathway(&node(), "");
        state.request_out(&node()).unwrap();
        state.response_in(&node(), 503).unwrap();
        let last = state.context().unwrap().last_checkpoint().clone();
        assert_eq!(last.label(), CheckpointLabel::ResponseIn);
        assert!(!last.success());
    }

    #[test]
    fn test_response_out_synthesizes_on_last_hop() {
        let mut state = PathwayState::new();
        state.start_pathway(&node(), "");
        assert!(state.response_out(&node()).unwrap());

        let labels: Vec<_> = state
            .context()
            .unwrap()
            .checkpoints()
            .iter()
            .map(|cp| cp.label())
            .collect();
        assert_eq!(
            labels,
            vec![
                CheckpointLabel::RootRequestIn,
                CheckpointLabel::ResponseIn,
                CheckpointLabel::ResponseOut
            ]
        );
        assert!(state.context().unwrap().verify_chain().is_ok());
    }

    #[test]
    fn test_observations() {
        let mut state = PathwayState::new();
        assert_eq!(state.observation(Observation::RootOut), None);

        state.start_pathway(&node(), "");
        let root = state.context().unwrap().root_time();
        assert_eq!(state.observation(Observation::RootOut), Some(root));
        assert_eq!(state.observation(Observation::RequestIn), Some(root));
        assert_eq!(state.observation(Observation::UpstreamOut), None);
        assert_eq!(state.observation(Observation::RequestOut), None);

        state.request_out(&node()).unwrap();
        let out = state.observation(Observation::RequestOut).unwrap();
        assert!(out >= root);
    }

    #[test]
    fn test_metrics_store() {
        let mut state = PathwayState::new();
        state.set_metric("request_in_to_request_out_latency", 42);
        assert_eq!(state.metric("request_in_to_request_out_latency"), Some(42));
        assert_eq!(state.metric("missing"), None);
    }
}
