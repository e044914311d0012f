// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The per-request pathway aggregate and its wire format.

use tracing::debug;
use uuid::Uuid;

use crate::checkpoint::{now_ns, Checkpoint, CheckpointLabel};
use crate::error::PropagationError;
use crate::hash;
use crate::node::NodeIdentity;

use super::headers::{HeaderCarrier, PropagatedField};

/// Which way the headers being read travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Headers on an inbound request: the chain advances on receipt.
    Request,
    /// Headers on an inbound response: the sender already advanced the chain.
    Response,
}

/// One logical request pathway as seen by this node.
///
/// Held in request-scoped state and never shared across concurrent requests.
#[derive(Debug, Clone, PartialEq)]
pub struct PathwayContext {
    uid: String,
    tag: String,
    root_node: NodeIdentity,
    root_time: i64,
    checkpoints: Vec<Checkpoint>,
    /// How many leading checkpoints were reconstructed from headers.
    received: usize,
    upstream_hash: u64,
    node_hash: u64,
    downstream_hash: Option<u64>,
    submitted: bool,
}

impl PathwayContext {
    /// Start a new pathway rooted at `node`.
    pub fn new(node: &NodeIdentity, tag: impl Into<String>) -> Self {
        Self::new_at(node, tag, now_ns())
    }

    /// Start a new pathway with an explicit root time.
    pub fn new_at(node: &NodeIdentity, tag: impl Into<String>, root_time: i64) -> Self {
        let seed = Checkpoint::new(node, CheckpointLabel::RootRequestIn, 0, root_time, true);
        let node_hash = seed.hash();
        Self {
            uid: Uuid::new_v4().to_string(),
            tag: tag.into(),
            root_node: node.clone(),
            root_time,
            checkpoints: vec![seed],
            received: 0,
            upstream_hash: 0,
            node_hash,
            downstream_hash: None,
            submitted: false,
        }
    }

    /// Rebuild a context from propagated headers.
    ///
    /// The checkpoint list becomes the reconstructed root followed by the
    /// sender's last checkpoint. In the request direction `node_hash` is
    /// re-derived by chaining `local` onto the received hash; in the response
    /// direction the received hash is kept as-is.
    pub fn from_headers(
        headers: &dyn HeaderCarrier,
        direction: Direction,
        local: &NodeIdentity,
    ) -> Result<Self, PropagationError> {
        let uid = required(headers, PropagatedField::Uid)?;
        if Uuid::parse_str(&uid).is_err() {
            return Err(PropagationError::malformed(
                PropagatedField::Uid.header_name(),
                format!("not a UUID: {}", uid),
            ));
        }
        let tag = headers
            .get_header(&PropagatedField::Tag.header_name())
            .unwrap_or_default();

        let root_node = NodeIdentity::from_wire(
            &PropagatedField::RootNodeInfo.header_name(),
            &required(headers, PropagatedField::RootNodeInfo)?,
        )?;
        let root_time: i64 = parse_number(headers, PropagatedField::RootCheckpointTime)?;
        let last_checkpoint = Checkpoint::from_wire(
            &PropagatedField::LastCheckpointInfo.header_name(),
            &required(headers, PropagatedField::LastCheckpointInfo)?,
        )?;
        let last_node_hash: u64 = parse_number(headers, PropagatedField::LastNodeHash)?;

        let root = Checkpoint::new(&root_node, CheckpointLabel::RootRequestIn, 0, root_time, true);

        let (upstream_hash, node_hash) = match direction {
            Direction::Request => (last_node_hash, hash::chain(local.hash(), last_node_hash)),
            Direction::Response => (0, last_node_hash),
        };

        debug!(
            uid = %uid,
            ?direction,
            last = %last_checkpoint.label(),
            node_hash,
            "Extracted pathway context"
        );

        Ok(Self {
            uid,
            tag,
            root_node,
            root_time,
            checkpoints: vec![root, last_checkpoint],
            received: 2,
            upstream_hash,
            node_hash,
            downstream_hash: None,
            submitted: false,
        })
    }

    /// Write the six propagated fields into `headers`.
    pub fn inject_into(&self, headers: &mut dyn HeaderCarrier) -> Result<(), PropagationError> {
        let root_node = self
            .root_node
            .to_wire(&PropagatedField::RootNodeInfo.header_name())?;
        let last_checkpoint = self
            .last_checkpoint()
            .to_wire(&PropagatedField::LastCheckpointInfo.header_name())?;
        let values = [
            (PropagatedField::Tag, self.tag.clone()),
            (PropagatedField::Uid, self.uid.clone()),
            (PropagatedField::RootNodeInfo, root_node),
            (PropagatedField::RootCheckpointTime, self.root_time.to_string()),
            (PropagatedField::LastCheckpointInfo, last_checkpoint),
            (PropagatedField::LastNodeHash, self.node_hash.to_string()),
        ];
        for (field, value) in values {
            headers.set_header(&field.header_name(), value)?;
        }
        Ok(())
    }

    /// Append a checkpoint without touching `node_hash`.
    ///
    /// Callers keep `node_hash` in sync; [`PathwayContext::record`] does both.
    pub fn add_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.checkpoints.push(checkpoint);
    }

    /// Append a checkpoint created by `node`, chained to the last one, and
    /// advance `node_hash` to it.
    pub fn record(
        &mut self,
        node: &NodeIdentity,
        label: CheckpointLabel,
        time: i64,
        success: bool,
    ) -> &Checkpoint {
        let parent = self.last_checkpoint().hash();
        let checkpoint = Checkpoint::new(node, label, parent, time, success);
        self.node_hash = checkpoint.hash();
        self.add_checkpoint(checkpoint);
        self.last_checkpoint()
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn root_node(&self) -> &NodeIdentity {
        &self.root_node
    }

    pub fn root_time(&self) -> i64 {
        self.root_time
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Checkpoints this node appended itself.
    pub fn local_checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints[self.received..]
    }

    pub fn last_checkpoint(&self) -> &Checkpoint {
        // Never empty: both constructors seed at least one checkpoint
        &self.checkpoints[self.checkpoints.len() - 1]
    }

    /// The most recent locally recorded checkpoint with `label`.
    pub fn latest_local(&self, label: CheckpointLabel) -> Option<&Checkpoint> {
        self.local_checkpoints()
            .iter()
            .rev()
            .find(|cp| cp.label() == label)
    }

    pub fn upstream_hash(&self) -> u64 {
        self.upstream_hash
    }

    pub fn node_hash(&self) -> u64 {
        self.node_hash
    }

    pub fn downstream_hash(&self) -> Option<u64> {
        self.downstream_hash
    }

    pub fn set_downstream_hash(&mut self, hash: u64) {
        self.downstream_hash = Some(hash);
    }

    /// Hash identifying this node's position on the request path.
    ///
    /// This is the hash of the latest local ingress checkpoint (root or
    /// request_in), falling back to the current `node_hash`.
    pub fn request_pathway_hash(&self) -> u64 {
        self.local_checkpoints()
            .iter()
            .rev()
            .find(|cp| cp.label().is_ingress())
            .map(|cp| cp.hash())
            .unwrap_or(self.node_hash)
    }

    /// True when the pathway never left this node after arriving.
    ///
    /// At most the root, the upstream request_out and our request_in are
    /// present, and no response came back to us from further down.
    pub fn is_last_hop(&self) -> bool {
        self.checkpoints.len() <= 3 && self.latest_local(CheckpointLabel::ResponseIn).is_none()
    }

    /// True if any checkpoint recorded a failed hop.
    pub fn has_failure(&self) -> bool {
        self.checkpoints.iter().any(|cp| !cp.success())
    }

    pub fn submitted(&self) -> bool {
        self.submitted
    }

    /// Flip the submitted flag. Returns `false` if it was already set.
    pub fn mark_submitted(&mut self) -> bool {
        !std::mem::replace(&mut self.submitted, true)
    }

    /// Check that every locally appended checkpoint names its predecessor as
    /// parent.
    pub fn verify_chain(&self) -> Result<(), PropagationError> {
        let start = self.received.max(1);
        for i in start..self.checkpoints.len() {
            if self.checkpoints[i].parent_hash() != self.checkpoints[i - 1].hash() {
                return Err(PropagationError::BrokenChain(i));
            }
        }
        Ok(())
    }
}

fn required(headers: &dyn HeaderCarrier, field: PropagatedField) -> Result<String, PropagationError> {
    let name = field.header_name();
    headers
        .get_header(&name)
        .ok_or(PropagationError::MissingHeader(name))
}

fn parse_number<T>(headers: &dyn HeaderCarrier, field: PropagatedField) -> Result<T, PropagationError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = required(headers, field)?;
    raw.trim()
        .parse()
        .map_err(|e: T::Err| PropagationError::malformed(field.header_name(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn node_a() -> NodeIdentity {
        NodeIdentity::new("gateway", "prod", "a")
    }

    fn node_b() -> NodeIdentity {
        NodeIdentity::new("orders", "prod", "b")
    }

    #[test]
    fn test_new_pathway_seed() {
        let ctx = PathwayContext::new_at(&node_a(), "checkout", 1_000);
        assert_eq!(ctx.checkpoints().len(), 1);
        let seed = ctx.last_checkpoint();
        assert_eq!(seed.label(), CheckpointLabel::RootRequestIn);
        assert_eq!(seed.parent_hash(), 0);
        assert_eq!(ctx.node_hash(), seed.hash());
        assert_eq!(ctx.upstream_hash(), 0);
        assert_eq!(ctx.downstream_hash(), None);
        assert!(Uuid::parse_str(ctx.uid()).is_ok());
        assert_eq!(ctx.root_time(), 1_000);
    }

    #[test]
    fn test_record_keeps_node_hash_in_sync() {
        let mut ctx = PathwayContext::new_at(&node_a(), "", 1_000);
        let parent = ctx.node_hash();
        let hash = ctx
            .record(&node_a(), CheckpointLabel::RequestOut, 2_000, true)
            .hash();
        assert_eq!(ctx.node_hash(), hash);
        assert_eq!(ctx.last_checkpoint().parent_hash(), parent);
        assert!(ctx.verify_chain().is_ok());
    }

    #[test]
    fn test_add_checkpoint_does_not_touch_node_hash() {
        let mut ctx = PathwayContext::new_at(&node_a(), "", 1_000);
        let before = ctx.node_hash();
        ctx.add_checkpoint(Checkpoint::new(
            &node_a(),
            CheckpointLabel::RequestOut,
            before,
            2_000,
            true,
        ));
        assert_eq!(ctx.node_hash(), before);
    }

    #[test]
    fn test_inject_extract_roundtrip() {
        let mut ctx = PathwayContext::new_at(&node_a(), "checkout", 1_000);
        ctx.record(&node_a(), CheckpointLabel::RequestOut, 2_000, true);

        let mut headers: HashMap<String, String> = HashMap::new();
        ctx.inject_into(&mut headers).unwrap();
        assert_eq!(headers.len(), 6);

        let received = PathwayContext::from_headers(&headers, Direction::Request, &node_b()).unwrap();
        assert_eq!(received.tag(), "checkout");
        assert_eq!(received.uid(), ctx.uid());
        assert_eq!(received.root_node(), ctx.root_node());
        assert_eq!(received.root_time(), ctx.root_time());
        assert_eq!(received.checkpoints().len(), 2);
        assert_eq!(received.last_checkpoint(), ctx.last_checkpoint());
        assert!(received.local_checkpoints().is_empty());
    }

    #[test]
    fn test_injected_json_headers_are_never_empty() {
        let ctx = PathwayContext::new_at(&NodeIdentity::new("", "", ""), "", 0);
        let mut headers: HashMap<String, String> = HashMap::new();
        ctx.inject_into(&mut headers).unwrap();

        let root_header = PropagatedField::RootNodeInfo.header_name();
        let root = &headers[&root_header];
        assert!(!root.is_empty());
        assert_eq!(&NodeIdentity::from_wire(&root_header, root).unwrap(), ctx.root_node());

        let checkpoint_header = PropagatedField::LastCheckpointInfo.header_name();
        let checkpoint = &headers[&checkpoint_header];
        assert!(!checkpoint.is_empty());
        assert_eq!(
            &Checkpoint::from_wire(&checkpoint_header, checkpoint).unwrap(),
            ctx.last_checkpoint()
        );
    }

    #[test]
    fn test_request_direction_recomputes_chain() {
        let mut ctx = PathwayContext::new_at(&node_a(), "", 1_000);
        ctx.record(&node_a(), CheckpointLabel::RequestOut, 2_000, true);
        let mut headers: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        ctx.inject_into(&mut headers).unwrap();

        let mut received =
            PathwayContext::from_headers(&headers, Direction::Request, &node_b()).unwrap();
        assert_eq!(received.upstream_hash(), ctx.node_hash());

        // The recomputed hash matches the one node B derives for its request_in
        let expected = received.node_hash();
        let request_in = received
            .record(&node_b(), CheckpointLabel::RequestIn, 3_000, true)
            .hash();
        assert_eq!(expected, request_in);
    }

    #[test]
    fn test_response_direction_trusts_hash() {
        let mut ctx = PathwayContext::new_at(&node_b(), "", 1_000);
        ctx.record(&node_b(), CheckpointLabel::ResponseOut, 2_000, true);
        let mut headers: HashMap<String, String> = HashMap::new();
        ctx.inject_into(&mut headers).unwrap();

        let received = PathwayContext::from_headers(&headers, Direction::Response, &node_a()).unwrap();
        assert_eq!(received.node_hash(), ctx.node_hash());
    }

    #[test]
    fn test_from_headers_missing() {
        let headers: HashMap<String, String> = HashMap::new();
        let err = PathwayContext::from_headers(&headers, Direction::Request, &node_b()).unwrap_err();
        assert!(err.is_absent());
    }

    #[test]
    fn test_from_headers_malformed_hash() {
        let ctx = PathwayContext::new_at(&node_a(), "", 1_000);
        let mut headers: HashMap<String, String> = HashMap::new();
        ctx.inject_into(&mut headers).unwrap();
        headers.insert(
            PropagatedField::LastNodeHash.header_name(),
            "not-a-number".to_string(),
        );

        let err = PathwayContext::from_headers(&headers, Direction::Request, &node_b()).unwrap_err();
        assert!(matches!(err, PropagationError::MalformedHeader { .. }));
    }

    #[test]
    fn test_from_headers_bad_uid() {
        let ctx = PathwayContext::new_at(&node_a(), "", 1_000);
        let mut headers: HashMap<String, String> = HashMap::new();
        ctx.inject_into(&mut headers).unwrap();
        headers.insert(PropagatedField::Uid.header_name(), "nope".to_string());

        assert!(PathwayContext::from_headers(&headers, Direction::Request, &node_b()).is_err());
    }

    #[test]
    fn test_last_hop_detection() {
        let mut ctx = PathwayContext::new_at(&node_a(), "", 1_000);
        assert!(ctx.is_last_hop());
        ctx.record(&node_a(), CheckpointLabel::RequestOut, 2_000, true);
        assert!(ctx.is_last_hop());
        ctx.record(&node_a(), CheckpointLabel::ResponseIn, 3_000, true);
        assert!(!ctx.is_last_hop());
    }

    #[test]
    fn test_last_hop_after_extraction() {
        let mut upstream = PathwayContext::new_at(&node_a(), "", 1_000);
        upstream.record(&node_a(), CheckpointLabel::RequestOut, 2_000, true);
        let mut headers: HashMap<String, String> = HashMap::new();
        upstream.inject_into(&mut headers).unwrap();

        let mut ctx = PathwayContext::from_headers(&headers, Direction::Request, &node_b()).unwrap();
        ctx.record(&node_b(), CheckpointLabel::RequestIn, 3_000, true);
        assert_eq!(ctx.checkpoints().len(), 3);
        assert!(ctx.is_last_hop());
        ctx.record(&node_b(), CheckpointLabel::RequestOut, 4_000, true);
        assert!(!ctx.is_last_hop());
    }

    #[test]
    fn test_mark_submitted_once() {
        let mut ctx = PathwayContext::new_at(&node_a(), "", 1_000);
        assert!(!ctx.submitted());
        assert!(ctx.mark_submitted());
        assert!(!ctx.mark_submitted());
        assert!(ctx.submitted());
    }

    #[test]
    fn test_verify_chain_detects_break() {
        let mut ctx = PathwayContext::new_at(&node_a(), "", 1_000);
        ctx.add_checkpoint(Checkpoint::new(
            &node_a(),
            CheckpointLabel::RequestOut,
            999,
            2_000,
            true,
        ));
        assert!(matches!(
            ctx.verify_chain(),
            Err(PropagationError::BrokenChain(1))
        ));
    }

    #[test]
    fn test_request_pathway_hash_uses_ingress() {
        let mut ctx = PathwayContext::new_at(&node_a(), "", 1_000);
        let root_hash = ctx.node_hash();
        ctx.record(&node_a(), CheckpointLabel::RequestOut, 2_000, true);
        assert_eq!(ctx.request_pathway_hash(), root_hash);
    }

    #[test]
    fn test_has_failure() {
        let mut ctx = PathwayContext::new_at(&node_a(), "", 1_000);
        assert!(!ctx.has_failure());
        ctx.record(&node_a(), CheckpointLabel::ResponseIn, 2_000, false);
        assert!(ctx.has_failure());
    }
}
