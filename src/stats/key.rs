// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Identity of one aggregated path.

use std::hash::{Hash, Hasher};

use crate::node::NodeIdentity;

/// The key a set of latency sketches is aggregated under.
///
/// Equality and hashing consider only the two pathway ids. Two keys that
/// agree on those ids collapse into one entry even if `root_node`,
/// `node_hash` or `request_id` differ; the first key inserted keeps its
/// payload fields. Collectors already rely on this grouping, so it must
/// not be widened.
#[derive(Debug, Clone)]
pub struct PathKey {
    pub request_pathway_id: u64,
    pub response_pathway_id: u64,
    pub root_node: NodeIdentity,
    pub node_hash: u64,
    pub request_id: String,
}

impl PathKey {
    pub fn new(
        request_pathway_id: u64,
        response_pathway_id: u64,
        root_node: NodeIdentity,
        node_hash: u64,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            request_pathway_id,
            response_pathway_id,
            root_node,
            node_hash,
            request_id: request_id.into(),
        }
    }
}

impl PartialEq for PathKey {
    fn eq(&self, other: &Self) -> bool {
        self.request_pathway_id == other.request_pathway_id
            && self.response_pathway_id == other.response_pathway_id
    }
}

impl Eq for PathKey {}

impl Hash for PathKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.request_pathway_id.hash(state);
        self.response_pathway_id.hash(state);
    }
}
