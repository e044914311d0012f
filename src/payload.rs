// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Protobuf messages shipped to the datapaths collector.

use prost::Message;

use crate::node::NodeIdentity;
use crate::stats::{PathKey, PathwayStats, StatName};

/// NodeID identifies the service node that produced a payload.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeId {
    #[prost(string, tag = "1")]
    pub service: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub env: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub host: ::prost::alloc::string::String,
}

/// EdgeType is the transport a pathway hop travelled over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum EdgeType {
    Unknown = 0,
    Http = 1,
    Grpc = 2,
}

/// EdgeID names the edge a set of stats was measured on.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EdgeId {
    #[prost(enumeration = "EdgeType", tag = "1")]
    pub r#type: i32,
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
}

/// PathwayInfo carries the hashes that identify a pathway at this node.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PathwayInfo {
    #[prost(uint64, tag = "1")]
    pub root_service_hash: u64,
    #[prost(uint64, tag = "2")]
    pub node_hash: u64,
    #[prost(uint64, tag = "3")]
    pub upstream_pathway_hash: u64,
    #[prost(uint64, tag = "4")]
    pub downstream_pathway_hash: u64,
}

/// PathwayStats holds serialized DDSketches, one per latency category.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PathwayStatsProto {
    #[prost(message, optional, tag = "1")]
    pub info: ::core::option::Option<PathwayInfo>,
    #[prost(message, optional, tag = "2")]
    pub edge: ::core::option::Option<EdgeId>,
    #[prost(bytes = "vec", tag = "3")]
    pub request_latency: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub response_latency: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub root_to_request_in_latency: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    pub root_to_request_in_latency_errors: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "7")]
    pub root_to_request_out_latency: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "8")]
    pub root_to_request_out_latency_errors: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "9")]
    pub root_to_response_in_latency: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "10")]
    pub root_to_response_in_latency_errors: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "11")]
    pub root_to_response_out_latency: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "12")]
    pub root_to_response_out_latency_errors: ::prost::alloc::vec::Vec<u8>,
}

/// Paths groups the stats of one time bucket.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Paths {
    /// start is the bucket start in nanoseconds since the Unix epoch.
    #[prost(int64, tag = "1")]
    pub start: i64,
    /// duration is the bucket width in nanoseconds.
    #[prost(int64, tag = "2")]
    pub duration: i64,
    #[prost(message, repeated, tag = "3")]
    pub stats: ::prost::alloc::vec::Vec<PathwayStatsProto>,
}

/// DataPathAPIPayload is the body POSTed to the collector.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataPathApiPayload {
    #[prost(message, optional, tag = "1")]
    pub node: ::core::option::Option<NodeId>,
    #[prost(message, optional, tag = "2")]
    pub paths: ::core::option::Option<Paths>,
}

/// Interpolation between bin boundaries in an index mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Interpolation {
    None = 0,
    Linear = 1,
    Quadratic = 2,
    Cubic = 3,
}

/// IndexMapping describes how values map to bin keys.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IndexMapping {
    #[prost(double, tag = "1")]
    pub gamma: f64,
    #[prost(double, tag = "2")]
    pub index_offset: f64,
    #[prost(enumeration = "Interpolation", tag = "3")]
    pub interpolation: i32,
}

/// Store holds bin counts, either sparse or contiguous.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Store {
    #[prost(map = "sint32, double", tag = "1")]
    pub bin_counts: ::std::collections::HashMap<i32, f64>,
    #[prost(double, repeated, tag = "2")]
    pub contiguous_bin_counts: ::prost::alloc::vec::Vec<f64>,
    #[prost(sint32, tag = "3")]
    pub contiguous_bin_index_offset: i32,
}

/// DDSketch is the serialized form of a quantile sketch.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DdSketch {
    #[prost(message, optional, tag = "1")]
    pub mapping: ::core::option::Option<IndexMapping>,
    #[prost(message, optional, tag = "2")]
    pub positive_values: ::core::option::Option<Store>,
    #[prost(message, optional, tag = "3")]
    pub negative_values: ::core::option::Option<Store>,
    #[prost(double, tag = "4")]
    pub zero_count: f64,
}

impl From<&NodeIdentity> for NodeId {
    fn from(node: &NodeIdentity) -> Self {
        Self {
            service: node.service.clone(),
            env: node.env.clone(),
            host: node.hostname.clone(),
        }
    }
}

impl PathwayStatsProto {
    /// Serialize every sketch of `stats` under the identity carried by `key`.
    pub fn from_stats(key: &PathKey, stats: &PathwayStats) -> Self {
        let sketch = |name: StatName| stats.get(name).to_proto().encode_to_vec();
        Self {
            info: Some(PathwayInfo {
                root_service_hash: key.root_node.hash(),
                node_hash: key.node_hash,
                upstream_pathway_hash: key.request_pathway_id,
                downstream_pathway_hash: key.response_pathway_id,
            }),
            edge: Some(EdgeId {
                r#type: EdgeType::Http as i32,
                name: "http".to_string(),
            }),
            request_latency: sketch(StatName::RequestLatency),
            response_latency: sketch(StatName::ResponseLatency),
            root_to_request_in_latency: sketch(StatName::RootToRequestInLatency),
            root_to_request_in_latency_errors: sketch(StatName::RootToRequestInLatencyErrors),
            root_to_request_out_latency: sketch(StatName::RootToRequestOutLatency),
            root_to_request_out_latency_errors: sketch(StatName::RootToRequestOutLatencyErrors),
            root_to_response_in_latency: sketch(StatName::RootToResponseInLatency),
            root_to_response_in_latency_errors: sketch(StatName::RootToResponseInLatencyErrors),
            root_to_response_out_latency: sketch(StatName::RootToResponseOutLatency),
            root_to_response_out_latency_errors: sketch(StatName::RootToResponseOutLatencyErrors),
        }
    }
}

impl DataPathApiPayload {
    /// Build the payload for one path key of one bucket.
    pub fn for_path(
        node: &NodeIdentity,
        bucket_start: i64,
        bucket_size: i64,
        key: &PathKey,
        stats: &PathwayStats,
    ) -> Self {
        Self {
            node: Some(NodeId::from(node)),
            paths: Some(Paths {
                start: bucket_start,
                duration: bucket_size,
                stats: vec![PathwayStatsProto::from_stats(key, stats)],
            }),
        }
    }
}
