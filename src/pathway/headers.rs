// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Header naming and the carriers pathway context is written into.

use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::PropagationError;

/// Prefix shared by every propagated header.
pub const HEADER_PREFIX: &str = "x-datadog-";

/// Derive a header name from a dotted field name.
///
/// `accupath.pathway.root_node_info` becomes
/// `x-datadog-accupath-pathway-root-node-info`.
pub fn header_name(field: &str) -> String {
    format!("{}{}", HEADER_PREFIX, field.replace(['_', '.'], "-"))
}

/// The six fields carried between hops, in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropagatedField {
    Tag,
    Uid,
    RootNodeInfo,
    RootCheckpointTime,
    LastCheckpointInfo,
    LastNodeHash,
}

impl PropagatedField {
    pub const ALL: [PropagatedField; 6] = [
        Self::Tag,
        Self::Uid,
        Self::RootNodeInfo,
        Self::RootCheckpointTime,
        Self::LastCheckpointInfo,
        Self::LastNodeHash,
    ];

    /// Dotted field name.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Tag => "accupath.pathway.tag",
            Self::Uid => "accupath.pathway.uid",
            Self::RootNodeInfo => "accupath.pathway.root_node_info",
            Self::RootCheckpointTime => "accupath.pathway.root_checkpoint_time",
            Self::LastCheckpointInfo => "accupath.pathway.last_checkpoint_info",
            Self::LastNodeHash => "accupath.pathway.last_node_hash",
        }
    }

    pub fn header_name(&self) -> String {
        header_name(self.field_name())
    }
}

/// A container headers can be read from and written to.
///
/// Implemented for the two wire shapes instrumented clients hand us (a string
/// map and a list of byte tuples) and for `reqwest`'s `HeaderMap`.
pub trait HeaderCarrier {
    /// Look up a header value by (lowercase) name.
    fn get_header(&self, name: &str) -> Option<String>;

    /// Write a header value.
    fn set_header(&mut self, name: &str, value: String) -> Result<(), PropagationError>;
}

impl HeaderCarrier for HashMap<String, String> {
    fn get_header(&self, name: &str) -> Option<String> {
        self.get(name).cloned().or_else(|| {
            self.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        })
    }

    fn set_header(&mut self, name: &str, value: String) -> Result<(), PropagationError> {
        self.insert(name.to_string(), value);
        Ok(())
    }
}

impl HeaderCarrier for Vec<(Vec<u8>, Vec<u8>)> {
    fn get_header(&self, name: &str) -> Option<String> {
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name.as_bytes()))
            .and_then(|(_, v)| String::from_utf8(v.clone()).ok())
    }

    fn set_header(&mut self, name: &str, value: String) -> Result<(), PropagationError> {
        self.push((name.as_bytes().to_vec(), value.into_bytes()));
        Ok(())
    }
}

impl HeaderCarrier for HeaderMap {
    fn get_header(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    }

    fn set_header(&mut self, name: &str, value: String) -> Result<(), PropagationError> {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| PropagationError::malformed(name, e))?;
        let value = HeaderValue::from_str(&value).map_err(|e| PropagationError::malformed(name, e))?;
        self.insert(header, value);
        Ok(())
    }
}
