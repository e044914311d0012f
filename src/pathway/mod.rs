// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pathway context propagation.
//!
//! A pathway is the causal chain of checkpoints one logical request leaves as
//! it crosses services. This module provides:
//!
//! - [`PathwayContext`] - the per-request aggregate and its header wire format
//! - [`HeaderCarrier`] - the containers context is injected into and extracted from
//! - [`PathwayState`] - request-scoped state with the checkpoint functions
//!
//! # Flow
//!
//! ```text
//! root_request_in -> [request_out -> request_in]* -> response_in -> response_out
//! ```
//!
//! Each hop extracts the context on ingress, records checkpoints chained to
//! the previous hash, and injects the context again on egress.

mod context;
mod headers;
mod state;

pub use context::{Direction, PathwayContext};
pub use headers::{header_name, HeaderCarrier, PropagatedField, HEADER_PREFIX};
pub use state::{Observation, PathwayState};
