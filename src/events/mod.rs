// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Event-driven rule engine.
//!
//! This module defines the core abstractions that wire pathway tracking to a
//! host's HTTP lifecycle:
//! - [`TriggerEvent`] - the typed events a host or a handler publishes
//! - [`EventBus`] - ordered handler registration and synchronous dispatch
//! - [`Schema`] - declarative rule tables compiled into bus handlers
//! - [`service_schema`] - the built-in schema for HTTP services
//!
//! # Usage
//!
//! ```rust,ignore
//! use accupath::events::{service_schema, EventArgs, EventBus, ServiceRuntime, TriggerEvent};
//!
//! let mut bus = EventBus::new();
//! service_schema().compile(&mut bus, runtime)?;
//!
//! let mut state = PathwayState::new();
//! bus.dispatch(
//!     TriggerEvent::HttpRequestHeaderExtraction,
//!     &mut state,
//!     &mut EventArgs::with_headers(&mut inbound_headers),
//! );
//! ```

mod schema;
mod service;

pub use schema::{
    ExtractorFn, InjectorFn, MetricFn, MetricRule, ObservationFn, ObservationRule,
    PropagationRule, Schema, StateFn, SubmissionBinding, SubmissionFn,
};
pub use service::{service_schema, ServiceRuntime};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "telemetry")]
use tracing::debug;

use crate::checkpoint::CheckpointLabel;
use crate::error::AccuPathError;
use crate::pathway::{HeaderCarrier, PathwayState};

/// Identifier a metric rule emits once its value is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricDispatch {
    SubmitMetrics,
}

impl MetricDispatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubmitMetrics => "submit_metrics",
        }
    }
}

impl fmt::Display for MetricDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that can be published on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerEvent {
    HttpRequestHeaderInjection,
    HttpRequestHeaderExtraction,
    HttpResponseHeaderInjection,
    HttpResponseHeaderExtraction,
    /// A checkpoint with this label was just recorded.
    ObservationGenerated(CheckpointLabel),
    /// A metric rule finished and asked for a dispatch.
    MetricGenerated(MetricDispatch),
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpRequestHeaderInjection => f.write_str("http.request.header.injection"),
            Self::HttpRequestHeaderExtraction => f.write_str("http.request.header.extraction"),
            Self::HttpResponseHeaderInjection => f.write_str("http.response.header.injection"),
            Self::HttpResponseHeaderExtraction => f.write_str("http.response.header.extraction"),
            Self::ObservationGenerated(label) => write!(f, "observation.{}", label),
            Self::MetricGenerated(dispatch) => write!(f, "metric.{}", dispatch),
        }
    }
}

/// Per-dispatch inputs supplied by the publisher.
#[derive(Default)]
pub struct EventArgs<'a> {
    /// Headers being injected into or extracted from.
    pub headers: Option<&'a mut dyn HeaderCarrier>,
    /// HTTP status of a response, when one is known.
    pub status: Option<u16>,
}

impl<'a> EventArgs<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headers(headers: &'a mut dyn HeaderCarrier) -> Self {
        Self {
            headers: Some(headers),
            status: None,
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// A registered event handler.
pub type Handler =
    Arc<dyn Fn(&EventBus, &mut PathwayState, &mut EventArgs<'_>) -> Result<(), AccuPathError> + Send + Sync>;

/// Ordered handler registry.
///
/// Handlers are registered with [`EventBus::on`] while the bus is being
/// built, after which it is shared read-only.
#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<TriggerEvent, Vec<Handler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Handlers for one event run in registration order.
    pub fn on<F>(&mut self, event: TriggerEvent, handler: F) -> &mut Self
    where
        F: Fn(&EventBus, &mut PathwayState, &mut EventArgs<'_>) -> Result<(), AccuPathError>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.entry(event).or_default().push(Arc::new(handler));
        self
    }

    pub fn handler_count(&self, event: TriggerEvent) -> usize {
        self.handlers.get(&event).map_or(0, Vec::len)
    }

    /// Run every handler registered for `event`.
    ///
    /// Handler failures are logged and never reach the publisher.
    pub fn dispatch(&self, event: TriggerEvent, state: &mut PathwayState, args: &mut EventArgs<'_>) {
        let Some(handlers) = self.handlers.get(&event) else {
            return;
        };
        for handler in handlers {
            if let Err(err) = handler(self, state, args) {
                #[cfg(feature = "telemetry")]
                debug!(event = %event, error = %err, "Event handler failed");
                #[cfg(not(feature = "telemetry"))]
                let _ = err;
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<String, usize> = self
            .handlers
            .iter()
            .map(|(event, handlers)| (event.to_string(), handlers.len()))
            .collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}
