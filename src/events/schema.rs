// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Declarative rule tables and their compilation onto an [`EventBus`].

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::checkpoint::CheckpointLabel;
use crate::error::{AccuPathError, PropagationError, SchemaError};
use crate::pathway::{HeaderCarrier, Observation, PathwayState};

use super::service::ServiceRuntime;
use super::{EventArgs, EventBus, MetricDispatch, TriggerEvent};

/// Records a checkpoint. Returns `true` when the pathway ended at this node.
pub type ObservationFn =
    fn(&ServiceRuntime, &mut PathwayState, CheckpointLabel, &EventArgs<'_>) -> Result<bool, AccuPathError>;

/// Computes a metric from two observations.
pub type MetricFn = fn(&PathwayState, Observation, Observation) -> Option<i64>;

/// Writes propagated values into outbound headers.
pub type InjectorFn =
    fn(&ServiceRuntime, &PathwayState, &mut dyn HeaderCarrier) -> Result<(), PropagationError>;

/// Reads propagated values from inbound headers.
pub type ExtractorFn =
    fn(&ServiceRuntime, &mut PathwayState, &dyn HeaderCarrier) -> Result<(), PropagationError>;

/// Generates a fresh value into request state.
pub type StateFn = fn(&ServiceRuntime, &mut PathwayState);

/// Consumes the metrics of a finished pathway.
pub type SubmissionFn = fn(&ServiceRuntime, &mut PathwayState) -> Result<(), AccuPathError>;

/// How one value travels between nodes.
#[derive(Debug, Clone)]
pub struct PropagationRule {
    /// Name of the value in request state, used in logs.
    pub storage_key: &'static str,
    pub injection_trigger: TriggerEvent,
    pub injector: &'static str,
    /// Generates the value before injection when none is stored.
    pub default_value: Option<&'static str>,
    /// Reuse a stored value instead of always regenerating it.
    pub use_existing: bool,
    pub extraction_trigger: TriggerEvent,
    pub extractor: &'static str,
    /// Generates the value when the inbound headers do not carry it.
    pub extraction_default: Option<&'static str>,
}

/// A checkpoint recorded when `trigger` fires.
#[derive(Debug, Clone)]
pub struct ObservationRule {
    pub trigger: TriggerEvent,
    pub label: CheckpointLabel,
    pub generator: &'static str,
    /// Dispatch emitted when the generator reports the pathway ended here.
    pub on_last_hop: Option<MetricDispatch>,
}

/// A metric computed once its triggering observation is recorded.
#[derive(Debug, Clone)]
pub struct MetricRule {
    pub trigger: CheckpointLabel,
    pub name: &'static str,
    pub generator: &'static str,
    pub inputs: (Observation, Observation),
    pub dispatch: Option<MetricDispatch>,
}

/// Binds a metric dispatch to the function that consumes it.
#[derive(Debug, Clone)]
pub struct SubmissionBinding {
    pub dispatch: MetricDispatch,
    /// The metric generator whose output this submission reads.
    pub generator: &'static str,
    pub submit: SubmissionFn,
}

/// A complete rule table.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub name: &'static str,
    pub observation_generators: Vec<(&'static str, ObservationFn)>,
    pub metric_generators: Vec<(&'static str, MetricFn)>,
    pub injectors: Vec<(&'static str, InjectorFn)>,
    pub extractors: Vec<(&'static str, ExtractorFn)>,
    pub state_generators: Vec<(&'static str, StateFn)>,
    pub propagation: Vec<PropagationRule>,
    pub observations: Vec<ObservationRule>,
    pub metrics: Vec<MetricRule>,
    pub submissions: Vec<SubmissionBinding>,
}

impl Schema {
    /// Check that every name resolves and every input has a producer.
    pub fn validate(&self) -> Result<(), SchemaError> {
        self.check_unique(self.observation_generators.iter().map(|(n, _)| *n))?;
        self.check_unique(self.metric_generators.iter().map(|(n, _)| *n))?;
        self.check_unique(self.injectors.iter().map(|(n, _)| *n))?;
        self.check_unique(self.extractors.iter().map(|(n, _)| *n))?;
        self.check_unique(self.state_generators.iter().map(|(n, _)| *n))?;
        self.check_unique(self.metrics.iter().map(|m| m.name))?;

        for rule in &self.propagation {
            self.lookup(&self.injectors, rule.injector)?;
            self.lookup(&self.extractors, rule.extractor)?;
            for name in rule.default_value.iter().chain(rule.extraction_default.iter()) {
                self.lookup(&self.state_generators, name)?;
            }
        }

        let observed: HashSet<CheckpointLabel> =
            self.observations.iter().map(|rule| rule.label).collect();
        for rule in &self.observations {
            self.lookup(&self.observation_generators, rule.generator)?;
            if let Some(dispatch) = rule.on_last_hop {
                self.check_bound(dispatch)?;
            }
        }

        for metric in &self.metrics {
            self.lookup(&self.metric_generators, metric.generator)?;
            if !observed.contains(&metric.trigger) {
                return Err(self.unobserved(metric.name, metric.trigger.as_str()));
            }
            for input in [metric.inputs.0, metric.inputs.1] {
                let produced = match input.produced_by() {
                    Some(label) => observed.contains(&label),
                    None => !self.propagation.is_empty(),
                };
                if !produced {
                    return Err(self.unobserved(metric.name, input.as_str()));
                }
            }
            if let Some(dispatch) = metric.dispatch {
                self.check_bound(dispatch)?;
            }
        }

        for binding in &self.submissions {
            self.lookup(&self.metric_generators, binding.generator)?;
        }

        Ok(())
    }

    /// Validate, then register one handler per rule on `bus`.
    ///
    /// For each HTTP trigger, extraction and default-value handlers run
    /// first, observation handlers second and injection handlers last.
    pub fn compile(&self, bus: &mut EventBus, runtime: Arc<ServiceRuntime>) -> Result<(), SchemaError> {
        self.validate()?;

        let triggers = [
            TriggerEvent::HttpRequestHeaderExtraction,
            TriggerEvent::HttpRequestHeaderInjection,
            TriggerEvent::HttpResponseHeaderExtraction,
            TriggerEvent::HttpResponseHeaderInjection,
        ];

        for trigger in triggers {
            for rule in self.propagation.iter().filter(|r| r.extraction_trigger == trigger) {
                self.register_extraction(bus, &runtime, rule)?;
            }
            for rule in self.propagation.iter().filter(|r| r.injection_trigger == trigger) {
                self.register_default(bus, &runtime, rule)?;
            }
            for rule in self.observations.iter().filter(|r| r.trigger == trigger) {
                self.register_observation(bus, &runtime, rule)?;
            }
            for rule in self.propagation.iter().filter(|r| r.injection_trigger == trigger) {
                self.register_injection(bus, &runtime, rule)?;
            }
        }

        for metric in &self.metrics {
            self.register_metric(bus, metric)?;
        }

        for binding in &self.submissions {
            let runtime = Arc::clone(&runtime);
            let submit = binding.submit;
            bus.on(
                TriggerEvent::MetricGenerated(binding.dispatch),
                move |_, state, _| submit(&runtime, state),
            );
        }

        debug!(
            schema = self.name,
            observations = self.observations.len(),
            metrics = self.metrics.len(),
            "Compiled schema"
        );
        Ok(())
    }

    fn register_extraction(
        &self,
        bus: &mut EventBus,
        runtime: &Arc<ServiceRuntime>,
        rule: &PropagationRule,
    ) -> Result<(), SchemaError> {
        let extractor = self.lookup(&self.extractors, rule.extractor)?;
        let fallback = rule
            .extraction_default
            .map(|name| self.lookup(&self.state_generators, name))
            .transpose()?;
        let runtime = Arc::clone(runtime);
        let key = rule.storage_key;

        bus.on(rule.extraction_trigger, move |_, state, args| {
            let result = match args.headers.as_deref() {
                Some(headers) => extractor(&runtime, state, headers),
                None => Err(PropagationError::MissingHeader(key.to_string())),
            };
            match (result, fallback) {
                (Ok(()), _) => Ok(()),
                (Err(err), Some(fallback)) if err.is_absent() => {
                    debug!(key, "Nothing to extract, generating default");
                    fallback(&runtime, state);
                    Ok(())
                }
                (Err(err), _) => Err(err.into()),
            }
        });
        Ok(())
    }

    fn register_default(
        &self,
        bus: &mut EventBus,
        runtime: &Arc<ServiceRuntime>,
        rule: &PropagationRule,
    ) -> Result<(), SchemaError> {
        let Some(name) = rule.default_value else {
            return Ok(());
        };
        let generate = self.lookup(&self.state_generators, name)?;
        let use_existing = rule.use_existing;
        let runtime = Arc::clone(runtime);

        bus.on(rule.injection_trigger, move |_, state, _| {
            if !use_existing || state.context().is_none() {
                generate(&runtime, state);
            }
            Ok(())
        });
        Ok(())
    }

    fn register_observation(
        &self,
        bus: &mut EventBus,
        runtime: &Arc<ServiceRuntime>,
        rule: &ObservationRule,
    ) -> Result<(), SchemaError> {
        let generator = self.lookup(&self.observation_generators, rule.generator)?;
        let label = rule.label;
        let on_last_hop = rule.on_last_hop;
        let runtime = Arc::clone(runtime);

        bus.on(rule.trigger, move |bus, state, args| {
            let last_hop = generator(&runtime, state, label, args)?;
            bus.dispatch(TriggerEvent::ObservationGenerated(label), state, args);
            if let (true, Some(dispatch)) = (last_hop, on_last_hop) {
                bus.dispatch(TriggerEvent::MetricGenerated(dispatch), state, args);
            }
            Ok(())
        });
        Ok(())
    }

    fn register_injection(
        &self,
        bus: &mut EventBus,
        runtime: &Arc<ServiceRuntime>,
        rule: &PropagationRule,
    ) -> Result<(), SchemaError> {
        let injector = self.lookup(&self.injectors, rule.injector)?;
        let runtime = Arc::clone(runtime);
        let key = rule.storage_key;

        bus.on(rule.injection_trigger, move |_, state, args| {
            let headers = args
                .headers
                .as_deref_mut()
                .ok_or_else(|| AccuPathError::InvalidState(format!("no carrier to inject {}", key)))?;
            injector(&runtime, state, headers)?;
            Ok(())
        });
        Ok(())
    }

    fn register_metric(&self, bus: &mut EventBus, metric: &MetricRule) -> Result<(), SchemaError> {
        let generator = self.lookup(&self.metric_generators, metric.generator)?;
        let (from, to) = metric.inputs;
        let name = metric.name;
        let dispatch = metric.dispatch;

        bus.on(
            TriggerEvent::ObservationGenerated(metric.trigger),
            move |bus, state, args| {
                let Some(value) = generator(state, from, to) else {
                    debug!(metric = name, %from, %to, "Metric inputs not observed");
                    return Ok(());
                };
                state.set_metric(name, value);
                if let Some(dispatch) = dispatch {
                    bus.dispatch(TriggerEvent::MetricGenerated(dispatch), state, args);
                }
                Ok(())
            },
        );
        Ok(())
    }

    fn lookup<T: Copy>(&self, table: &[(&'static str, T)], name: &str) -> Result<T, SchemaError> {
        table
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, f)| *f)
            .ok_or_else(|| SchemaError::UnknownGenerator {
                schema: self.name.to_string(),
                name: name.to_string(),
            })
    }

    fn check_unique<'a>(&self, names: impl Iterator<Item = &'a str>) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name) {
                return Err(SchemaError::Duplicate {
                    schema: self.name.to_string(),
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_bound(&self, dispatch: MetricDispatch) -> Result<(), SchemaError> {
        if self.submissions.iter().any(|b| b.dispatch == dispatch) {
            Ok(())
        } else {
            Err(SchemaError::UnboundDispatch {
                schema: self.name.to_string(),
                dispatch: dispatch.to_string(),
            })
        }
    }

    fn unobserved(&self, metric: &str, observation: &str) -> SchemaError {
        SchemaError::UnobservedInput {
            schema: self.name.to_string(),
            metric: metric.to_string(),
            observation: observation.to_string(),
        }
    }
}
