//! A single metric rule: matching, label extraction and value resolution.

use super::handle::{MetricHandle, Update};
use crate::core::{BridgeError, FieldRef, Message, MetricConfig, MetricKind, Result};
use crate::matcher::{Matcher, Predicate};
use crate::metrics::MetricsRegistry;
use std::sync::Arc;

/// What a rule did with one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    /// The value-affecting operation ran
    Applied,
    /// Only the label combination was created
    Initialized,
    /// Nothing happened
    Skipped,
}

/// A loaded metric rule with its registered metric.
#[derive(Debug)]
pub struct MetricRule {
    name: String,
    value_field: Option<FieldRef>,
    label_names: Vec<String>,
    label_fields: Vec<FieldRef>,
    matcher: Option<Arc<dyn Predicate>>,
    zero_matcher: Option<Arc<dyn Predicate>>,
    handle: MetricHandle,
}

impl MetricRule {
    /// Validate a rule, compile its matchers and register its metric.
    pub fn from_config(config: &MetricConfig, registry: &MetricsRegistry) -> Result<Self> {
        let value_field = config.value_field().map(FieldRef::parse);
        if value_field.is_none() && config.kind != MetricKind::Counter {
            return Err(BridgeError::config(format!(
                "metric '{}': a {} needs a value field",
                config.name,
                config.kind.as_str()
            )));
        }

        if !config.buckets.is_empty() && config.kind != MetricKind::Histogram {
            tracing::warn!(
                "Ignoring buckets on metric '{}': only histograms use them",
                config.name
            );
        }

        let matcher = config
            .matcher_expr()
            .map(|expr| compile(&config.name, "matcher", expr))
            .transpose()?;
        let zero_matcher = config
            .zero_matcher_expr()
            .map(|expr| compile(&config.name, "matcher_zero", expr))
            .transpose()?;

        let label_names: Vec<String> = config.labels.keys().cloned().collect();
        let label_fields = config.labels.values().map(|r| FieldRef::parse(r)).collect();

        let names: Vec<&str> = label_names.iter().map(String::as_str).collect();
        let handle = MetricHandle::build(config, &names).map_err(|e| with_rule(&config.name, e))?;
        registry
            .register(handle.collector())
            .map_err(|e| with_rule(&config.name, e))?;

        tracing::debug!(
            "Loaded {} {} with labels {:?}",
            config.kind.as_str(),
            config.name,
            label_names
        );

        Ok(Self {
            name: config.name.clone(),
            value_field,
            label_names,
            label_fields,
            matcher,
            zero_matcher,
            handle,
        })
    }

    /// Replace the main matcher with another predicate.
    pub fn with_matcher(mut self, matcher: Arc<dyn Predicate>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Replace the zero matcher with another predicate.
    pub fn with_zero_matcher(mut self, matcher: Arc<dyn Predicate>) -> Self {
        self.zero_matcher = Some(matcher);
        self
    }

    /// Metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Metric kind.
    pub fn kind(&self) -> MetricKind {
        self.handle.kind()
    }

    /// Label names in declared order.
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// The registered metric.
    pub fn handle(&self) -> &MetricHandle {
        &self.handle
    }

    /// Run the rule against one record.
    ///
    /// With a zero matcher the rule first needs the zero matcher to pass, then
    /// creates the label combination before consulting the main matcher.
    /// Without one, a failing main matcher skips the rule before any series
    /// is touched.
    pub fn process(&self, message: &Message) -> Result<RuleOutcome> {
        if let Some(zero) = &self.zero_matcher {
            if !zero.matches(message) {
                return Ok(RuleOutcome::Skipped);
            }
            let labels = self.label_values(message);
            let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
            self.handle.materialize(&labels)?;
            if !self.matcher_passes(message) {
                return Ok(RuleOutcome::Initialized);
            }
            self.apply(message, &labels)?;
            return Ok(RuleOutcome::Applied);
        }

        if !self.matcher_passes(message) {
            return Ok(RuleOutcome::Skipped);
        }
        let labels = self.label_values(message);
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        self.apply(message, &labels)?;
        Ok(RuleOutcome::Applied)
    }

    /// Label values in label-name order; unresolved references become `<nil>`.
    pub fn label_values(&self, message: &Message) -> Vec<String> {
        self.label_fields
            .iter()
            .map(|reference| message.label_value(reference))
            .collect()
    }

    fn matcher_passes(&self, message: &Message) -> bool {
        self.matcher.as_ref().map_or(true, |m| m.matches(message))
    }

    fn apply(&self, message: &Message, labels: &[&str]) -> Result<()> {
        let update = match (self.handle.kind(), &self.value_field) {
            (MetricKind::Counter, None) => Update::Increment,
            (MetricKind::Counter | MetricKind::Gauge, Some(field)) => Update::Set(message.sample(field)?),
            (MetricKind::Histogram | MetricKind::Summary, Some(field)) => {
                Update::Observe(message.sample(field)?)
            },
            (kind, None) => {
                return Err(BridgeError::config(format!(
                    "metric '{}': a {} needs a value field",
                    self.name,
                    kind.as_str()
                )));
            },
        };
        self.handle.apply(update, labels)
    }
}

fn compile(rule: &str, key: &str, expr: &str) -> Result<Arc<dyn Predicate>> {
    match Matcher::compile(expr) {
        Ok(matcher) => Ok(Arc::new(matcher)),
        Err(BridgeError::Matcher(msg)) => {
            Err(BridgeError::matcher(format!("metric '{}' {}: {}", rule, key, msg)))
        },
        Err(e) => Err(e),
    }
}

fn with_rule(rule: &str, err: BridgeError) -> BridgeError {
    match err {
        BridgeError::Registry(e) => BridgeError::config(format!("metric '{}': {}", rule, e)),
        other => other,
    }
}
