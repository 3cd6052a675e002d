//! Rule engine: maps each decoded record onto metric updates.
//!
//! Rules are loaded once, register their metric in the shared registry and
//! stay read-only afterwards. Every rule runs for every record; a failing
//! rule never stops the others.

pub mod handle;
pub mod rule;

use crate::core::{BridgeError, Message, MetricConfig, Result};
use crate::metrics::MetricsRegistry;

pub use crate::core::MetricKind;
pub use handle::{MetricHandle, Update};
pub use rule::{MetricRule, RuleOutcome};

/// Result of running every rule against one record
#[derive(Debug, Default)]
pub struct Dispatch {
    /// Rules whose update ran
    pub applied: usize,
    /// Rules that only created their series
    pub initialized: usize,
    /// Rules that did nothing
    pub skipped: usize,
    /// Rule name and error for each failed rule
    pub failures: Vec<(String, BridgeError)>,
}

impl Dispatch {
    /// True when no rule failed.
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of updates applied, or an error summarizing the failed rules.
    pub fn into_result(self) -> Result<usize> {
        if self.failures.is_empty() {
            return Ok(self.applied);
        }
        let details: Vec<String> = self
            .failures
            .iter()
            .map(|(rule, err)| format!("{}: {}", rule, err))
            .collect();
        Err(BridgeError::process(format!(
            "{} rule(s) failed: {}",
            self.failures.len(),
            details.join("; ")
        )))
    }
}

/// The configured rules, in declaration order
#[derive(Debug, Default)]
pub struct RuleEngine {
    rules: Vec<MetricRule>,
}

impl RuleEngine {
    /// Load every rule. Any invalid rule fails the whole load.
    pub fn from_config(configs: &[MetricConfig], registry: &MetricsRegistry) -> Result<Self> {
        let rules = configs
            .iter()
            .map(|config| MetricRule::from_config(config, registry))
            .collect::<Result<Vec<_>>>()?;
        tracing::info!("Loaded {} metric rules", rules.len());
        Ok(Self { rules })
    }

    /// Engine over already-loaded rules.
    pub fn from_rules(rules: Vec<MetricRule>) -> Self {
        Self { rules }
    }

    /// Rules in declaration order.
    pub fn rules(&self) -> &[MetricRule] {
        &self.rules
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True without rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule against a record.
    pub fn process(&self, message: &Message) -> Dispatch {
        let mut dispatch = Dispatch::default();
        for rule in &self.rules {
            match rule.process(message) {
                Ok(RuleOutcome::Applied) => dispatch.applied += 1,
                Ok(RuleOutcome::Initialized) => dispatch.initialized += 1,
                Ok(RuleOutcome::Skipped) => dispatch.skipped += 1,
                Err(e) => {
                    tracing::debug!("Rule {} failed: {}", rule.name(), e);
                    dispatch.failures.push((rule.name().to_string(), e));
                },
            }
        }
        dispatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(json: &str) -> (RuleEngine, MetricsRegistry) {
        let configs: Vec<MetricConfig> = serde_json::from_str(json).unwrap();
        let registry = MetricsRegistry::new();
        let engine = RuleEngine::from_config(&configs, &registry).unwrap();
        (engine, registry)
    }

    #[test]
    fn test_counter_counts_every_record() {
        let (engine, registry) = engine(r#"[{"name": "records_total", "type": "counter"}]"#);
        for _ in 0..25 {
            assert!(engine.process(&Message::new()).is_ok());
        }
        assert_eq!(registry.value("records_total", &[]), Some(25.0));
    }

    #[test]
    fn test_http_status_example() {
        let (engine, registry) = engine(
            r#"[{
                "name": "http_status",
                "help": "HTTP responses by status",
                "type": "counter",
                "labels": {"code": "status"},
                "matcher": "status >= 500"
            }]"#,
        );

        engine.process(&Message::new().with_field("status", 500_i64));
        engine.process(&Message::new().with_field("status", 200_i64));

        assert_eq!(registry.value("http_status", &[("code", "500")]), Some(1.0));
        assert_eq!(registry.value("http_status", &[("code", "200")]), None);
        assert_eq!(registry.series_count("http_status"), 1);
    }

    #[test]
    fn test_zero_matcher_keeps_series_at_zero() {
        let (engine, registry) = engine(
            r#"[{
                "name": "errors_total",
                "type": "counter",
                "labels": {"host": "@hostname"},
                "matcher_zero": "TRUE",
                "matcher": "Severity < 4"
            }]"#,
        );

        let info = Message::new().with_hostname("srv001").with_severity(6);
        for _ in 0..3 {
            let dispatch = engine.process(&info);
            assert_eq!(dispatch.initialized, 1);
            assert_eq!(dispatch.applied, 0);
        }
        assert_eq!(registry.value("errors_total", &[("host", "srv001")]), Some(0.0));

        let error = Message::new().with_hostname("srv001").with_severity(3);
        assert_eq!(engine.process(&error).applied, 1);
        assert_eq!(registry.value("errors_total", &[("host", "srv001")]), Some(1.0));
    }

    #[test]
    fn test_both_matchers_apply_once() {
        let (engine, registry) = engine(
            r#"[{
                "name": "latency",
                "type": "summary",
                "value": "duration",
                "labels": {"logger": "@logger"},
                "matcher_zero": "Logger == 'api'",
                "matcher": "duration > 0"
            }]"#,
        );

        let message = Message::new().with_logger("api").with_field("duration", 0.5);
        engine.process(&message);
        engine.process(&message);
        assert_eq!(registry.observation_count("latency", &[("logger", "api")]), Some(2));
    }

    #[test]
    fn test_failing_rule_does_not_stop_others() {
        let (engine, registry) = engine(
            r#"[
                {"name": "load", "type": "gauge", "value": "load"},
                {"name": "seen_total", "type": "counter"}
            ]"#,
        );

        engine.process(&Message::new().with_field("load", 1.5));
        let dispatch = engine.process(&Message::new().with_field("load", "high"));
        assert_eq!(dispatch.failures.len(), 1);
        assert_eq!(dispatch.failures[0].0, "load");
        assert_eq!(dispatch.applied, 1);

        assert_eq!(registry.value("load", &[]), Some(1.5));
        assert_eq!(registry.value("seen_total", &[]), Some(2.0));

        let err = dispatch.into_result().unwrap_err();
        assert_eq!(err.category(), "process");
    }

    #[test]
    fn test_counter_with_value_sets() {
        let (engine, registry) = engine(
            r#"[{"name": "bytes_total", "type": "counter", "value": "bytes", "const_labels": {"app": "web"}}]"#,
        );
        engine.process(&Message::new().with_field("bytes", 100_i64));
        engine.process(&Message::new().with_field("bytes", 40_i64));
        assert_eq!(registry.value("bytes_total", &[("app", "web")]), Some(40.0));
    }

    #[test]
    fn test_counter_set_is_never_observed_half_done() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let (engine, registry) = engine(
            r#"[
                {"name": "snap_total", "type": "counter", "value": "v"},
                {"name": "snap_by_host_total", "type": "counter", "value": "v", "labels": {"host": "@hostname"}}
            ]"#,
        );
        let message = Message::new().with_hostname("a").with_field("v", 100.0);
        engine.process(&message);

        let done = AtomicBool::new(false);
        let mut seen = Vec::new();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    while !done.load(Ordering::Relaxed) {
                        assert!(engine.process(&message).is_ok());
                    }
                });
            }
            for _ in 0..20_000 {
                seen.push(registry.value("snap_total", &[]));
                seen.push(registry.value("snap_by_host_total", &[("host", "a")]));
            }
            done.store(true, Ordering::Relaxed);
        });

        assert!(seen.iter().all(|v| *v == Some(100.0)));
        assert_eq!(registry.value("snap_total", &[]), Some(100.0));
    }

    #[test]
    fn test_duplicate_names_fail_load() {
        let configs: Vec<MetricConfig> = serde_json::from_str(
            r#"[{"name": "a", "type": "counter"}, {"name": "a", "type": "gauge", "value": "v"}]"#,
        )
        .unwrap();
        assert!(RuleEngine::from_config(&configs, &MetricsRegistry::new()).is_err());
    }
}
