//! Metric registry and the exporter's own operational metrics.
//!
//! [`MetricsRegistry`] is an explicit handle owned by the bridge and shared
//! with the rule engine and the scrape server. Every rule registers its
//! collector here once at load time.

pub mod counter;
pub mod summary;

use crate::core::{BridgeError, Result};
use prometheus::core::Collector;
use prometheus::proto::{Metric, MetricFamily, MetricType};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

pub use counter::{CounterChild, ValueCounter, ValueCounterVec};
pub use summary::{Summary, SummaryChild, SummaryOpts, SummaryVec};

/// Shared metric registry with text exposition
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
}

impl MetricsRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collector; names must be unique across the registry.
    pub fn register(&self, collector: Box<dyn Collector>) -> Result<()> {
        self.registry.register(collector)?;
        Ok(())
    }

    /// Collect every registered family.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Render every registered metric in the text exposition format.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| BridgeError::process(format!("exposition is not UTF-8: {}", e)))
    }

    /// Content type of [`MetricsRegistry::render`] output.
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Number of metric families that currently have series.
    pub fn family_count(&self) -> usize {
        self.gather().len()
    }

    /// Current value of a counter or gauge series.
    ///
    /// `labels` must name every label of the series, const labels included.
    pub fn value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let (kind, metric) = self.find(name, labels)?;
        match kind {
            MetricType::COUNTER => Some(metric.get_counter().get_value()),
            MetricType::GAUGE => Some(metric.get_gauge().get_value()),
            MetricType::UNTYPED => Some(metric.get_untyped().get_value()),
            _ => None,
        }
    }

    /// Observation count of a histogram or summary series.
    pub fn observation_count(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        let (kind, metric) = self.find(name, labels)?;
        match kind {
            MetricType::HISTOGRAM => Some(metric.get_histogram().get_sample_count()),
            MetricType::SUMMARY => Some(metric.get_summary().get_sample_count()),
            _ => None,
        }
    }

    /// Observation sum of a histogram or summary series.
    pub fn observation_sum(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let (kind, metric) = self.find(name, labels)?;
        match kind {
            MetricType::HISTOGRAM => Some(metric.get_histogram().get_sample_sum()),
            MetricType::SUMMARY => Some(metric.get_summary().get_sample_sum()),
            _ => None,
        }
    }

    /// Number of series exported under a metric name.
    pub fn series_count(&self, name: &str) -> usize {
        self.gather()
            .iter()
            .find(|family| family.get_name() == name)
            .map_or(0, |family| family.get_metric().len())
    }

    fn find(&self, name: &str, labels: &[(&str, &str)]) -> Option<(MetricType, Metric)> {
        let families = self.gather();
        let family = families.into_iter().find(|family| family.get_name() == name)?;
        let kind = family.get_field_type();
        family
            .get_metric()
            .iter()
            .find(|metric| {
                let pairs = metric.get_label();
                pairs.len() == labels.len()
                    && labels.iter().all(|(k, v)| {
                        pairs
                            .iter()
                            .any(|pair| pair.get_name() == *k && pair.get_value() == *v)
                    })
            })
            .cloned()
            .map(|metric| (kind, metric))
    }
}

/// Ingestion stage an error is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorStage {
    /// Stream corruption or read failure
    Frame,
    /// Payload decode failure
    Unmarshal,
    /// Rule evaluation failure
    Process,
}

impl ErrorStage {
    /// Every stage, in label order.
    pub const ALL: [ErrorStage; 3] = [ErrorStage::Frame, ErrorStage::Unmarshal, ErrorStage::Process];

    /// Value of the `stage` label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStage::Frame => "frame",
            ErrorStage::Unmarshal => "unmarshal",
            ErrorStage::Process => "process",
        }
    }
}

/// Operational metrics of the ingestion loop
#[derive(Clone)]
pub struct BridgeMetrics {
    messages: IntCounter,
    duration: Summary,
    errors: IntCounterVec,
}

impl BridgeMetrics {
    /// Decoded records.
    pub const MESSAGES_TOTAL: &'static str = "heka_exporter_messages_total";
    /// Per-record processing time.
    pub const MESSAGE_DURATION: &'static str = "heka_exporter_message_duration_seconds";
    /// Errors by stage.
    pub const ERRORS_TOTAL: &'static str = "heka_exporter_errors_total";

    /// Create and register the operational metrics.
    pub fn register(registry: &MetricsRegistry) -> Result<Self> {
        let messages = IntCounter::new(Self::MESSAGES_TOTAL, "Number of decoded messages.")?;
        let duration = Summary::with_opts(SummaryOpts::new(
            Self::MESSAGE_DURATION,
            "Time spent decoding and dispatching a message.",
        ))?;
        let errors = IntCounterVec::new(
            Opts::new(Self::ERRORS_TOTAL, "Number of ingestion errors by stage."),
            &["stage"],
        )?;

        for stage in ErrorStage::ALL {
            errors.get_metric_with_label_values(&[stage.as_str()])?;
        }

        registry.register(Box::new(messages.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            messages,
            duration,
            errors,
        })
    }

    /// Count one decoded record.
    pub fn message_decoded(&self) {
        self.messages.inc();
    }

    /// Record how long one record took.
    pub fn observe_duration(&self, elapsed: Duration) {
        self.duration.observe(elapsed.as_secs_f64());
    }

    /// Count one error at `stage`.
    pub fn record_error(&self, stage: ErrorStage) {
        self.record_errors(stage, 1);
    }

    /// Count `count` errors at `stage`.
    pub fn record_errors(&self, stage: ErrorStage, count: u64) {
        if count > 0 {
            self.errors.with_label_values(&[stage.as_str()]).inc_by(count);
        }
    }

    /// Decoded records so far.
    pub fn messages_total(&self) -> u64 {
        self.messages.get()
    }

    /// Errors counted at `stage` so far.
    pub fn errors(&self, stage: ErrorStage) -> u64 {
        self.errors.with_label_values(&[stage.as_str()]).get()
    }

    /// Records whose processing time was observed.
    pub fn durations_observed(&self) -> u64 {
        self.duration.sample_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Counter;

    #[test]
    fn test_operational_metrics_preinitialized() {
        let registry = MetricsRegistry::new();
        let metrics = BridgeMetrics::register(&registry).unwrap();

        for stage in ErrorStage::ALL {
            assert_eq!(metrics.errors(stage), 0);
            assert_eq!(
                registry.value(BridgeMetrics::ERRORS_TOTAL, &[("stage", stage.as_str())]),
                Some(0.0)
            );
        }

        let text = registry.render().unwrap();
        assert!(text.contains("heka_exporter_errors_total{stage=\"unmarshal\"} 0"));
        assert!(text.contains("# TYPE heka_exporter_message_duration_seconds summary"));
    }

    #[test]
    fn test_recording() {
        let registry = MetricsRegistry::new();
        let metrics = BridgeMetrics::register(&registry).unwrap();

        metrics.message_decoded();
        metrics.observe_duration(Duration::from_millis(3));
        metrics.record_error(ErrorStage::Frame);
        metrics.record_errors(ErrorStage::Process, 2);

        assert_eq!(metrics.messages_total(), 1);
        assert_eq!(metrics.durations_observed(), 1);
        assert_eq!(metrics.errors(ErrorStage::Frame), 1);
        assert_eq!(metrics.errors(ErrorStage::Process), 2);
        assert_eq!(
            registry.observation_count(BridgeMetrics::MESSAGE_DURATION, &[]),
            Some(1)
        );
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = MetricsRegistry::new();
        let first = Counter::new("dup_total", "first").unwrap();
        let second = Counter::new("dup_total", "second").unwrap();
        registry.register(Box::new(first)).unwrap();
        let err = registry.register(Box::new(second)).unwrap_err();
        assert_eq!(err.category(), "registry");
    }

    #[test]
    fn test_lookup_helpers() {
        let registry = MetricsRegistry::new();
        let counter = Counter::new("hits_total", "Hits").unwrap();
        registry.register(Box::new(counter.clone())).unwrap();
        counter.inc_by(2.5);

        assert_eq!(registry.value("hits_total", &[]), Some(2.5));
        assert_eq!(registry.value("hits_total", &[("a", "b")]), None);
        assert_eq!(registry.value("missing_total", &[]), None);
        assert_eq!(registry.series_count("hits_total"), 1);
        assert!(registry.content_type().starts_with("text/plain"));
    }
}
