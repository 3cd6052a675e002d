//! Live metric objects behind each rule.

use crate::core::{BridgeError, MetricConfig, MetricKind, Result};
use crate::metrics::{Summary, SummaryOpts, SummaryVec, ValueCounter, ValueCounterVec};
use prometheus::core::Collector;
use prometheus::{Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts};
use std::fmt;

/// Value-affecting operation produced by a rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Update {
    /// Add one to a counter
    Increment,
    /// Replace the current value
    Set(f64),
    /// Record one observation
    Observe(f64),
}

/// One of the eight metric shapes: four kinds, each scalar or labeled.
///
/// The shape is fixed when the rule is loaded. Label values are passed in
/// the rule's label order and ignored by scalar handles. Counters are the
/// settable kind so a value-carrying rule replaces the series in one store.
#[derive(Clone)]
pub enum MetricHandle {
    /// Scalar counter
    Counter(ValueCounter),
    /// Labeled counter
    CounterVec(ValueCounterVec),
    /// Scalar gauge
    Gauge(Gauge),
    /// Labeled gauge
    GaugeVec(GaugeVec),
    /// Scalar histogram
    Histogram(Histogram),
    /// Labeled histogram
    HistogramVec(HistogramVec),
    /// Scalar summary
    Summary(Summary),
    /// Labeled summary
    SummaryVec(SummaryVec),
}

impl MetricHandle {
    /// Build the handle described by a rule. A non-empty `label_names`
    /// selects the labeled shape.
    pub fn build(config: &MetricConfig, label_names: &[&str]) -> Result<Self> {
        let vector = !label_names.is_empty();
        let opts = Opts::new(config.name.clone(), help_text(config))
            .const_labels(config.const_labels.clone());

        let handle = match config.kind {
            MetricKind::Counter if vector => {
                Self::CounterVec(ValueCounterVec::new(opts, label_names)?)
            },
            MetricKind::Counter => Self::Counter(ValueCounter::with_opts(opts)?),
            MetricKind::Gauge if vector => Self::GaugeVec(GaugeVec::new(opts, label_names)?),
            MetricKind::Gauge => Self::Gauge(Gauge::with_opts(opts)?),
            MetricKind::Histogram => {
                let mut opts = HistogramOpts::from(opts);
                if !config.buckets.is_empty() {
                    opts = opts.buckets(config.buckets.clone());
                }
                if vector {
                    Self::HistogramVec(HistogramVec::new(opts, label_names)?)
                } else {
                    Self::Histogram(Histogram::with_opts(opts)?)
                }
            },
            MetricKind::Summary => {
                let opts = SummaryOpts::new(config.name.clone(), help_text(config))
                    .const_labels(config.const_labels.clone());
                if vector {
                    Self::SummaryVec(SummaryVec::new(opts, label_names)?)
                } else {
                    Self::Summary(Summary::with_opts(opts)?)
                }
            },
        };
        Ok(handle)
    }

    /// Metric kind, regardless of shape.
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) | Self::CounterVec(_) => MetricKind::Counter,
            Self::Gauge(_) | Self::GaugeVec(_) => MetricKind::Gauge,
            Self::Histogram(_) | Self::HistogramVec(_) => MetricKind::Histogram,
            Self::Summary(_) | Self::SummaryVec(_) => MetricKind::Summary,
        }
    }

    /// True for the labeled shapes.
    pub fn is_vector(&self) -> bool {
        matches!(
            self,
            Self::CounterVec(_) | Self::GaugeVec(_) | Self::HistogramVec(_) | Self::SummaryVec(_)
        )
    }

    /// Collector to register; shares state with this handle.
    pub fn collector(&self) -> Box<dyn Collector> {
        match self {
            Self::Counter(m) => Box::new(m.clone()),
            Self::CounterVec(m) => Box::new(m.clone()),
            Self::Gauge(m) => Box::new(m.clone()),
            Self::GaugeVec(m) => Box::new(m.clone()),
            Self::Histogram(m) => Box::new(m.clone()),
            Self::HistogramVec(m) => Box::new(m.clone()),
            Self::Summary(m) => Box::new(m.clone()),
            Self::SummaryVec(m) => Box::new(m.clone()),
        }
    }

    /// Make sure the series for `labels` exists, at its zero value.
    pub fn materialize(&self, labels: &[&str]) -> Result<()> {
        match self {
            Self::CounterVec(m) => {
                m.get_metric_with_label_values(labels)?;
            },
            Self::GaugeVec(m) => {
                m.get_metric_with_label_values(labels)?;
            },
            Self::HistogramVec(m) => {
                m.get_metric_with_label_values(labels)?;
            },
            Self::SummaryVec(m) => {
                m.get_metric_with_label_values(labels)?;
            },
            _ => {},
        }
        Ok(())
    }

    /// Apply an update to the series for `labels`.
    pub fn apply(&self, update: Update, labels: &[&str]) -> Result<()> {
        match (self, update) {
            (Self::Counter(m), Update::Increment) => m.inc(),
            (Self::CounterVec(m), Update::Increment) => m.get_metric_with_label_values(labels)?.inc(),
            (Self::Counter(m), Update::Set(v)) => m.set(counter_value(v)?),
            (Self::CounterVec(m), Update::Set(v)) => {
                let value = counter_value(v)?;
                m.get_metric_with_label_values(labels)?.set(value);
            },
            (Self::Gauge(m), Update::Set(v)) => m.set(v),
            (Self::GaugeVec(m), Update::Set(v)) => m.get_metric_with_label_values(labels)?.set(v),
            (Self::Histogram(m), Update::Observe(v)) => m.observe(v),
            (Self::HistogramVec(m), Update::Observe(v)) => {
                m.get_metric_with_label_values(labels)?.observe(v);
            },
            (Self::Summary(m), Update::Observe(v)) => m.observe(v),
            (Self::SummaryVec(m), Update::Observe(v)) => {
                m.get_metric_with_label_values(labels)?.observe(v);
            },
            (handle, update) => {
                return Err(BridgeError::process(format!(
                    "{:?} is not supported by a {}",
                    update,
                    handle.kind().as_str()
                )));
            },
        }
        Ok(())
    }
}

impl fmt::Debug for MetricHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = if self.is_vector() { "vector" } else { "scalar" };
        write!(f, "MetricHandle({} {})", self.kind().as_str(), shape)
    }
}

/// Counters hold whatever the record says; they only refuse what a counter cannot hold.
fn counter_value(value: f64) -> Result<f64> {
    if value.is_nan() || value < 0.0 {
        return Err(BridgeError::process(format!(
            "counter cannot be set to {}",
            value
        )));
    }
    Ok(value)
}

/// Registration rejects empty help strings.
fn help_text(config: &MetricConfig) -> String {
    if config.help.is_empty() {
        config.name.clone()
    } else {
        config.help.clone()
    }
}
