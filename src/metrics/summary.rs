//! Quantile summaries for the `prometheus` registry.
//!
//! The `prometheus` crate has no summary type, so [`Summary`] and
//! [`SummaryVec`] implement [`Collector`] on top of CKMS streaming quantiles.
//! Summaries are cumulative: quantiles cover every observation since start.

use dashmap::DashMap;
use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::{self, LabelPair, MetricFamily, MetricType};
use quantiles::ckms::CKMS;
use std::collections::HashMap;
use std::sync::Arc;

/// Quantiles reported by default.
pub const DEFAULT_OBJECTIVES: [f64; 3] = [0.5, 0.9, 0.99];

/// Rank error allowed by the estimator.
pub const DEFAULT_ERROR: f64 = 0.001;

const QUANTILE_LABEL: &str = "quantile";

/// Options for building a summary
#[derive(Debug, Clone)]
pub struct SummaryOpts {
    /// Metric name
    pub name: String,
    /// Help text
    pub help: String,
    /// Static labels
    pub const_labels: HashMap<String, String>,
    /// Quantiles to report
    pub objectives: Vec<f64>,
    /// Allowed rank error
    pub error: f64,
}

impl SummaryOpts {
    /// Options with the default objectives.
    pub fn new<S1: Into<String>, S2: Into<String>>(name: S1, help: S2) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            const_labels: HashMap::new(),
            objectives: DEFAULT_OBJECTIVES.to_vec(),
            error: DEFAULT_ERROR,
        }
    }

    /// Set the static labels.
    pub fn const_labels(mut self, const_labels: HashMap<String, String>) -> Self {
        self.const_labels = const_labels;
        self
    }

    /// Set the reported quantiles.
    pub fn objectives(mut self, objectives: Vec<f64>) -> Self {
        self.objectives = objectives;
        self
    }

    fn desc(&self, label_names: &[&str]) -> prometheus::Result<Desc> {
        if self.objectives.iter().any(|q| !(0.0..=1.0).contains(q)) {
            return Err(prometheus::Error::Msg(format!(
                "summary {} has an objective outside [0, 1]",
                self.name
            )));
        }
        let reserved = label_names.iter().any(|l| *l == QUANTILE_LABEL)
            || self.const_labels.contains_key(QUANTILE_LABEL);
        if reserved {
            return Err(prometheus::Error::Msg(format!(
                "summary {} cannot use the reserved label {}",
                self.name, QUANTILE_LABEL
            )));
        }
        Desc::new(
            self.name.clone(),
            self.help.clone(),
            label_names.iter().map(|l| (*l).to_string()).collect(),
            self.const_labels.clone(),
        )
    }
}

struct SummaryCore {
    stream: CKMS<f64>,
    count: u64,
    sum: f64,
}

/// One summary series. Cloning shares the underlying state.
#[derive(Clone)]
pub struct SummaryChild {
    core: Arc<Mutex<SummaryCore>>,
}

impl SummaryChild {
    fn new(error: f64) -> Self {
        Self {
            core: Arc::new(Mutex::new(SummaryCore {
                stream: CKMS::new(error),
                count: 0,
                sum: 0.0,
            })),
        }
    }

    /// Record one observation.
    pub fn observe(&self, value: f64) {
        let mut core = self.core.lock();
        core.stream.insert(value);
        core.count += 1;
        core.sum += value;
    }

    /// Observations so far.
    pub fn sample_count(&self) -> u64 {
        self.core.lock().count
    }

    /// Sum of observations so far.
    pub fn sample_sum(&self) -> f64 {
        self.core.lock().sum
    }

    fn metric(&self, objectives: &[f64], mut labels: Vec<LabelPair>) -> proto::Metric {
        let core = self.core.lock();

        let quantiles: Vec<proto::Quantile> = objectives
            .iter()
            .map(|&q| {
                let mut quantile = proto::Quantile::default();
                quantile.set_quantile(q);
                quantile.set_value(core.stream.query(q).map_or(f64::NAN, |(_, v)| v));
                quantile
            })
            .collect();

        let mut summary = proto::Summary::default();
        summary.set_sample_count(core.count);
        summary.set_sample_sum(core.sum);
        summary.set_quantile(quantiles.into());

        labels.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        let mut metric = proto::Metric::default();
        metric.set_label(labels.into());
        metric.set_summary(summary);
        metric
    }
}

fn family(desc: &Desc, metrics: Vec<proto::Metric>) -> MetricFamily {
    let mut family = MetricFamily::default();
    family.set_name(desc.fq_name.clone());
    family.set_help(desc.help.clone());
    family.set_field_type(MetricType::SUMMARY);
    family.set_metric(metrics.into());
    family
}

/// A summary without variable labels
#[derive(Clone)]
pub struct Summary {
    desc: Desc,
    objectives: Arc<[f64]>,
    child: SummaryChild,
}

impl Summary {
    /// Build a scalar summary.
    pub fn with_opts(opts: SummaryOpts) -> prometheus::Result<Self> {
        let desc = opts.desc(&[])?;
        Ok(Self {
            desc,
            objectives: opts.objectives.into(),
            child: SummaryChild::new(opts.error),
        })
    }

    /// Record one observation.
    pub fn observe(&self, value: f64) {
        self.child.observe(value);
    }

    /// Observations so far.
    pub fn sample_count(&self) -> u64 {
        self.child.sample_count()
    }
}

impl Collector for Summary {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let metric = self
            .child
            .metric(&self.objectives, self.desc.const_label_pairs.clone());
        vec![family(&self.desc, vec![metric])]
    }
}

/// A summary partitioned by variable labels
#[derive(Clone)]
pub struct SummaryVec {
    desc: Desc,
    objectives: Arc<[f64]>,
    error: f64,
    children: Arc<DashMap<Vec<String>, SummaryChild>>,
}

impl SummaryVec {
    /// Build a labeled summary.
    pub fn new(opts: SummaryOpts, label_names: &[&str]) -> prometheus::Result<Self> {
        let desc = opts.desc(label_names)?;
        Ok(Self {
            desc,
            objectives: opts.objectives.into(),
            error: opts.error,
            children: Arc::new(DashMap::new()),
        })
    }

    /// Series for the given label values, created on first use.
    pub fn get_metric_with_label_values(&self, values: &[&str]) -> prometheus::Result<SummaryChild> {
        let expected = self.desc.variable_labels.len();
        if values.len() != expected {
            return Err(prometheus::Error::InconsistentCardinality {
                expect: expected,
                got: values.len(),
            });
        }

        let key: Vec<String> = values.iter().map(|v| (*v).to_string()).collect();
        if let Some(child) = self.children.get(&key) {
            return Ok(child.value().clone());
        }
        let error = self.error;
        Ok(self
            .children
            .entry(key)
            .or_insert_with(|| SummaryChild::new(error))
            .value()
            .clone())
    }

    /// Number of series.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// True until the first series is created.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Collector for SummaryVec {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        if self.children.is_empty() {
            return Vec::new();
        }

        let mut series: Vec<(Vec<String>, SummaryChild)> = self
            .children
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        series.sort_by(|a, b| a.0.cmp(&b.0));

        let metrics = series
            .into_iter()
            .map(|(values, child)| {
                let mut labels = self.desc.const_label_pairs.clone();
                for (name, value) in self.desc.variable_labels.iter().zip(values) {
                    let mut pair = LabelPair::default();
                    pair.set_name(name.clone());
                    pair.set_value(value);
                    labels.push(pair);
                }
                child.metric(&self.objectives, labels)
            })
            .collect();

        vec![family(&self.desc, metrics)]
    }
}
