//! Counters that can also be set.
//!
//! A counter rule with a value field replaces the series value with the
//! number carried by the record. `prometheus::Counter` only exposes reset
//! and increment, so a set would be two steps and a scrape in between would
//! read 0. [`ValueCounter`] and [`ValueCounterVec`] store into a single
//! [`AtomicF64`] instead and still report as `counter`.

use dashmap::DashMap;
use prometheus::core::{Atomic, AtomicF64, Collector, Desc};
use prometheus::proto::{self, LabelPair, MetricFamily, MetricType};
use prometheus::Opts;
use std::sync::Arc;

/// One counter series. Cloning shares the underlying value.
#[derive(Clone)]
pub struct CounterChild {
    value: Arc<AtomicF64>,
}

impl CounterChild {
    fn new() -> Self {
        Self {
            value: Arc::new(AtomicF64::new(0.0)),
        }
    }

    /// Add one.
    pub fn inc(&self) {
        self.value.inc_by(1.0);
    }

    /// Replace the value in a single store.
    pub fn set(&self, value: f64) {
        self.value.set(value);
    }

    /// Current value.
    pub fn get(&self) -> f64 {
        self.value.get()
    }

    fn metric(&self, mut labels: Vec<LabelPair>) -> proto::Metric {
        let mut counter = proto::Counter::default();
        counter.set_value(self.get());

        labels.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        let mut metric = proto::Metric::default();
        metric.set_label(labels.into());
        metric.set_counter(counter);
        metric
    }
}

fn describe(opts: &Opts, label_names: &[&str]) -> prometheus::Result<Desc> {
    Desc::new(
        opts.fq_name(),
        opts.help.clone(),
        label_names.iter().map(|l| (*l).to_string()).collect(),
        opts.const_labels.clone(),
    )
}

fn family(desc: &Desc, metrics: Vec<proto::Metric>) -> MetricFamily {
    let mut family = MetricFamily::default();
    family.set_name(desc.fq_name.clone());
    family.set_help(desc.help.clone());
    family.set_field_type(MetricType::COUNTER);
    family.set_metric(metrics.into());
    family
}

/// A settable counter without variable labels
#[derive(Clone)]
pub struct ValueCounter {
    desc: Desc,
    child: CounterChild,
}

impl ValueCounter {
    /// Build from the usual `prometheus` options.
    pub fn with_opts(opts: Opts) -> prometheus::Result<Self> {
        Ok(Self {
            desc: describe(&opts, &[])?,
            child: CounterChild::new(),
        })
    }

    /// Add one.
    pub fn inc(&self) {
        self.child.inc();
    }

    /// Replace the value.
    pub fn set(&self, value: f64) {
        self.child.set(value);
    }

    /// Current value.
    pub fn get(&self) -> f64 {
        self.child.get()
    }
}

impl Collector for ValueCounter {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let metric = self.child.metric(self.desc.const_label_pairs.clone());
        vec![family(&self.desc, vec![metric])]
    }
}

/// A settable counter partitioned by variable labels
#[derive(Clone)]
pub struct ValueCounterVec {
    desc: Desc,
    children: Arc<DashMap<Vec<String>, CounterChild>>,
}

impl ValueCounterVec {
    /// Build from the usual `prometheus` options and the label schema.
    pub fn new(opts: Opts, label_names: &[&str]) -> prometheus::Result<Self> {
        Ok(Self {
            desc: describe(&opts, label_names)?,
            children: Arc::new(DashMap::new()),
        })
    }

    /// Series for the given label values, created at 0 on first use.
    pub fn get_metric_with_label_values(&self, values: &[&str]) -> prometheus::Result<CounterChild> {
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
        Ok(self
            .children
            .entry(key)
            .or_insert_with(CounterChild::new)
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

impl Collector for ValueCounterVec {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        if self.children.is_empty() {
            return Vec::new();
        }

        let mut series: Vec<(Vec<String>, CounterChild)> = self
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
                child.metric(labels)
            })
            .collect();

        vec![family(&self.desc, metrics)]
    }
}
