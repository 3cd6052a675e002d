//! heka_exporter - framed Heka records in, Prometheus metrics out.
//!
//! The exporter listens for Heka protobuf records on UDP and/or TCP, runs
//! every configured metric rule against each record and serves the result
//! on a scrape endpoint.
//!
//! # Features
//!
//! - **Heka Framing**: stream resynchronization after corruption or truncation
//! - **Metric Rules**: counters, gauges, histograms and summaries, scalar or labeled
//! - **Matchers**: boolean expressions over envelope attributes and dynamic fields
//! - **Zero Matchers**: pre-register label combinations before traffic arrives
//! - **Self Metrics**: processed records, processing time and stage-tagged errors
//!
//! # Architecture
//!
//! - `protocol`: framing and the record wire format
//! - `matcher`: predicate grammar, parser and evaluator
//! - `rules`: metric rules and the dispatch engine
//! - `metrics`: registry wrapper, summary collector and self metrics
//! - `receiver`: listeners, per-connection loops and the scrape server
//! - `core`: configuration, errors and the decoded record model
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use heka_exporter::core::{ConfigBuilder, MetricConfig, MetricKind};
//! use heka_exporter::receiver::{Bridge, Listeners};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut rule = MetricConfig::new("http_status", MetricKind::Counter);
//!     rule.labels.insert("code".to_string(), "status".to_string());
//!     rule.matcher = Some("status >= 500".to_string());
//!
//!     let config = ConfigBuilder::new().metric(rule).build()?;
//!     let bridge = Bridge::new(&config)?;
//!     Listeners::bind(&config.server).await?.serve(bridge).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod cli;
pub mod core;
pub mod matcher;
pub mod metrics;
pub mod protocol;
pub mod receiver;
pub mod rules;

// Re-export core types for convenience
pub use crate::core::{BridgeError, Config, Message, Result};
pub use crate::receiver::Bridge;
