//! Core domain models for the exporter.
//!
//! This module contains the record model, the configuration model and the
//! error taxonomy shared by every other module.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder, IngestConfig, MetricConfig, MetricKind, ServerConfig};
pub use error::{BridgeError, Result};
pub use types::{EnvelopeAttr, FieldRef, FieldValue, Message, ABSENT_LABEL};
