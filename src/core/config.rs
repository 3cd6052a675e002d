//! Configuration management for the exporter.
//!
//! A single file holds the metric rules and, optionally, listener and
//! ingestion settings:
//! - JSON (`.json`) or YAML (anything else)
//! - CLI argument overrides through [`ConfigBuilder`]
//! - Validation and defaults

use crate::core::{BridgeError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

/// Largest record payload accepted by default (64 KiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Hard upper bound for `max_message_size`.
const MAX_MESSAGE_SIZE_LIMIT: usize = 64 * 1024 * 1024;

/// Complete exporter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener configuration
    pub server: ServerConfig,
    /// Framing and read settings
    pub ingest: IngestConfig,
    /// Metric rules, evaluated in order for every record
    pub metrics: Vec<MetricConfig>,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// UDP address for framed records
    pub udp_address: Option<SocketAddr>,
    /// TCP address for framed records
    pub tcp_address: Option<SocketAddr>,
    /// Address of the scrape endpoint
    pub http_address: SocketAddr,
}

/// Framing and read settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Largest payload a frame header may declare
    pub max_message_size: usize,
    /// Initial capacity of per-connection read buffers
    pub read_buffer_size: usize,
}

/// Metric kinds a rule can export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Monotonic counter
    Counter,
    /// Value that goes up and down
    Gauge,
    /// Bucketed observations
    Histogram,
    /// Observations with streaming quantiles
    Summary,
}

impl MetricKind {
    /// Name as written in the `type` key
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
        }
    }
}

/// One metric rule as written in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricConfig {
    /// Metric name
    pub name: String,
    /// Metric help text
    #[serde(default)]
    pub help: String,
    /// Metric kind
    #[serde(rename = "type")]
    pub kind: MetricKind,
    /// Field reference providing the sample value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Main matcher expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<String>,
    /// Matcher that decides whether the label combination gets initialized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher_zero: Option<String>,
    /// Exported label name to field reference, in declared order
    #[serde(default)]
    pub labels: IndexMap<String, String>,
    /// Static labels
    #[serde(default)]
    pub const_labels: HashMap<String, String>,
    /// Histogram bucket boundaries
    #[serde(default)]
    pub buckets: Vec<f64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            udp_address: Some(SocketAddr::from(([0, 0, 0, 0], 50569))),
            tcp_address: None,
            http_address: SocketAddr::from(([0, 0, 0, 0], 9137)),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_buffer_size: 64 * 1024,
        }
    }
}

impl MetricConfig {
    /// Create a rule with only the identity set
    pub fn new<S: Into<String>>(name: S, kind: MetricKind) -> Self {
        MetricConfig {
            name: name.into(),
            help: String::new(),
            kind,
            value: None,
            matcher: None,
            matcher_zero: None,
            labels: IndexMap::new(),
            const_labels: HashMap::new(),
            buckets: Vec::new(),
        }
    }

    /// Value field reference, treating an empty string as unset
    pub fn value_field(&self) -> Option<&str> {
        self.value.as_deref().filter(|v| !v.is_empty())
    }

    /// Matcher expression, treating an empty string as unset
    pub fn matcher_expr(&self) -> Option<&str> {
        self.matcher.as_deref().filter(|v| !v.is_empty())
    }

    /// Zero matcher expression, treating an empty string as unset
    pub fn zero_matcher_expr(&self) -> Option<&str> {
        self.matcher_zero.as_deref().filter(|v| !v.is_empty())
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Rule semantics (kinds, matchers, label names) are checked when the
    /// rule engine is built; this only covers structural settings.
    pub fn validate(&self) -> Result<()> {
        if self.server.udp_address.is_none() && self.server.tcp_address.is_none() {
            return Err(BridgeError::config("at least one of UDP or TCP listeners must be set"));
        }

        if self.server.tcp_address == Some(self.server.http_address) {
            return Err(BridgeError::config(format!(
                "TCP and HTTP listeners must use different addresses: both set to {}",
                self.server.http_address
            )));
        }

        if self.ingest.max_message_size == 0 || self.ingest.max_message_size > MAX_MESSAGE_SIZE_LIMIT
        {
            return Err(BridgeError::config(format!(
                "max_message_size must be between 1 and {}, got {}",
                MAX_MESSAGE_SIZE_LIMIT, self.ingest.max_message_size
            )));
        }

        if self.ingest.read_buffer_size == 0 {
            return Err(BridgeError::config("read_buffer_size must be greater than 0"));
        }

        let mut seen = std::collections::HashSet::new();
        for metric in &self.metrics {
            if !seen.insert(metric.name.as_str()) {
                return Err(BridgeError::config(format!(
                    "metric '{}' is defined more than once",
                    metric.name
                )));
            }
        }

        Ok(())
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from a JSON string
    pub fn from_json(mut self, json: &str) -> Result<Self> {
        self.config = serde_json::from_str(json)
            .map_err(|e| BridgeError::config(format!("Failed to parse JSON config: {}", e)))?;
        Ok(self)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| BridgeError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Load configuration from a file, picking the format by extension
    pub async fn from_file(self, path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            BridgeError::config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            self.from_json(&content)
        } else {
            self.from_yaml(&content)
        }
    }

    /// Set UDP listen address
    pub fn udp_address(mut self, addr: Option<SocketAddr>) -> Self {
        self.config.server.udp_address = addr;
        self
    }

    /// Set TCP listen address
    pub fn tcp_address(mut self, addr: Option<SocketAddr>) -> Self {
        self.config.server.tcp_address = addr;
        self
    }

    /// Set scrape endpoint address
    pub fn http_address(mut self, addr: SocketAddr) -> Self {
        self.config.server.http_address = addr;
        self
    }

    /// Set max message size
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.ingest.max_message_size = size;
        self
    }

    /// Append a metric rule
    pub fn metric(mut self, metric: MetricConfig) -> Self {
        self.config.metrics.push(metric);
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
