use thiserror::Error;

/// Errors raised while loading rules or handling records
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Invalid configuration or rule definition
    #[error("Configuration error: {0}")]
    Config(String),

    /// Matcher expression that failed to compile
    #[error("Matcher error: {0}")]
    Matcher(String),

    /// Broken framing
    #[error("Framing error: {0}")]
    Protocol(String),

    /// Record payload that could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Value field missing from the record
    #[error("Couldn't find field {0}")]
    FieldNotFound(String),

    /// Value field with a non-numeric type
    #[error("Invalid type {kind} for field {field}")]
    InvalidFieldType {
        /// Field name
        field: String,
        /// Type found instead
        kind: &'static str,
    },

    /// Rule failure while processing a record
    #[error("Processing error: {0}")]
    Process(String),

    /// Listener bind or serve failure
    #[error("Network error: {0}")]
    Network(String),

    /// I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization failure
    #[error("Serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Protobuf decode failure
    #[error("Protobuf error: {0}")]
    Protobuf(#[from] prost::DecodeError),

    /// Metric registration or lookup failure
    #[error("Metrics registry error: {0}")]
    Registry(#[from] prometheus::Error),

    /// Listener task that panicked or was cancelled
    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new matcher compilation error
    pub fn matcher<S: Into<String>>(msg: S) -> Self {
        Self::Matcher(msg.into())
    }

    /// Creates a new framing error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    /// Creates a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Creates a new processing error
    pub fn process<S: Into<String>>(msg: S) -> Self {
        Self::Process(msg.into())
    }

    /// Creates a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Returns true if the ingestion loop may keep going after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Protocol(_) | Self::Decode(_) | Self::Protobuf(_) => true,
            Self::FieldNotFound(_) | Self::InvalidFieldType { .. } | Self::Process(_) => true,
            _ => false,
        }
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::Json(_) | Self::Yaml(_) => "config",
            Self::Matcher(_) => "matcher",
            Self::Protocol(_) => "frame",
            Self::Decode(_) | Self::Protobuf(_) => "unmarshal",
            Self::FieldNotFound(_) | Self::InvalidFieldType { .. } | Self::Process(_) => {
                "process"
            },
            Self::Registry(_) => "registry",
            Self::Network(_) => "network",
            Self::Io(_) => "io",
            Self::Join(_) => "async",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = BridgeError::config("missing value field");
        assert_eq!(err.to_string(), "Configuration error: missing value field");
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_error_recoverability() {
        assert!(BridgeError::decode("bad varint").is_recoverable());
        assert!(BridgeError::FieldNotFound("status".into()).is_recoverable());
        assert!(!BridgeError::config("invalid config").is_recoverable());
        assert!(!BridgeError::network("bind failed").is_recoverable());
    }

    #[test]
    fn test_field_type_error() {
        let err = BridgeError::InvalidFieldType {
            field: "up".to_string(),
            kind: "string",
        };
        assert_eq!(err.to_string(), "Invalid type string for field up");
        assert_eq!(err.category(), "process");
    }
}
