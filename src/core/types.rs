//! Domain types shared by the decoder, the matcher and the rule engine.

use crate::core::{BridgeError, Result};
use bytes::Bytes;
use std::borrow::Cow;
use std::fmt;

/// Label value used when a field reference does not resolve.
pub const ABSENT_LABEL: &str = "<nil>";

/// Prefix that marks a field reference as an envelope attribute.
pub const ENVELOPE_SIGIL: char = '@';

/// Default severity carried by records that don't set one (syslog "debug").
pub const DEFAULT_SEVERITY: i32 = 7;

/// Typed value of a record field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Bytes),
    /// Signed integer
    Integer(i64),
    /// Double precision float
    Double(f64),
    /// Boolean
    Bool(bool),
}

impl FieldValue {
    /// Name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "string",
            FieldValue::Bytes(_) => "bytes",
            FieldValue::Integer(_) => "integer",
            FieldValue::Double(_) => "double",
            FieldValue::Bool(_) => "bool",
        }
    }

    /// Numeric view used for comparisons: integers and doubles only.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Convert to a metric sample value.
    ///
    /// Doubles are used as-is, integers are widened and `true` counts as 1.0.
    /// `false` and every non-numeric type are rejected.
    pub fn to_sample(&self, field: &str) -> Result<f64> {
        match self {
            FieldValue::Bool(true) => Ok(1.0),
            FieldValue::Bool(false) => Err(BridgeError::process(format!(
                "Can't convert false to number for field {}",
                field
            ))),
            other => other.as_f64().ok_or_else(|| BridgeError::InvalidFieldType {
                field: field.to_string(),
                kind: other.kind(),
            }),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => f.write_str(s),
            FieldValue::Bytes(b) => {
                for byte in b.iter() {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            },
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Double(d) => write!(f, "{}", d),
            FieldValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Double(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// Envelope attributes every record carries next to its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeAttr {
    /// Record identifier
    Uuid,
    /// Record type
    Type,
    /// Logical source name
    Logger,
    /// Free-form payload text
    Payload,
    /// Envelope version
    EnvVersion,
    /// Origin host
    Hostname,
    /// Nanoseconds since the UNIX epoch
    Timestamp,
    /// Syslog severity level
    Severity,
    /// Process id of the sender
    Pid,
}

impl EnvelopeAttr {
    /// Lookup by the lowercase name used after the `@` sigil.
    pub fn from_reference(name: &str) -> Option<Self> {
        match name {
            "uuid" => Some(Self::Uuid),
            "type" => Some(Self::Type),
            "logger" => Some(Self::Logger),
            "payload" => Some(Self::Payload),
            "envversion" => Some(Self::EnvVersion),
            "hostname" => Some(Self::Hostname),
            "timestamp" => Some(Self::Timestamp),
            "severity" => Some(Self::Severity),
            "pid" => Some(Self::Pid),
            _ => None,
        }
    }

    /// Lookup by the capitalized header name used in matcher expressions.
    pub fn from_header_name(name: &str) -> Option<Self> {
        match name {
            "Uuid" => Some(Self::Uuid),
            "Type" => Some(Self::Type),
            "Logger" => Some(Self::Logger),
            "Payload" => Some(Self::Payload),
            "EnvVersion" => Some(Self::EnvVersion),
            "Hostname" => Some(Self::Hostname),
            "Timestamp" => Some(Self::Timestamp),
            "Severity" => Some(Self::Severity),
            "Pid" => Some(Self::Pid),
            _ => None,
        }
    }

    /// Capitalized name, as written in matcher expressions.
    pub fn header_name(&self) -> &'static str {
        match self {
            Self::Uuid => "Uuid",
            Self::Type => "Type",
            Self::Logger => "Logger",
            Self::Payload => "Payload",
            Self::EnvVersion => "EnvVersion",
            Self::Hostname => "Hostname",
            Self::Timestamp => "Timestamp",
            Self::Severity => "Severity",
            Self::Pid => "Pid",
        }
    }

    /// Lowercase name, as written after the `@` sigil.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uuid => "uuid",
            Self::Type => "type",
            Self::Logger => "logger",
            Self::Payload => "payload",
            Self::EnvVersion => "envversion",
            Self::Hostname => "hostname",
            Self::Timestamp => "timestamp",
            Self::Severity => "severity",
            Self::Pid => "pid",
        }
    }
}

/// A parsed field reference from the rule configuration.
///
/// `@hostname` style references name an envelope attribute; anything else,
/// including an `@name` that is not a known attribute, names a record field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldRef {
    /// Envelope attribute
    Envelope(EnvelopeAttr),
    /// Dynamic record field
    Field(String),
}

impl FieldRef {
    /// Parse a reference; never fails.
    pub fn parse(reference: &str) -> Self {
        reference
            .strip_prefix(ENVELOPE_SIGIL)
            .and_then(EnvelopeAttr::from_reference)
            .map_or_else(|| FieldRef::Field(reference.to_string()), FieldRef::Envelope)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Envelope(attr) => write!(f, "{}{}", ENVELOPE_SIGIL, attr.as_str()),
            FieldRef::Field(name) => f.write_str(name),
        }
    }
}

/// A decoded record.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Record identifier
    pub uuid: Bytes,
    /// Nanoseconds since the UNIX epoch
    pub timestamp: i64,
    /// Record type
    pub msg_type: String,
    /// Logical source name
    pub logger: String,
    /// Syslog severity, 7 when unset
    pub severity: i32,
    /// Free-form payload text
    pub payload: String,
    /// Envelope version
    pub env_version: String,
    /// Process id of the sender, 0 when unset
    pub pid: i32,
    /// Origin host
    pub hostname: String,
    fields: Vec<(String, FieldValue)>,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            uuid: Bytes::new(),
            timestamp: 0,
            msg_type: String::new(),
            logger: String::new(),
            severity: DEFAULT_SEVERITY,
            payload: String::new(),
            env_version: String::new(),
            pid: 0,
            hostname: String::new(),
            fields: Vec::new(),
        }
    }
}

impl Message {
    /// Empty record with default severity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the origin host.
    pub fn with_hostname<S: Into<String>>(mut self, hostname: S) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the logical source name.
    pub fn with_logger<S: Into<String>>(mut self, logger: S) -> Self {
        self.logger = logger.into();
        self
    }

    /// Set the record type.
    pub fn with_type<S: Into<String>>(mut self, msg_type: S) -> Self {
        self.msg_type = msg_type.into();
        self
    }

    /// Set the payload text.
    pub fn with_payload<S: Into<String>>(mut self, payload: S) -> Self {
        self.payload = payload.into();
        self
    }

    /// Set the severity.
    pub fn with_severity(mut self, severity: i32) -> Self {
        self.severity = severity;
        self
    }

    /// Set the process id.
    pub fn with_pid(mut self, pid: i32) -> Self {
        self.pid = pid;
        self
    }

    /// Set the timestamp in nanoseconds.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the record identifier.
    pub fn with_uuid(mut self, uuid: Bytes) -> Self {
        self.uuid = uuid;
        self
    }

    /// Append a field. Lookups return the first field with a given name.
    pub fn with_field<K: Into<String>, V: Into<FieldValue>>(mut self, name: K, value: V) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub(crate) fn push_field(&mut self, name: String, value: FieldValue) {
        self.fields.push((name, value));
    }

    /// First value stored under `name`.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Every field in arrival order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Value of an envelope attribute.
    pub fn envelope(&self, attr: EnvelopeAttr) -> FieldValue {
        match attr {
            EnvelopeAttr::Uuid => FieldValue::String(self.uuid_string()),
            EnvelopeAttr::Type => FieldValue::String(self.msg_type.clone()),
            EnvelopeAttr::Logger => FieldValue::String(self.logger.clone()),
            EnvelopeAttr::Payload => FieldValue::String(self.payload.clone()),
            EnvelopeAttr::EnvVersion => FieldValue::String(self.env_version.clone()),
            EnvelopeAttr::Hostname => FieldValue::String(self.hostname.clone()),
            EnvelopeAttr::Timestamp => FieldValue::Integer(self.timestamp),
            EnvelopeAttr::Severity => FieldValue::Integer(i64::from(self.severity)),
            EnvelopeAttr::Pid => FieldValue::Integer(i64::from(self.pid)),
        }
    }

    /// Resolve a field reference. Envelope attributes always resolve.
    pub fn resolve(&self, reference: &FieldRef) -> Option<Cow<'_, FieldValue>> {
        match reference {
            FieldRef::Envelope(attr) => Some(Cow::Owned(self.envelope(*attr))),
            FieldRef::Field(name) => self.field(name).map(Cow::Borrowed),
        }
    }

    /// Render a reference as a label value, falling back to [`ABSENT_LABEL`].
    pub fn label_value(&self, reference: &FieldRef) -> String {
        self.resolve(reference)
            .map_or_else(|| ABSENT_LABEL.to_string(), |v| v.to_string())
    }

    /// Resolve a reference to a metric sample; absence is an error.
    pub fn sample(&self, reference: &FieldRef) -> Result<f64> {
        let name = reference.to_string();
        self.resolve(reference)
            .ok_or_else(|| BridgeError::FieldNotFound(name.clone()))?
            .to_sample(&name)
    }

    /// Canonical 8-4-4-4-12 rendering for 16-byte uuids, plain hex otherwise.
    fn uuid_string(&self) -> String {
        let hex = FieldValue::Bytes(self.uuid.clone()).to_string();
        if self.uuid.len() != 16 {
            return hex;
        }
        format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_message() -> Message {
        Message::new()
            .with_hostname("srv001")
            .with_logger("foo")
            .with_severity(3)
            .with_field("status", 500_i64)
            .with_field("float", 1.6)
            .with_field("up", true)
            .with_field("down", false)
            .with_field("method", "GET")
    }

    #[test]
    fn test_field_ref_parsing() {
        assert_eq!(FieldRef::parse("@hostname"), FieldRef::Envelope(EnvelopeAttr::Hostname));
        assert_eq!(FieldRef::parse("@severity"), FieldRef::Envelope(EnvelopeAttr::Severity));
        assert_eq!(FieldRef::parse("status"), FieldRef::Field("status".to_string()));
        // Unknown attribute names fall back to a literal field lookup
        assert_eq!(FieldRef::parse("@bogus"), FieldRef::Field("@bogus".to_string()));
    }

    #[test]
    fn test_resolve_envelope() {
        let msg = test_message();
        assert_eq!(msg.label_value(&FieldRef::parse("@hostname")), "srv001");
        assert_eq!(msg.label_value(&FieldRef::parse("@logger")), "foo");
        assert_eq!(msg.label_value(&FieldRef::parse("@severity")), "3");
    }

    #[test]
    fn test_resolve_fields() {
        let msg = test_message();
        assert_eq!(msg.field("status"), Some(&FieldValue::Integer(500)));
        assert_eq!(msg.field("float"), Some(&FieldValue::Double(1.6)));
        assert_eq!(msg.field("up"), Some(&FieldValue::Bool(true)));
        assert_eq!(msg.label_value(&FieldRef::parse("status")), "500");
        assert_eq!(msg.label_value(&FieldRef::parse("nosuchfield")), ABSENT_LABEL);
    }

    #[test]
    fn test_first_field_wins() {
        let msg = Message::new().with_field("code", 200_i64).with_field("code", 404_i64);
        assert_eq!(msg.field("code"), Some(&FieldValue::Integer(200)));
        assert_eq!(msg.field_count(), 2);
    }

    #[test]
    fn test_sample_conversion() {
        let msg = test_message();
        assert_eq!(msg.sample(&FieldRef::parse("float")).unwrap(), 1.6);
        assert_eq!(msg.sample(&FieldRef::parse("status")).unwrap(), 500.0);
        assert_eq!(msg.sample(&FieldRef::parse("up")).unwrap(), 1.0);
        assert_eq!(msg.sample(&FieldRef::parse("@severity")).unwrap(), 3.0);

        assert!(msg.sample(&FieldRef::parse("down")).is_err());
        assert!(matches!(
            msg.sample(&FieldRef::parse("method")),
            Err(BridgeError::InvalidFieldType { kind: "string", .. })
        ));
        assert!(matches!(
            msg.sample(&FieldRef::parse("missing")),
            Err(BridgeError::FieldNotFound(_))
        ));
    }

    #[test]
    fn test_uuid_rendering() {
        let msg = Message::new().with_uuid(Bytes::from_static(&[
            0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0, 0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc,
            0xde, 0xf0,
        ]));
        assert_eq!(
            msg.label_value(&FieldRef::parse("@uuid")),
            "12345678-9abc-def0-1234-56789abcdef0"
        );
    }
}
