//! Protobuf messages carried inside frames.
//!
//! Hand-written prost definitions of the Heka `message.proto` schema
//! (proto2), so no build step is needed.

/// Hash function used for signed headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum HmacHashFunction {
    /// HMAC-MD5
    Md5 = 0,
    /// HMAC-SHA1
    Sha1 = 1,
}

/// Frame header; `message_length` delimits the payload that follows.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Header {
    /// Payload length in bytes
    #[prost(uint32, required, tag = "1")]
    pub message_length: u32,
    /// Signing hash function
    #[prost(enumeration = "HmacHashFunction", optional, tag = "3")]
    pub hmac_hash_function: Option<i32>,
    /// Signer name
    #[prost(string, optional, tag = "4")]
    pub hmac_signer: Option<String>,
    /// Signing key version
    #[prost(uint32, optional, tag = "5")]
    pub hmac_key_version: Option<u32>,
    /// Payload signature
    #[prost(bytes = "vec", optional, tag = "6")]
    pub hmac: Option<Vec<u8>>,
}

/// Value type tag of a record field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ValueType {
    /// UTF-8 strings
    String = 0,
    /// Raw bytes
    Bytes = 1,
    /// Signed 64-bit integers
    Integer = 2,
    /// Doubles
    Double = 3,
    /// Booleans
    Bool = 4,
}

/// A named, typed record field. Only the array matching `value_type` is set.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Field {
    /// Field name
    #[prost(string, required, tag = "1")]
    pub name: String,
    /// Which value array is populated
    #[prost(enumeration = "ValueType", optional, tag = "2")]
    pub value_type: Option<i32>,
    /// Unit or format hint
    #[prost(string, optional, tag = "3")]
    pub representation: Option<String>,
    /// String values
    #[prost(string, repeated, tag = "4")]
    pub value_string: Vec<String>,
    /// Byte values
    #[prost(bytes = "vec", repeated, tag = "5")]
    pub value_bytes: Vec<Vec<u8>>,
    /// Integer values
    #[prost(int64, repeated, packed = "true", tag = "6")]
    pub value_integer: Vec<i64>,
    /// Double values
    #[prost(double, repeated, packed = "true", tag = "7")]
    pub value_double: Vec<f64>,
    /// Boolean values
    #[prost(bool, repeated, packed = "true", tag = "8")]
    pub value_bool: Vec<bool>,
}

/// Record payload.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Message {
    /// Record identifier
    #[prost(bytes = "vec", required, tag = "1")]
    pub uuid: Vec<u8>,
    /// Nanoseconds since the UNIX epoch
    #[prost(int64, required, tag = "2")]
    pub timestamp: i64,
    /// Record type
    #[prost(string, optional, tag = "3")]
    pub r#type: Option<String>,
    /// Logical source name
    #[prost(string, optional, tag = "4")]
    pub logger: Option<String>,
    /// Syslog severity
    #[prost(int32, optional, tag = "5", default = "7")]
    pub severity: Option<i32>,
    /// Free-form text
    #[prost(string, optional, tag = "6")]
    pub payload: Option<String>,
    /// Envelope version
    #[prost(string, optional, tag = "7")]
    pub env_version: Option<String>,
    /// Sender process id
    #[prost(int32, optional, tag = "8")]
    pub pid: Option<i32>,
    /// Origin host
    #[prost(string, optional, tag = "9")]
    pub hostname: Option<String>,
    /// Dynamic fields
    #[prost(message, repeated, tag = "10")]
    pub fields: Vec<Field>,
}
