//! Conversion between frames and [`Message`]s.

use super::frame::{Frame, HEADER_FRAMING_SIZE, MAX_HEADER_SIZE, RECORD_SEPARATOR, UNIT_SEPARATOR};
use super::wire;
use crate::core::{BridgeError, FieldValue, Message, Result};
use bytes::{BufMut, Bytes, BytesMut};
use prost::Message as _;

/// Decode a frame's payload into a [`Message`].
///
/// Fields keep their wire order. Only the first value of array fields is
/// kept, and fields with no value or an unknown type are dropped.
pub fn decode_frame(frame: &Frame) -> Result<Message> {
    decode_payload(frame.payload())
}

/// Decode a raw payload into a [`Message`].
pub fn decode_payload(payload: &[u8]) -> Result<Message> {
    let wire = wire::Message::decode(payload)?;

    let mut message = Message::new()
        .with_uuid(Bytes::from(wire.uuid))
        .with_timestamp(wire.timestamp)
        .with_type(wire.r#type.unwrap_or_default())
        .with_logger(wire.logger.unwrap_or_default())
        .with_payload(wire.payload.unwrap_or_default())
        .with_hostname(wire.hostname.unwrap_or_default())
        .with_pid(wire.pid.unwrap_or_default());
    if let Some(severity) = wire.severity {
        message = message.with_severity(severity);
    }
    message.env_version = wire.env_version.unwrap_or_default();

    for field in wire.fields {
        let name = field.name.clone();
        match field_value(field) {
            Some(value) => message.push_field(name, value),
            None => tracing::trace!("Dropping field {} without a usable value", name),
        }
    }

    Ok(message)
}

fn field_value(field: wire::Field) -> Option<FieldValue> {
    let value_type = wire::ValueType::try_from(field.value_type.unwrap_or_default()).ok()?;
    match value_type {
        wire::ValueType::String => field.value_string.into_iter().next().map(FieldValue::String),
        wire::ValueType::Bytes => field
            .value_bytes
            .into_iter()
            .next()
            .map(|b| FieldValue::Bytes(Bytes::from(b))),
        wire::ValueType::Integer => field.value_integer.first().copied().map(FieldValue::Integer),
        wire::ValueType::Double => field.value_double.first().copied().map(FieldValue::Double),
        wire::ValueType::Bool => field.value_bool.first().copied().map(FieldValue::Bool),
    }
}

/// Encode a [`Message`] as a protobuf payload.
pub fn encode_payload(message: &Message) -> Vec<u8> {
    let fields = message
        .fields()
        .map(|(name, value)| {
            let mut field = wire::Field {
                name: name.to_string(),
                ..Default::default()
            };
            let value_type = match value {
                FieldValue::String(s) => {
                    field.value_string.push(s.clone());
                    wire::ValueType::String
                },
                FieldValue::Bytes(b) => {
                    field.value_bytes.push(b.to_vec());
                    wire::ValueType::Bytes
                },
                FieldValue::Integer(i) => {
                    field.value_integer.push(*i);
                    wire::ValueType::Integer
                },
                FieldValue::Double(d) => {
                    field.value_double.push(*d);
                    wire::ValueType::Double
                },
                FieldValue::Bool(b) => {
                    field.value_bool.push(*b);
                    wire::ValueType::Bool
                },
            };
            field.value_type = Some(value_type as i32);
            field
        })
        .collect();

    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
    wire::Message {
        uuid: message.uuid.to_vec(),
        timestamp: message.timestamp,
        r#type: non_empty(&message.msg_type),
        logger: non_empty(&message.logger),
        severity: Some(message.severity),
        payload: non_empty(&message.payload),
        env_version: non_empty(&message.env_version),
        pid: (message.pid != 0).then_some(message.pid),
        hostname: non_empty(&message.hostname),
        fields,
    }
    .encode_to_vec()
}

/// Encode a [`Message`] as a complete frame.
pub fn encode_frame(message: &Message) -> Bytes {
    let payload = encode_payload(message);
    let header = wire::Header {
        message_length: u32::try_from(payload.len()).unwrap_or(u32::MAX),
        ..Default::default()
    }
    .encode_to_vec();
    debug_assert!(header.len() <= MAX_HEADER_SIZE);

    let mut buf = BytesMut::with_capacity(header.len() + HEADER_FRAMING_SIZE + payload.len());
    buf.put_u8(RECORD_SEPARATOR);
    buf.put_u8(header.len() as u8);
    buf.put_slice(&header);
    buf.put_u8(UNIT_SEPARATOR);
    buf.put_slice(&payload);
    buf.freeze()
}

/// Validate that a byte slice holds exactly one frame and decode it.
pub fn decode_bytes(bytes: &[u8]) -> Result<Message> {
    let mut buf = BytesMut::from(bytes);
    let mut splitter = super::FrameSplitter::new(bytes.len());
    let frame = splitter
        .split(&mut buf)
        .and_then(super::SplitRecord::into_clean_frame)
        .ok_or_else(|| BridgeError::protocol("buffer does not hold a complete frame"))?;
    if !buf.is_empty() {
        return Err(BridgeError::protocol(format!(
            "{} trailing bytes after frame",
            buf.len()
        )));
    }
    decode_frame(&frame)
}
