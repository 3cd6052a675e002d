//! Heka stream protocol: framing, wire structs and record codec.

pub mod codec;
pub mod frame;
pub mod wire;

pub use codec::{decode_bytes, decode_frame, decode_payload, encode_frame, encode_payload};
pub use frame::{Frame, FrameReader, FrameSplitter, SplitRecord, HEADER_FRAMING_SIZE};
