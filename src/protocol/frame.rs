//! Record framing.
//!
//! ```text
//! +------+-----+-------------+------+-----------------------+
//! | 0x1E |  h  | header (h)  | 0x1F | payload (msg length)  |
//! +------+-----+-------------+------+-----------------------+
//! ```
//!
//! The header is a protobuf [`Header`] whose `message_length` delimits the
//! payload. [`FrameSplitter`] recovers frames from whatever bytes a transport
//! delivers and reports how many bytes it consumed for each, so callers can
//! tell clean frames from resynchronization after garbage.

use super::wire::Header;
use bytes::{Buf, Bytes, BytesMut};
use prost::Message as _;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Marks the start of a frame.
pub const RECORD_SEPARATOR: u8 = 0x1E;

/// Terminates the header region.
pub const UNIT_SEPARATOR: u8 = 0x1F;

/// Bytes of framing around the header: record separator, length, unit separator.
pub const HEADER_FRAMING_SIZE: usize = 3;

/// Largest header a single length byte can describe.
pub const MAX_HEADER_SIZE: usize = 255;

/// One complete frame, header and payload included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    fn new(bytes: Bytes) -> Self {
        debug_assert!(bytes.len() >= HEADER_FRAMING_SIZE);
        Self { bytes }
    }

    /// Total framed length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Never true for a split frame.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Length of the header region, read from the second byte.
    pub fn header_len(&self) -> usize {
        usize::from(self.bytes[1])
    }

    /// Raw header bytes, without the framing bytes around them.
    pub fn header(&self) -> &[u8] {
        &self.bytes[2..2 + self.header_len()]
    }

    /// Raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[self.header_len() + HEADER_FRAMING_SIZE..]
    }

    /// The whole frame, separators included.
    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }
}

/// Result of one successful split.
///
/// `consumed` counts every byte the splitter advanced over to produce this
/// record. When it differs from the recovered frame's length, bytes were
/// thrown away to resynchronize and the record is corrupt. A record without a
/// frame describes bytes that never formed a complete frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitRecord {
    /// Bytes taken off the input for this record
    pub consumed: usize,
    /// Recovered frame, if any
    pub frame: Option<Frame>,
}

impl SplitRecord {
    /// Bytes were skipped to produce this record.
    pub fn is_corrupt(&self) -> bool {
        self.frame.as_ref().map_or(true, |f| f.len() != self.consumed)
    }

    /// Bytes dropped on the way to this record.
    pub fn discarded(&self) -> usize {
        self.consumed - self.frame.as_ref().map_or(0, Frame::len)
    }

    /// The frame, only when it was recovered without loss.
    pub fn into_clean_frame(self) -> Option<Frame> {
        if self.is_corrupt() {
            None
        } else {
            self.frame
        }
    }
}

/// Incremental frame scanner over a growable buffer.
///
/// Works the same for stream transports (feed every read) and datagram
/// transports (feed each packet, then call [`FrameSplitter::finish`]).
#[derive(Debug, Clone)]
pub struct FrameSplitter {
    max_message_size: usize,
    skipped: usize,
}

impl FrameSplitter {
    /// Splitter rejecting payloads over `max_message_size`.
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            skipped: 0,
        }
    }

    /// Largest payload accepted.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Take the next frame from the front of `buf`.
    ///
    /// Returns `None` when more bytes are needed. Garbage and invalid headers
    /// are skipped one separator at a time and accounted in the `consumed`
    /// count of the next record.
    pub fn split(&mut self, buf: &mut BytesMut) -> Option<SplitRecord> {
        loop {
            let Some(start) = buf.iter().position(|&b| b == RECORD_SEPARATOR) else {
                let remaining = buf.len();
                self.skip(buf, remaining);
                return None;
            };
            self.skip(buf, start);

            if buf.len() < HEADER_FRAMING_SIZE {
                return None;
            }

            let header_end = usize::from(buf[1]) + HEADER_FRAMING_SIZE;
            if buf.len() < header_end {
                return None;
            }

            if buf[header_end - 1] != UNIT_SEPARATOR {
                self.skip(buf, 1);
                continue;
            }

            let message_length = match Header::decode(&buf[2..header_end - 1]) {
                Ok(header) => header.message_length as usize,
                Err(e) => {
                    tracing::trace!("Invalid frame header: {}", e);
                    self.skip(buf, 1);
                    continue;
                },
            };

            if message_length > self.max_message_size {
                tracing::trace!(
                    "Frame declares {} bytes, limit is {}",
                    message_length,
                    self.max_message_size
                );
                self.skip(buf, 1);
                continue;
            }

            let frame_end = header_end + message_length;
            if buf.len() < frame_end {
                return None;
            }

            let frame = Frame::new(buf.split_to(frame_end).freeze());
            let consumed = std::mem::take(&mut self.skipped) + frame.len();
            return Some(SplitRecord {
                consumed,
                frame: Some(frame),
            });
        }
    }

    /// Flush whatever is left once no more bytes will arrive for `buf`.
    ///
    /// Leftover bytes are a truncated frame or trailing garbage; they are
    /// dropped and reported as a frameless record.
    pub fn finish(&mut self, buf: &mut BytesMut) -> Option<SplitRecord> {
        let remaining = buf.len();
        self.skip(buf, remaining);
        let consumed = std::mem::take(&mut self.skipped);
        (consumed > 0).then_some(SplitRecord {
            consumed,
            frame: None,
        })
    }

    fn skip(&mut self, buf: &mut BytesMut, count: usize) {
        buf.advance(count);
        self.skipped += count;
    }
}

/// Reads records from a byte stream such as a TCP connection.
pub struct FrameReader<R> {
    source: R,
    buf: BytesMut,
    splitter: FrameSplitter,
    read_size: usize,
    eof: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Reader over `source`, reading `read_size` bytes at a time.
    pub fn new(source: R, max_message_size: usize, read_size: usize) -> Self {
        Self {
            source,
            buf: BytesMut::with_capacity(read_size),
            splitter: FrameSplitter::new(max_message_size),
            read_size: read_size.max(1),
            eof: false,
        }
    }

    /// Next record, or `Ok(None)` at end of stream.
    ///
    /// A single read may yield several frames and a frame may span several
    /// reads. I/O errors are returned as-is and end the stream for the caller.
    pub async fn next_record(&mut self) -> std::io::Result<Option<SplitRecord>> {
        loop {
            if let Some(record) = self.splitter.split(&mut self.buf) {
                return Ok(Some(record));
            }

            if self.eof {
                return Ok(self.splitter.finish(&mut self.buf));
            }

            self.buf.reserve(self.read_size);
            if self.source.read_buf(&mut self.buf).await? == 0 {
                self.eof = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Message;
    use crate::protocol::codec::encode_frame;

    fn frame_bytes(logger: &str) -> Bytes {
        encode_frame(&Message::new().with_logger(logger).with_field("n", 1_i64))
    }

    #[test]
    fn test_split_single_frame() {
        let bytes = frame_bytes("a");
        let mut buf = BytesMut::from(&bytes[..]);
        let mut splitter = FrameSplitter::new(1024);

        let record = splitter.split(&mut buf).expect("frame");
        assert!(!record.is_corrupt());
        assert_eq!(record.consumed, bytes.len());
        assert_eq!(record.frame.unwrap().as_bytes(), &bytes);
        assert!(buf.is_empty());
        assert!(splitter.finish(&mut buf).is_none());
    }

    #[test]
    fn test_split_multiple_frames_one_buffer() {
        let mut buf = BytesMut::new();
        for name in ["a", "b", "c"] {
            buf.extend_from_slice(&frame_bytes(name));
        }

        let mut splitter = FrameSplitter::new(1024);
        let mut count = 0;
        while let Some(record) = splitter.split(&mut buf) {
            assert!(!record.is_corrupt());
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn test_split_across_reads() {
        let bytes = frame_bytes("partial");
        let mut splitter = FrameSplitter::new(1024);
        let mut buf = BytesMut::new();

        for (i, byte) in bytes.iter().enumerate() {
            buf.extend_from_slice(&[*byte]);
            let record = splitter.split(&mut buf);
            if i + 1 < bytes.len() {
                assert!(record.is_none());
            } else {
                assert!(!record.unwrap().is_corrupt());
            }
        }
    }

    #[test]
    fn test_garbage_before_frame_is_corruption() {
        let bytes = frame_bytes("a");
        let mut buf = BytesMut::from(&b"junk"[..]);
        buf.extend_from_slice(&bytes);

        let mut splitter = FrameSplitter::new(1024);
        let record = splitter.split(&mut buf).unwrap();
        assert!(record.is_corrupt());
        assert_eq!(record.discarded(), 4);
        assert!(record.into_clean_frame().is_none());
    }

    #[test]
    fn test_bad_unit_separator_resynchronizes() {
        let good = frame_bytes("good");
        // Separator followed by a header length that points at a non-0x1F byte
        let mut buf = BytesMut::from(&[RECORD_SEPARATOR, 2, 0, 0, 0xFF][..]);
        buf.extend_from_slice(&good);

        let mut splitter = FrameSplitter::new(1024);
        let record = splitter.split(&mut buf).unwrap();
        assert!(record.is_corrupt());
        assert_eq!(record.frame.unwrap().as_bytes(), &good);

        let mut buf = BytesMut::from(&good[..]);
        assert!(!splitter.split(&mut buf).unwrap().is_corrupt());
    }

    #[test]
    fn test_oversized_frame_is_skipped() {
        let big = encode_frame(&Message::new().with_payload("x".repeat(200)));
        let small = frame_bytes("s");
        let mut buf = BytesMut::from(&big[..]);
        buf.extend_from_slice(&small);

        let mut splitter = FrameSplitter::new(64);
        let record = splitter.split(&mut buf).unwrap();
        assert!(record.is_corrupt());
        assert_eq!(record.discarded(), big.len());
        assert_eq!(record.frame.unwrap().as_bytes(), &small);
    }

    #[test]
    fn test_truncated_datagram() {
        let bytes = frame_bytes("cut");
        let mut buf = BytesMut::from(&bytes[..bytes.len() - 2]);
        let mut splitter = FrameSplitter::new(1024);

        assert!(splitter.split(&mut buf).is_none());
        let record = splitter.finish(&mut buf).unwrap();
        assert!(record.is_corrupt());
        assert!(record.frame.is_none());
        assert_eq!(record.consumed, bytes.len() - 2);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_frame_accessors() {
        let bytes = frame_bytes("acc");
        let mut buf = BytesMut::from(&bytes[..]);
        let frame = FrameSplitter::new(1024).split(&mut buf).unwrap().frame.unwrap();

        let header = Header::decode(frame.header()).unwrap();
        assert_eq!(header.message_length as usize, frame.payload().len());
        assert_eq!(frame.len(), frame.header_len() + HEADER_FRAMING_SIZE + frame.payload().len());
    }

    #[tokio::test]
    async fn test_reader_over_stream() {
        let mut data = Vec::new();
        data.extend_from_slice(&frame_bytes("one"));
        data.extend_from_slice(b"\x00\x01noise");
        data.extend_from_slice(&frame_bytes("two"));
        data.extend_from_slice(&frame_bytes("three")[..5]);

        // Small reads make frames span several reads
        let mut reader = FrameReader::new(&data[..], 1024, 3);

        let first = reader.next_record().await.unwrap().unwrap();
        assert!(!first.is_corrupt());

        let second = reader.next_record().await.unwrap().unwrap();
        assert!(second.is_corrupt());
        assert_eq!(second.discarded(), 7);

        let tail = reader.next_record().await.unwrap().unwrap();
        assert!(tail.frame.is_none());
        assert_eq!(tail.consumed, 5);

        assert!(reader.next_record().await.unwrap().is_none());
    }
}
