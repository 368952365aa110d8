//! Broker wire protocol.
//!
//! Every message is a 4-byte little-endian length followed by a MessagePack
//! encoded `Envelope`. Frame payloads are themselves MessagePack, opaque to the
//! broker.

use super::TransportError;
use crate::pipeline::frame::Frame;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Largest accepted message body.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Size of the length prefix.
pub const HEADER_SIZE: usize = 4;

/// A broker message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Envelope {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Publish { topic: String, payload: Vec<u8> },
}

impl Envelope {
    pub fn topic(&self) -> &str {
        match self {
            Envelope::Subscribe { topic }
            | Envelope::Unsubscribe { topic }
            | Envelope::Publish { topic, .. } => topic,
        }
    }
}

fn check_size(size: usize) -> Result<(), TransportError> {
    if size > MAX_MESSAGE_SIZE {
        return Err(TransportError::MessageTooLarge {
            size,
            limit: MAX_MESSAGE_SIZE,
        });
    }
    Ok(())
}

/// Encode an envelope with its length prefix.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, TransportError> {
    let body = rmp_serde::to_vec_named(envelope)?;
    check_size(body.len())?;
    let mut message = Vec::with_capacity(HEADER_SIZE + body.len());
    message.extend_from_slice(&(body.len() as u32).to_le_bytes());
    message.extend_from_slice(&body);
    Ok(message)
}

/// Decode a message body (without its length prefix).
pub fn decode(body: &[u8]) -> Result<Envelope, TransportError> {
    Ok(rmp_serde::from_slice(body)?)
}

/// Parse a length prefix, rejecting oversized messages.
pub fn body_len(header: [u8; HEADER_SIZE]) -> Result<usize, TransportError> {
    let len = u32::from_le_bytes(header) as usize;
    check_size(len)?;
    Ok(len)
}

pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, TransportError> {
    Ok(rmp_serde::to_vec_named(frame)?)
}

pub fn decode_frame(payload: &[u8]) -> Result<Frame, TransportError> {
    Ok(rmp_serde::from_slice(payload)?)
}

/// Write one message to a blocking stream.
pub fn write_message<W: Write>(writer: &mut W, envelope: &Envelope) -> Result<(), TransportError> {
    let message = encode(envelope)?;
    writer.write_all(&message)?;
    writer.flush()?;
    Ok(())
}

/// Read one message from a blocking stream.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Envelope, TransportError> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;
    let mut body = vec![0u8; body_len(header)?];
    reader.read_exact(&mut body)?;
    decode(&body)
}

/// Reassembles messages from a byte stream read in arbitrary chunks, so a read
/// timeout in the middle of a message loses nothing.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    buf: Vec<u8>,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes held that do not yet form a complete message.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete message, if one is buffered.
    pub fn next_message(&mut self) -> Result<Option<Envelope>, TransportError> {
        if self.buf.len() < HEADER_SIZE {
            return Ok(None);
        }
        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&self.buf[..HEADER_SIZE]);
        let len = body_len(header)?;
        if self.buf.len() < HEADER_SIZE + len {
            return Ok(None);
        }
        let envelope = decode(&self.buf[HEADER_SIZE..HEADER_SIZE + len]);
        self.buf.drain(..HEADER_SIZE + len);
        envelope.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::frame::FrameBuilder;
    use chrono::{TimeZone, Utc};
    use std::io::Cursor;

    fn sample_frame() -> Frame {
        let mut b = FrameBuilder::new(["Fp1", "Fp2"]).meta("rate", 250);
        for (i, us) in [1_000_000i64, 1_004_000, 1_008_000].into_iter().enumerate() {
            let ts = Utc.timestamp_micros(1_700_000_000_000_000 + us).unwrap();
            b.push_row(ts, vec![i as f64 * 0.5, -(i as f64)]).unwrap();
        }
        b.build()
    }

    #[test]
    fn test_frame_payload_is_lossless() {
        let frame = sample_frame();
        let decoded = decode_frame(&encode_frame(&frame).unwrap()).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.meta()["rate"], serde_json::json!(250));
    }

    #[test]
    fn test_stream_round_trip() {
        let publish = Envelope::Publish {
            topic: "eeg".into(),
            payload: encode_frame(&sample_frame()).unwrap(),
        };
        let mut wire = Vec::new();
        write_message(&mut wire, &Envelope::Subscribe { topic: "eeg".into() }).unwrap();
        write_message(&mut wire, &publish).unwrap();

        let mut cursor = Cursor::new(wire);
        assert_eq!(
            read_message(&mut cursor).unwrap(),
            Envelope::Subscribe { topic: "eeg".into() }
        );
        let received = read_message(&mut cursor).unwrap();
        assert_eq!(received.topic(), "eeg");
        assert_eq!(received, publish);
    }

    #[test]
    fn test_oversized_header_is_rejected() {
        let header = ((MAX_MESSAGE_SIZE + 1) as u32).to_le_bytes();
        assert!(matches!(
            body_len(header),
            Err(TransportError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_message_buffer_handles_partial_reads() {
        let message = encode(&Envelope::Unsubscribe { topic: "x".into() }).unwrap();
        let mut buffer = MessageBuffer::new();

        let (head, tail) = message.split_at(3);
        buffer.extend(head);
        assert!(buffer.next_message().unwrap().is_none());
        buffer.extend(tail);
        buffer.extend(&message);

        assert_eq!(
            buffer.next_message().unwrap(),
            Some(Envelope::Unsubscribe { topic: "x".into() })
        );
        assert!(buffer.next_message().unwrap().is_some());
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_garbage_body_is_a_decode_error() {
        let mut wire = 3u32.to_le_bytes().to_vec();
        wire.extend_from_slice(&[0xc1, 0xc1, 0xc1]);
        let err = read_message(&mut Cursor::new(wire)).unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }
}
