use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::frame::{body_length, Frame, HEADER_LEN};
use crate::error::NetworkError;

/// Tokio codec for length-prefixed frames.
///
/// The header is validated before any body bytes are buffered, so an
/// oversized length claim is rejected without allocating for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec {
    max_body: Option<usize>,
}

impl FrameCodec {
    /// Codec without a body limit
    pub fn new() -> Self {
        Self { max_body: None }
    }

    /// Codec that rejects bodies larger than `max_body`
    pub fn with_max_body(max_body: usize) -> Self {
        Self {
            max_body: Some(max_body),
        }
    }

    pub fn max_body(&self) -> Option<usize> {
        self.max_body
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = NetworkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let total = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        let body_len = body_length(total, self.max_body)?;

        if src.len() < HEADER_LEN + body_len {
            src.reserve(HEADER_LEN + body_len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let method = src.get_u32();
        let body = src.split_to(body_len).freeze();
        Ok(Some(Frame { method, body }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = NetworkError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_partial_header_waits() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0u8, 0, 0, 9, 0][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_partial_body_waits_then_completes() {
        let mut codec = FrameCodec::new();
        let bytes = Frame::new(42, &b"payload"[..]).to_bytes().unwrap();

        let mut buf = BytesMut::from(&bytes[..10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 10);

        buf.extend_from_slice(&bytes[10..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.method, 42);
        assert_eq!(frame.body, Bytes::from_static(b"payload"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Frame::new(1, &b"a"[..]), &mut buf).unwrap();
        codec.encode(Frame::new(2, &b"bc"[..]), &mut buf).unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!((first.method, &first.body[..]), (1, &b"a"[..]));
        assert_eq!((second.method, &second.body[..]), (2, &b"bc"[..]));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_oversized_header_rejected_before_body_arrives() {
        let mut codec = FrameCodec::with_max_body(16);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&(4u32 + 17).to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());

        assert!(matches!(
            codec.decode(&mut buf),
            Err(NetworkError::OversizedFrame { size: 17, max: 16 })
        ));
    }

    #[test]
    fn test_malformed_length_rejected() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0u8, 0, 0, 2, 0, 0, 0, 1][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(NetworkError::MalformedFrame(2))
        ));
    }
}
