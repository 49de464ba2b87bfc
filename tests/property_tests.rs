//! Property-based tests using proptest
//!
//! These tests validate framing and buffer invariants across a wide range of
//! randomly generated inputs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::BytesMut;
use network_session::core::buffer::ByteBuffer;
use network_session::core::codec::FrameCodec;
use network_session::core::frame::{Frame, HEADER_LEN};
use network_session::error::NetworkError;
use proptest::prelude::*;
use tokio_util::codec::Decoder;

// Property: the length header always equals 4 + body length
proptest! {
    #[test]
    fn prop_total_length_header(method in any::<u32>(), body in prop::collection::vec(any::<u8>(), 0..4096)) {
        let bytes = Frame::new(method, body.clone()).to_bytes().unwrap();

        let total = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        prop_assert_eq!(total, 4 + body.len());
        prop_assert_eq!(bytes.len(), HEADER_LEN + body.len());
        prop_assert_eq!(&bytes[4..8], &method.to_be_bytes()[..]);
    }
}

// Property: a stream of frames decodes identically however the bytes are chunked
proptest! {
    #[test]
    fn prop_decode_independent_of_chunking(
        frames in prop::collection::vec(
            (any::<u32>(), prop::collection::vec(any::<u8>(), 0..300)),
            1..8,
        ),
        chunk in 1usize..64,
    ) {
        let mut wire = Vec::new();
        for (method, body) in &frames {
            wire.extend_from_slice(&Frame::new(*method, body.clone()).to_bytes().unwrap());
        }

        let mut codec = FrameCodec::with_max_body(300);
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        for piece in wire.chunks(chunk) {
            buf.extend_from_slice(piece);
            while let Some(frame) = codec.decode(&mut buf).unwrap() {
                decoded.push((frame.method, frame.body.to_vec()));
            }
        }

        prop_assert_eq!(decoded, frames);
        prop_assert!(buf.is_empty());
    }
}

// Property: a header claiming more than the limit is rejected before its body arrives
proptest! {
    #[test]
    fn prop_oversized_header_rejected(max in 0usize..10_000, excess in 1u32..100_000) {
        let total = 4 + max as u32 + excess;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&total.to_be_bytes());
        buf.extend_from_slice(&7u32.to_be_bytes());

        let mut codec = FrameCodec::with_max_body(max);
        let is_oversized = matches!(
            codec.decode(&mut buf),
            Err(NetworkError::OversizedFrame { .. })
        );
        prop_assert!(is_oversized);
    }
}

// Property: arbitrary input never panics the frame parser
proptest! {
    #[test]
    fn prop_from_bytes_never_panics(data in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = Frame::from_bytes_with_limit(&data, Some(32));
    }
}

// Property: float reads never surface NaN or infinity
proptest! {
    #[test]
    fn prop_float_reads_are_finite(bits32 in any::<u32>(), bits64 in any::<u64>()) {
        let mut buf = ByteBuffer::new();
        buf.write_u32(bits32);
        buf.write_u64(bits64);

        let f = buf.read_f32().unwrap();
        let d = buf.read_f64().unwrap();
        prop_assert!(f.is_finite());
        prop_assert!(d.is_finite());

        let original = f32::from_bits(bits32);
        if original.is_finite() {
            prop_assert_eq!(f.to_bits(), bits32);
        }
    }
}

// Property: a failed read leaves the cursor where it was
proptest! {
    #[test]
    fn prop_truncated_read_keeps_cursor(data in prop::collection::vec(any::<u8>(), 0..7)) {
        let mut buf = ByteBuffer::from(data.clone());
        let before = buf.position();

        prop_assert!(buf.read_u64().is_err());
        prop_assert_eq!(buf.position(), before);

        if data.len() < 2 {
            prop_assert!(buf.read_bytes().is_err());
            prop_assert_eq!(buf.position(), before);
        }
    }
}

// Property: signed 24-bit values survive with sign extension
proptest! {
    #[test]
    fn prop_s24_sign_extension(v in -(1i32 << 23)..(1i32 << 23)) {
        let mut buf = ByteBuffer::new();
        buf.write_s24(v);
        prop_assert_eq!(buf.len(), 3);
        prop_assert_eq!(buf.read_s24().unwrap(), v);
    }
}

// Property: length-prefixed writes fail fast instead of truncating the prefix
proptest! {
    #[test]
    fn prop_long_prefixed_write_rejected(extra in 1usize..512) {
        let value = vec![0u8; 65535 + extra];
        let mut buf = ByteBuffer::new();

        let rejected = matches!(
            buf.write_bytes(&value),
            Err(NetworkError::PayloadTooLarge { .. })
        );
        prop_assert!(rejected);
        prop_assert!(buf.is_empty());
    }
}
