//! # Frame
//!
//! The wire unit every message travels in.
//!
//! ```text
//! [totalLength(4)] [method(4)] [body(totalLength - 4)]
//! ```
//!
//! `totalLength` counts the method field plus the body but not itself. Both
//! header fields are big-endian `u32`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::core::buffer::ByteBuffer;
use crate::error::{NetworkError, Result};

/// Size of the `totalLength` field
pub const LENGTH_FIELD_LEN: usize = 4;

/// Size of the `method` field
pub const METHOD_FIELD_LEN: usize = 4;

/// Full header size in front of every body
pub const HEADER_LEN: usize = LENGTH_FIELD_LEN + METHOD_FIELD_LEN;

/// Default server-side body limit
pub const DEFAULT_MAX_BODY_SIZE: usize = 10240;

/// Largest body whose `totalLength` still fits in a `u32`
pub const MAX_ENCODABLE_BODY: usize = u32::MAX as usize - METHOD_FIELD_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub method: u32,
    pub body: Bytes,
}

impl Frame {
    pub fn new(method: u32, body: impl Into<Bytes>) -> Self {
        Self {
            method,
            body: body.into(),
        }
    }

    /// Value of the `totalLength` header field
    pub fn total_length(&self) -> usize {
        METHOD_FIELD_LEN + self.body.len()
    }

    /// Bytes this frame occupies on the wire
    pub fn encoded_len(&self) -> usize {
        LENGTH_FIELD_LEN + self.total_length()
    }

    /// Append the encoded frame to `dst`
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        if self.body.len() > MAX_ENCODABLE_BODY {
            return Err(NetworkError::PayloadTooLarge {
                size: self.body.len(),
                limit: MAX_ENCODABLE_BODY,
            });
        }
        dst.reserve(self.encoded_len());
        dst.put_u32(self.total_length() as u32);
        dst.put_u32(self.method);
        dst.put_slice(&self.body);
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut dst)?;
        Ok(dst.freeze())
    }

    /// Parse one complete frame from the front of `data`.
    ///
    /// Trailing bytes after the frame are ignored.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_bytes_with_limit(data, None)
    }

    pub fn from_bytes_with_limit(data: &[u8], max_body: Option<usize>) -> Result<Self> {
        let mut buf = ByteBuffer::from(data);
        let total = buf.read_u32()?;
        let method = buf.read_u32()?;
        let body_len = body_length(total, max_body)?;
        let body = buf.read_raw(body_len)?;
        Ok(Self { method, body })
    }
}

/// Derive the body length from a `totalLength` header and enforce the limit
pub(crate) fn body_length(total: u32, max_body: Option<usize>) -> Result<usize> {
    let body_len = total
        .checked_sub(METHOD_FIELD_LEN as u32)
        .ok_or(NetworkError::MalformedFrame(total))? as usize;
    if let Some(max) = max_body {
        if body_len > max {
            return Err(NetworkError::OversizedFrame {
                size: body_len,
                max,
            });
        }
    }
    Ok(body_len)
}
