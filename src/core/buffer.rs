//! # Byte Buffer
//!
//! Cursor-based reader/writer used to build and pick apart message bodies.
//!
//! All multi-byte values are big-endian. Length-prefixed values (`bytes`,
//! `string`) carry a 16-bit length, so they hold at most 65535 bytes; longer
//! values are rejected with [`NetworkError::PayloadTooLarge`] instead of being
//! silently truncated.
//!
//! A failed read never moves the cursor.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{NetworkError, Result};

/// Initial capacity for freshly created buffers
pub const DEFAULT_CAPACITY: usize = 1024;

/// Largest value a 16-bit length prefix can describe
pub const MAX_PREFIXED_LEN: usize = u16::MAX as usize;

/// Growable byte buffer with a read cursor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    data: BytesMut,
    pos: usize,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            pos: 0,
        }
    }

    /// Total number of bytes written
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current read position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left between the cursor and the end of the buffer
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Freeze the written bytes, discarding the cursor
    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }

    /// Consume `N` bytes from the cursor, or fail without moving it
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.peek_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pos += N;
        Ok(out)
    }

    fn peek_slice(&self, n: usize) -> Result<&[u8]> {
        if self.remaining() < n {
            return Err(NetworkError::TruncatedInput {
                needed: n,
                remaining: self.remaining(),
            });
        }
        Ok(&self.data[self.pos..self.pos + n])
    }

    // ---------------------------------------------------------------- readers

    pub fn read_byte(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    /// Any byte other than `1` reads as `false`
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_byte()? == 1)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.take().map(u16::from_be_bytes)
    }

    pub fn read_s16(&mut self) -> Result<i16> {
        self.take().map(i16::from_be_bytes)
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        let [a, b, c] = self.take::<3>()?;
        Ok(u32::from_be_bytes([0, a, b, c]))
    }

    /// Sign-extends the 24-bit value
    pub fn read_s24(&mut self) -> Result<i32> {
        let raw = self.read_u24()?;
        Ok(((raw << 8) as i32) >> 8)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.take().map(u32::from_be_bytes)
    }

    pub fn read_s32(&mut self) -> Result<i32> {
        self.take().map(i32::from_be_bytes)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.take().map(u64::from_be_bytes)
    }

    pub fn read_s64(&mut self) -> Result<i64> {
        self.take().map(i64::from_be_bytes)
    }

    /// NaN and infinities decode as `0.0`
    pub fn read_f32(&mut self) -> Result<f32> {
        let value = f32::from_bits(self.read_u32()?);
        Ok(if value.is_finite() { value } else { 0.0 })
    }

    /// NaN and infinities decode as `0.0`
    pub fn read_f64(&mut self) -> Result<f64> {
        let value = f64::from_bits(self.read_u64()?);
        Ok(if value.is_finite() { value } else { 0.0 })
    }

    /// Read a 16-bit length prefix followed by that many bytes
    pub fn read_bytes(&mut self) -> Result<Bytes> {
        let prefix = self.peek_slice(2)?;
        let len = u16::from_be_bytes([prefix[0], prefix[1]]) as usize;
        if self.remaining() < 2 + len {
            return Err(NetworkError::TruncatedInput {
                needed: 2 + len,
                remaining: self.remaining(),
            });
        }
        let start = self.pos + 2;
        self.pos = start + len;
        Ok(Bytes::copy_from_slice(&self.data[start..start + len]))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let start = self.pos;
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            self.pos = start;
            NetworkError::InvalidString
        })
    }

    /// Read exactly `n` bytes without a length prefix
    pub fn read_raw(&mut self, n: usize) -> Result<Bytes> {
        let out = Bytes::copy_from_slice(self.peek_slice(n)?);
        self.pos += n;
        Ok(out)
    }

    // ---------------------------------------------------------------- writers

    pub fn write_zeros(&mut self, n: usize) {
        self.data.put_bytes(0, n);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.data.put_u8(u8::from(v));
    }

    pub fn write_byte(&mut self, v: u8) {
        self.data.put_u8(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.data.put_u16(v);
    }

    pub fn write_s16(&mut self, v: i16) {
        self.data.put_i16(v);
    }

    /// Writes the low 24 bits of `v`
    pub fn write_u24(&mut self, v: u32) {
        self.data.put_slice(&v.to_be_bytes()[1..]);
    }

    pub fn write_s24(&mut self, v: i32) {
        self.write_u24(v as u32);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.data.put_u32(v);
    }

    pub fn write_s32(&mut self, v: i32) {
        self.data.put_i32(v);
    }

    pub fn write_u64(&mut self, v: u64) {
        self.data.put_u64(v);
    }

    pub fn write_s64(&mut self, v: i64) {
        self.data.put_i64(v);
    }

    pub fn write_f32(&mut self, v: f32) {
        self.data.put_u32(v.to_bits());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.data.put_u64(v.to_bits());
    }

    /// Write a 16-bit length prefix followed by `v`
    pub fn write_bytes(&mut self, v: &[u8]) -> Result<()> {
        if v.len() > MAX_PREFIXED_LEN {
            return Err(NetworkError::PayloadTooLarge {
                size: v.len(),
                limit: MAX_PREFIXED_LEN,
            });
        }
        self.data.put_u16(v.len() as u16);
        self.data.put_slice(v);
        Ok(())
    }

    pub fn write_string(&mut self, v: &str) -> Result<()> {
        self.write_bytes(v.as_bytes())
    }

    /// Append `v` without a length prefix
    pub fn write_raw_bytes(&mut self, v: &[u8]) {
        self.data.put_slice(v);
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            pos: 0,
        }
    }
}

impl From<Bytes> for ByteBuffer {
    fn from(bytes: Bytes) -> Self {
        Self::from(&bytes[..])
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            data: BytesMut::from(&bytes[..]),
            pos: 0,
        }
    }
}
