//! # Error Types
//!
//! Error handling for the session framework.
//!
//! This module defines every failure a connection, codec or configuration
//! can report, from low-level socket errors to frame envelope violations.
//!
//! ## Error Categories
//! - **Configuration Errors**: Missing or invalid settings, fatal at startup
//! - **Transport Errors**: Read/write/dial failures, deadlines, closed peers
//! - **Protocol Errors**: Oversized or malformed frames
//! - **Codec Errors**: Truncated input, values too large for their length prefix
//!
//! Transport and protocol errors are local to a single connection: they tear
//! that connection down and nothing else.
//!
//! ## Example Usage
//! ```rust
//! use network_session::core::buffer::ByteBuffer;
//! use network_session::error::{NetworkError, Result};
//! use tracing::error;
//!
//! fn read_method(buf: &mut ByteBuffer) -> Result<u32> {
//!     buf.read_u32()
//! }
//!
//! let mut buf = ByteBuffer::from(&[0x00, 0x01][..]);
//! match read_method(&mut buf) {
//!     Err(NetworkError::TruncatedInput { .. }) => {}
//!     other => error!(?other, "unexpected result"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Static messages shared by log lines and error paths.
pub mod constants {
    /// Connection lifecycle
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_ACCEPT_FAILED: &str = "Error accepting connection";
    pub const ERR_DIAL_FAILED: &str = "Connect failed, retrying";

    /// Callback isolation
    pub const ERR_CALLBACK_PANIC: &str = "Callback panicked";
}

/// NetworkError is the error type for every operation in this crate
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Truncated input: needed {needed} bytes, {remaining} remaining")]
    TruncatedInput { needed: usize, remaining: usize },

    #[error("Payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Invalid UTF-8 string payload")]
    InvalidString,

    #[error("Malformed frame: total length {0} is shorter than the method field")]
    MalformedFrame(u32),

    #[error("Frame body too large: {size} bytes (max {max})")]
    OversizedFrame { size: usize, max: usize },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Queue full")]
    QueueFull,

    #[error("Deadline exceeded")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unsupported network kind: {0}")]
    UnsupportedNetwork(String),
}

impl NetworkError {
    /// Whether this error is a protocol violation (as opposed to a transport failure)
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            NetworkError::MalformedFrame(_) | NetworkError::OversizedFrame { .. }
        )
    }
}

/// Type alias for Results using NetworkError
pub type Result<T> = std::result::Result<T, NetworkError>;
