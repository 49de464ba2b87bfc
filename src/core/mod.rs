//! # Core Wire Components
//!
//! Low-level framing, codecs, and binary body encoding.
//!
//! This module provides the foundation every connection builds on: the frame
//! envelope, its tokio codec, and the cursor-based buffer applications use to
//! encode message bodies.
//!
//! ## Components
//! - **Buffer**: Big-endian cursor reader/writer for message bodies
//! - **Frame**: Length + method + body envelope
//! - **Codec**: Tokio codec for framing over byte streams
//!
//! ## Wire Format
//! ```text
//! [totalLength(4)] [method(4)] [body(totalLength - 4)]
//! ```
//!
//! ## Limits
//! - Server-side bodies are capped (default 10240 bytes)
//! - Length validation before allocation
//! - Length-prefixed body fields hold at most 65535 bytes

pub mod buffer;
pub mod codec;
pub mod frame;
