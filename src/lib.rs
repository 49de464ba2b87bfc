//! # network-session
//!
//! Length-prefixed binary TCP messaging: a multi-connection server and a
//! reconnecting client that share one frame codec.
//!
//! Every frame on the wire is
//! `[totalLength: u32 BE][method: u32 BE][body: totalLength - 4 bytes]`.
//!
//! On the server each accepted socket runs three cooperating tasks (receive,
//! send and dispatch) tied together by a cancellation [`Link`]. Application
//! code plugs in through [`ConnectionObserver`] and talks to peers through
//! [`Connection`].
//!
//! ## Example
//! ```no_run
//! use network_session::config::ServerConfig;
//! use network_session::protocol::Callbacks;
//! use network_session::transport::Server;
//!
//! # async fn run() -> network_session::Result<()> {
//! let echo = Callbacks::new(|conn, msg| {
//!     let _ = conn.try_send(msg.method(), msg.into_payload());
//! });
//! Server::new(ServerConfig::default(), echo).start().await
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use config::{ClientConfig, LoggingConfig, NetworkConfig, ServerConfig};
pub use crate::core::buffer::ByteBuffer;
pub use crate::core::frame::Frame;
pub use error::{NetworkError, Result};
pub use protocol::{Callbacks, ClientObserver, ConnectionObserver, Message};
pub use transport::{
    BoundServer, Client, ClientSession, ClientState, Connection, Link, Server, SessionRegistry,
};
