//! # Protocol Layer
//!
//! What flows between the transport and application code.
//!
//! ## Components
//! - **Message**: Command-tagged unit carried by the per-connection queues
//! - **Observer**: Callback traits the server and client drive
//!
//! The framework does not interpret method numbers or payloads; routing on
//! them is left to the observer.

pub mod message;
pub mod observer;

pub use message::{Command, Extensions, Message};
pub use observer::{Callbacks, ClientObserver, ConnectionObserver};
