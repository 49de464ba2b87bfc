use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;

use crate::core::frame::Frame;

/// What a queued [`Message`] asks its consuming task to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// A decoded inbound message, delivered to the handler
    Message,
    /// Terminate the connection
    Kick,
    /// Write the payload to the socket
    Send,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Message => "message",
            Command::Kick => "kick",
            Command::Send => "send",
        }
    }
}

/// Typed storage for state handlers attach to a message or a connection.
///
/// One value per type, the same way `http::Extensions` works.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous one of the same type
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|prev| prev.downcast::<T>().ok().map(|b| *b))
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut::<T>())
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok().map(|b| *b))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}

/// Application-facing unit flowing through the per-connection queues.
///
/// Created by the receive path when a frame is decoded, or by application
/// code when it sends; consumed by exactly one task.
#[derive(Debug)]
pub struct Message {
    command: Command,
    method: u32,
    payload: Bytes,
    from: Option<String>,
    extensions: Extensions,
}

impl Message {
    fn with_command(command: Command, method: u32, payload: Bytes) -> Self {
        Self {
            command,
            method,
            payload,
            from: None,
            extensions: Extensions::new(),
        }
    }

    /// Inbound message as handed to the handler
    pub fn inbound(method: u32, payload: impl Into<Bytes>) -> Self {
        Self::with_command(Command::Message, method, payload.into())
    }

    /// Outbound request for the send path
    pub fn send(method: u32, payload: impl Into<Bytes>) -> Self {
        Self::with_command(Command::Send, method, payload.into())
    }

    /// Termination request for the dispatch loop
    pub fn kick() -> Self {
        Self::with_command(Command::Kick, 0, Bytes::new())
    }

    /// Mark the session key this message was posted from
    pub fn from_session(mut self, key: impl Into<String>) -> Self {
        self.from = Some(key.into());
        self
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn method(&self) -> u32 {
        self.method
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Key of the session that posted this message, `None` for wire traffic
    pub fn origin(&self) -> Option<&str> {
        self.from.as_deref()
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Frame carrying this message's method and payload
    pub fn to_frame(&self) -> Frame {
        Frame {
            method: self.method,
            body: self.payload.clone(),
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        Message::inbound(frame.method, frame.body)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn test_frame_conversion() {
        let msg = Message::from(Frame::new(7, &b"abc"[..]));
        assert_eq!(msg.command(), Command::Message);
        assert_eq!(msg.method(), 7);
        assert_eq!(&msg.payload()[..], b"abc");
        assert!(msg.origin().is_none());

        let frame = Message::send(9, &b"xy"[..]).to_frame();
        assert_eq!(frame, Frame::new(9, &b"xy"[..]));
    }

    #[test]
    fn test_kick_has_no_payload() {
        let msg = Message::kick();
        assert_eq!(msg.command(), Command::Kick);
        assert!(msg.payload().is_empty());
        assert_eq!(msg.command().as_str(), "kick");
    }

    #[test]
    fn test_extensions_are_typed() {
        #[derive(Debug, PartialEq)]
        struct UserId(u64);

        let mut msg = Message::inbound(1, Bytes::new()).from_session("10.0.0.1:4000");
        assert_eq!(msg.origin(), Some("10.0.0.1:4000"));

        assert!(msg.extensions_mut().insert(UserId(5)).is_none());
        assert!(msg.extensions_mut().insert(String::from("tag")).is_none());
        assert_eq!(msg.extensions().get::<UserId>(), Some(&UserId(5)));

        msg.extensions_mut().get_mut::<UserId>().unwrap().0 = 6;
        assert_eq!(msg.extensions_mut().insert(UserId(7)), Some(UserId(6)));
        assert_eq!(msg.extensions_mut().remove::<String>().as_deref(), Some("tag"));
        assert_eq!(msg.extensions().len(), 1);
    }
}
