//! Application callbacks.
//!
//! A server drives one [`ConnectionObserver`] for all of its connections; a
//! client drives one [`ClientObserver`]. For small programs [`Callbacks`]
//! builds a connection observer from plain closures.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::protocol::message::Message;
use crate::transport::client::ClientSession;
use crate::transport::connection::Connection;

/// Server-side lifecycle callbacks.
///
/// All callbacks for one connection run on that connection's dispatch task,
/// so they never overlap for the same connection. A callback that panics is
/// logged and the connection keeps running.
#[async_trait]
pub trait ConnectionObserver: Send + Sync + 'static {
    /// Called once, before any message is delivered
    async fn on_accept(&self, _conn: &Arc<Connection>) {}

    /// Called for each decoded frame and each posted message
    async fn on_message(&self, conn: &Arc<Connection>, message: Message);

    /// Called on every tick interval
    async fn on_tick(&self, _conn: &Arc<Connection>) {}

    /// Called once, after the connection has been closed
    async fn on_kick(&self, _conn: &Arc<Connection>) {}

    /// Whether the tick timer should run for this observer at all
    fn handles_tick(&self) -> bool {
        true
    }
}

/// Client-side lifecycle callbacks
#[async_trait]
pub trait ClientObserver: Send + Sync + 'static {
    /// Called after each successful dial, before the first message
    async fn on_connected(&self, _session: &ClientSession) {}

    /// Called once per lost connection
    async fn on_disconnected(&self) {}

    async fn on_message(&self, session: &ClientSession, message: Message);
}

type ConnFn = Box<dyn Fn(&Arc<Connection>) + Send + Sync>;
type MessageFn = Box<dyn Fn(&Arc<Connection>, Message) + Send + Sync>;

/// Closure-backed [`ConnectionObserver`].
///
/// Only the message handler is required. Leaving out the tick closure turns
/// the tick timer off.
///
/// ```
/// use network_session::protocol::observer::Callbacks;
///
/// let callbacks = Callbacks::new(|conn, msg| {
///     let _ = conn.try_send(msg.method(), msg.into_payload());
/// })
/// .on_accept(|conn| println!("accepted {}", conn.key()));
/// # let _ = callbacks;
/// ```
pub struct Callbacks {
    handler: MessageFn,
    accept: Option<ConnFn>,
    tick: Option<ConnFn>,
    kick: Option<ConnFn>,
}

impl Callbacks {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Arc<Connection>, Message) + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            accept: None,
            tick: None,
            kick: None,
        }
    }

    pub fn on_accept<F>(mut self, f: F) -> Self
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.accept = Some(Box::new(f));
        self
    }

    pub fn on_tick<F>(mut self, f: F) -> Self
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.tick = Some(Box::new(f));
        self
    }

    pub fn on_kick<F>(mut self, f: F) -> Self
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.kick = Some(Box::new(f));
        self
    }
}

#[async_trait]
impl ConnectionObserver for Callbacks {
    async fn on_accept(&self, conn: &Arc<Connection>) {
        if let Some(f) = &self.accept {
            f(conn);
        }
    }

    async fn on_message(&self, conn: &Arc<Connection>, message: Message) {
        (self.handler)(conn, message);
    }

    async fn on_tick(&self, conn: &Arc<Connection>) {
        if let Some(f) = &self.tick {
            f(conn);
        }
    }

    async fn on_kick(&self, conn: &Arc<Connection>) {
        if let Some(f) = &self.kick {
            f(conn);
        }
    }

    fn handles_tick(&self) -> bool {
        self.tick.is_some()
    }
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
