//! Keyed index of live server connections.
//!
//! A registry is created by the application (or by [`Server::new`]) and shared
//! through an `Arc`, so several servers in one process can keep separate
//! indexes or deliberately share one.
//!
//! [`Server::new`]: crate::transport::Server::new

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::debug;

use crate::transport::connection::{lock, Connection};

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Connection>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `conn` under its key, replacing any previous entry
    pub fn register(&self, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        let key = conn.key().to_string();
        let previous = lock(&self.sessions).insert(key.clone(), conn);
        debug!(key = %key, "Session registered");
        previous
    }

    pub fn unregister(&self, key: &str) -> Option<Arc<Connection>> {
        let removed = lock(&self.sessions).remove(key);
        if removed.is_some() {
            debug!(key = %key, "Session unregistered");
        }
        removed
    }

    /// Remove the entry for `conn` only if the registry still maps its key to
    /// this exact connection
    pub(crate) fn unregister_if(&self, conn: &Arc<Connection>) -> bool {
        let mut sessions = lock(&self.sessions);
        match sessions.get(conn.key()) {
            Some(current) if Arc::ptr_eq(current, conn) => {
                sessions.remove(conn.key());
                debug!(key = %conn.key(), "Session unregistered");
                true
            }
            _ => false,
        }
    }

    pub fn lookup(&self, key: &str) -> Option<Arc<Connection>> {
        lock(&self.sessions).get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.sessions).contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.sessions).keys().cloned().collect()
    }

    /// Snapshot of every registered connection
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        lock(&self.sessions).values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.sessions).is_empty()
    }

    /// Queue a frame on every registered connection without waiting.
    ///
    /// Connections whose outbound queue is full or closed are skipped.
    /// Returns how many connections accepted the frame.
    pub fn broadcast(&self, method: u32, payload: impl Into<Bytes>) -> usize {
        let payload = payload.into();
        self.connections()
            .iter()
            .filter(|conn| conn.try_send(method, payload.clone()).is_ok())
            .count()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::transport::connection::{ConnectionQueues, QueueSizes};
    use crate::transport::link::Link;

    fn conn(port: u16) -> (Arc<Connection>, ConnectionQueues) {
        Connection::new(
            format!("127.0.0.1:{port}").parse().unwrap(),
            "127.0.0.1:9999".parse().unwrap(),
            QueueSizes {
                outbound: 1,
                inbound: 1,
                mailbox: 1,
            },
            Link::new(),
        )
    }

    #[test]
    fn test_register_lookup_unregister() {
        let registry = SessionRegistry::new();
        let (a, _qa) = conn(4001);
        let (b, _qb) = conn(4002);

        assert!(registry.register(a.clone()).is_none());
        registry.register(b);
        assert_eq!(registry.len(), 2);
        assert!(Arc::ptr_eq(&registry.lookup("127.0.0.1:4001").unwrap(), &a));

        let mut keys = registry.keys();
        keys.sort();
        assert_eq!(keys, vec!["127.0.0.1:4001", "127.0.0.1:4002"]);

        assert!(registry.unregister("127.0.0.1:4001").is_some());
        assert!(registry.unregister("127.0.0.1:4001").is_none());
        assert!(!registry.contains("127.0.0.1:4001"));
    }

    #[test]
    fn test_unregister_if_ignores_replaced_entry() {
        let registry = SessionRegistry::new();
        let (old, _q1) = conn(4100);
        let (new, _q2) = conn(4100);

        registry.register(old.clone());
        registry.register(new.clone());
        assert!(!registry.unregister_if(&old));
        assert!(registry.contains("127.0.0.1:4100"));
        assert!(registry.unregister_if(&new));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_skips_full_queues() {
        let registry = SessionRegistry::new();
        let (a, mut qa) = conn(4201);
        let (b, _qb) = conn(4202);
        registry.register(a);
        registry.register(b.clone());

        b.try_send(1, Bytes::new()).unwrap();
        assert_eq!(registry.broadcast(5, &b"all"[..]), 1);

        let got = qa.outbound.recv().await.unwrap();
        assert_eq!((got.method(), &got.payload()[..]), (5, &b"all"[..]));
    }
}
