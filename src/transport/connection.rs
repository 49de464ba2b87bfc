//! Server-side connection handle.
//!
//! A [`Connection`] is what application callbacks see. The socket itself is
//! owned by the connection's receive and send tasks; the handle only holds the
//! producer ends of the three queues and the shared [`Link`].

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::{NetworkError, Result};
use crate::protocol::message::{Extensions, Message};
use crate::transport::link::Link;

/// Capacities for the three per-connection queues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSizes {
    pub outbound: usize,
    pub inbound: usize,
    pub mailbox: usize,
}

/// Consumer ends handed to the connection's tasks
pub(crate) struct ConnectionQueues {
    pub outbound: mpsc::Receiver<Message>,
    pub inbound: mpsc::Receiver<Message>,
    pub mailbox: mpsc::Receiver<Message>,
}

#[derive(Debug)]
pub struct Connection {
    key: String,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    identity: Mutex<Option<i64>>,
    extensions: Mutex<Extensions>,
    outbound: mpsc::Sender<Message>,
    inbound: mpsc::Sender<Message>,
    mailbox: mpsc::Sender<Message>,
    link: Link,
    terminated: Link,
}

impl Connection {
    pub(crate) fn new(
        peer_addr: SocketAddr,
        local_addr: SocketAddr,
        sizes: QueueSizes,
        link: Link,
    ) -> (Arc<Self>, ConnectionQueues) {
        let (outbound_tx, outbound_rx) = mpsc::channel(sizes.outbound);
        let (inbound_tx, inbound_rx) = mpsc::channel(sizes.inbound);
        let (mailbox_tx, mailbox_rx) = mpsc::channel(sizes.mailbox);

        let conn = Arc::new(Self {
            key: peer_addr.to_string(),
            peer_addr,
            local_addr,
            identity: Mutex::new(None),
            extensions: Mutex::new(Extensions::new()),
            outbound: outbound_tx,
            inbound: inbound_tx,
            mailbox: mailbox_tx,
            link,
            terminated: Link::new(),
        });

        let queues = ConnectionQueues {
            outbound: outbound_rx,
            inbound: inbound_rx,
            mailbox: mailbox_rx,
        };
        (conn, queues)
    }

    /// Registry key: the remote endpoint as `ip:port`
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Application-assigned identity, unset until the application sets it
    pub fn identity(&self) -> Option<i64> {
        *lock(&self.identity)
    }

    pub fn set_identity(&self, id: i64) {
        *lock(&self.identity) = Some(id);
    }

    pub fn clear_identity(&self) {
        *lock(&self.identity) = None;
    }

    /// Run `f` with this connection's session data.
    ///
    /// The lock is held only for the duration of `f`; do not await inside it.
    pub fn with_extensions<R>(&self, f: impl FnOnce(&mut Extensions) -> R) -> R {
        f(&mut lock(&self.extensions))
    }

    /// Queue a frame for the send task.
    ///
    /// Waits while the outbound queue is full. Fails with
    /// [`NetworkError::ConnectionClosed`] once the connection is shutting down.
    pub async fn send(&self, method: u32, payload: impl Into<Bytes>) -> Result<()> {
        self.enqueue(&self.outbound, Message::send(method, payload))
            .await
    }

    /// Queue a frame without waiting; fails with [`NetworkError::QueueFull`]
    pub fn try_send(&self, method: u32, payload: impl Into<Bytes>) -> Result<()> {
        if self.link.is_cancelled() {
            return Err(NetworkError::ConnectionClosed);
        }
        self.outbound
            .try_send(Message::send(method, payload))
            .map_err(|e| match e {
                TrySendError::Full(_) => NetworkError::QueueFull,
                TrySendError::Closed(_) => NetworkError::ConnectionClosed,
            })
    }

    /// Deliver a message to this session's handler on behalf of session `from`
    pub async fn post(&self, from: &str, method: u32, payload: impl Into<Bytes>) -> Result<()> {
        let message = Message::inbound(method, payload).from_session(from);
        self.enqueue(&self.inbound, message).await
    }

    /// Ask the dispatch loop to terminate this connection.
    ///
    /// The request is queued behind messages already in the mailbox. If the
    /// mailbox is full the connection is closed right away instead, so a
    /// handler can kick its own connection without waiting on itself.
    pub fn kick(&self) {
        if let Err(TrySendError::Full(_)) = self.mailbox.try_send(Message::kick()) {
            self.link.cancel();
        }
    }

    /// Close the connection immediately, skipping queued messages
    pub fn close(&self) {
        self.link.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.link.is_cancelled()
    }

    /// Resolves once all of this connection's tasks have exited
    pub async fn closed(&self) {
        self.terminated.cancelled().await;
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub(crate) fn mailbox_sender(&self) -> mpsc::Sender<Message> {
        self.mailbox.clone()
    }

    pub(crate) fn mark_terminated(&self) {
        self.terminated.cancel();
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.is_cancelled()
    }

    async fn enqueue(&self, queue: &mpsc::Sender<Message>, message: Message) -> Result<()> {
        if self.link.is_cancelled() {
            return Err(NetworkError::ConnectionClosed);
        }
        tokio::select! {
            biased;
            _ = self.link.cancelled() => Err(NetworkError::ConnectionClosed),
            sent = queue.send(message) => sent.map_err(|_| NetworkError::ConnectionClosed),
        }
    }
}

/// Lock a std mutex, recovering the data if a panicking holder poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::protocol::message::Command;
    use std::time::Duration;

    fn test_connection(sizes: QueueSizes) -> (Arc<Connection>, ConnectionQueues) {
        Connection::new(
            "10.0.0.2:5555".parse().unwrap(),
            "10.0.0.1:9999".parse().unwrap(),
            sizes,
            Link::new(),
        )
    }

    const SMALL: QueueSizes = QueueSizes {
        outbound: 2,
        inbound: 1,
        mailbox: 1,
    };

    #[tokio::test]
    async fn test_send_enqueues_in_order() {
        let (conn, mut queues) = test_connection(SMALL);
        conn.send(1, &b"a"[..]).await.unwrap();
        conn.send(2, &b"b"[..]).await.unwrap();

        let first = queues.outbound.recv().await.unwrap();
        let second = queues.outbound.recv().await.unwrap();
        assert_eq!((first.command(), first.method()), (Command::Send, 1));
        assert_eq!(second.method(), 2);
    }

    #[tokio::test]
    async fn test_full_queue_blocks_then_fails_on_close() {
        let (conn, _queues) = test_connection(SMALL);
        conn.send(1, Bytes::new()).await.unwrap();
        conn.send(2, Bytes::new()).await.unwrap();
        assert!(matches!(
            conn.try_send(3, Bytes::new()),
            Err(NetworkError::QueueFull)
        ));

        let blocked = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.send(3, Bytes::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        conn.close();
        let result = blocked.await.unwrap();
        assert!(matches!(result, Err(NetworkError::ConnectionClosed)));
        assert!(conn.try_send(4, Bytes::new()).is_err());
    }

    #[tokio::test]
    async fn test_post_and_kick_use_their_own_queues() {
        let (conn, mut queues) = test_connection(SMALL);
        conn.post("10.0.0.3:1", 7, &b"hi"[..]).await.unwrap();
        conn.kick();

        let posted = queues.inbound.recv().await.unwrap();
        assert_eq!(posted.origin(), Some("10.0.0.3:1"));
        assert_eq!(posted.command(), Command::Message);

        let kick = queues.mailbox.recv().await.unwrap();
        assert_eq!(kick.command(), Command::Kick);
        assert!(!conn.is_closed());

        // Mailbox capacity is one: the second kick cannot queue and closes instead
        conn.kick();
        conn.kick();
        assert!(conn.is_closed());
    }

    #[test]
    fn test_identity_and_extensions() {
        let (conn, _queues) = test_connection(SMALL);
        assert_eq!(conn.key(), "10.0.0.2:5555");
        assert_eq!(conn.identity(), None);

        conn.set_identity(42);
        assert_eq!(conn.identity(), Some(42));
        conn.clear_identity();
        assert_eq!(conn.identity(), None);

        conn.with_extensions(|ext| ext.insert(3u32));
        assert_eq!(conn.with_extensions(|ext| ext.get::<u32>().copied()), Some(3));
    }
}
