//! Reconnecting client.
//!
//! A [`Client`] dials its configured address, runs one receive task plus an
//! inline dispatch loop while connected, and dials again whenever the
//! connection is lost. Failed dials are retried after a fixed delay, forever.
//!
//! Application code writes through a [`ClientSession`], which sends directly
//! on the socket rather than through a queue.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::SinkExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::time::sleep;
use tokio_util::codec::FramedWrite;
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::config::ClientConfig;
use crate::core::codec::FrameCodec;
use crate::core::frame::Frame;
use crate::error::constants::ERR_DIAL_FAILED;
use crate::error::{NetworkError, Result};
use crate::protocol::message::Message;
use crate::protocol::observer::ClientObserver;
use crate::transport::connection::lock;
use crate::transport::link::Link;
use crate::transport::session::{guarded, receive_loop};
use crate::transport::NetworkKind;
use crate::utils::metrics::Metrics;
use crate::utils::timeout::with_deadline;

/// Observable connection state of a [`Client`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
}

/// Where the connect loop is, with the socket when there is one
enum Phase {
    Connecting,
    Connected(TcpStream),
    Backoff,
}

struct Current {
    link: Link,
    peer: SocketAddr,
}

struct SessionInner {
    writer: AsyncMutex<Option<FramedWrite<OwnedWriteHalf, FrameCodec>>>,
    current: Mutex<Option<Current>>,
    state: watch::Sender<ClientState>,
    write_deadline: Duration,
    metrics: Arc<Metrics>,
}

/// Write handle for the client's current connection.
///
/// Cheap to clone. Stays valid across reconnects: sends go to whichever
/// connection is live at the time of the call.
#[derive(Clone)]
pub struct ClientSession {
    inner: Arc<SessionInner>,
}

impl ClientSession {
    fn new(write_deadline: Duration, metrics: Arc<Metrics>) -> Self {
        let (state, _) = watch::channel(ClientState::Disconnected);
        Self {
            inner: Arc::new(SessionInner {
                writer: AsyncMutex::new(None),
                current: Mutex::new(None),
                state,
                write_deadline,
                metrics,
            }),
        }
    }

    /// Write one frame and return the number of bytes put on the wire.
    ///
    /// Fails with [`NetworkError::NotConnected`] between connections. Any
    /// write failure or deadline expiry drops the connection, which the
    /// client then re-establishes.
    pub async fn send(&self, method: u32, payload: impl Into<Bytes>) -> Result<usize> {
        let link = self.link().ok_or(NetworkError::NotConnected)?;
        if link.is_cancelled() {
            return Err(NetworkError::NotConnected);
        }

        let frame = Frame::new(method, payload);
        let len = frame.encoded_len();

        let mut writer = self.inner.writer.lock().await;
        let sink = writer.as_mut().ok_or(NetworkError::NotConnected)?;

        match with_deadline(sink.send(frame), self.inner.write_deadline).await {
            Ok(Ok(())) => {
                self.inner.metrics.message_sent(len as u64);
                Ok(len)
            }
            Ok(Err(e @ NetworkError::PayloadTooLarge { .. })) => Err(e),
            Ok(Err(e)) => {
                self.inner.metrics.connection_error();
                link.cancel();
                Err(e)
            }
            Err(e) => {
                link.cancel();
                Err(e)
            }
        }
    }

    /// Drop the current connection; the client reconnects afterwards
    pub fn close(&self) {
        if let Some(link) = self.link() {
            link.cancel();
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.state.borrow() == ClientState::Connected
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        lock(&self.inner.current).as_ref().map(|c| c.peer)
    }

    fn link(&self) -> Option<Link> {
        lock(&self.inner.current).as_ref().map(|c| c.link.clone())
    }

    fn set_state(&self, state: ClientState) {
        self.inner.state.send_replace(state);
    }

    async fn attach(&self, writer: OwnedWriteHalf, link: Link, peer: SocketAddr) {
        *self.inner.writer.lock().await = Some(FramedWrite::new(writer, FrameCodec::new()));
        *lock(&self.inner.current) = Some(Current { link, peer });
        self.set_state(ClientState::Connected);
    }

    /// Forget the connection; dropping the write half closes the socket
    async fn detach(&self) {
        lock(&self.inner.current).take();
        self.inner.writer.lock().await.take();
        self.set_state(ClientState::Disconnected);
    }
}

pub struct Client {
    config: ClientConfig,
    observer: Arc<dyn ClientObserver>,
    session: ClientSession,
    metrics: Arc<Metrics>,
}

impl Client {
    pub fn new<O: ClientObserver>(config: ClientConfig, observer: O) -> Self {
        Self::with_shared_observer(config, Arc::new(observer))
    }

    pub fn with_shared_observer(config: ClientConfig, observer: Arc<dyn ClientObserver>) -> Self {
        let metrics = Arc::new(Metrics::new());
        let session = ClientSession::new(config.write_deadline, metrics.clone());
        Self {
            config,
            observer,
            session,
            metrics,
        }
    }

    /// Handle for sending on whichever connection is current
    pub fn session(&self) -> ClientSession {
        self.session.clone()
    }

    pub fn state(&self) -> ClientState {
        *self.session.inner.state.borrow()
    }

    /// Receiver that observes every state transition
    pub fn watch_state(&self) -> watch::Receiver<ClientState> {
        self.session.inner.state.subscribe()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Connect and keep reconnecting forever.
    ///
    /// Only returns early on an invalid configuration. Run at most one of
    /// `run` or `run_with_shutdown` per client at a time.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Like [`run`](Self::run), stopping when `shutdown_rx` yields or its
    /// sender is dropped
    pub async fn run_with_shutdown(&self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        self.run_until(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
    }

    #[instrument(skip_all, fields(address = %self.config.address))]
    async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.config.validate_strict()?;
        let kind: NetworkKind = self.config.network.parse()?;

        // One inbox for the client's whole lifetime, shared by every connection
        let (inbox_tx, mut inbox) = mpsc::channel(self.config.mailbox_queue_size);
        tokio::pin!(shutdown);

        let mut phase = Phase::Connecting;
        loop {
            phase = match phase {
                Phase::Connecting => {
                    self.session.set_state(ClientState::Connecting);
                    tokio::select! {
                        _ = &mut shutdown => break,
                        dialed = self.dial(kind) => match dialed {
                            Ok(stream) => Phase::Connected(stream),
                            Err(e) => {
                                self.metrics.connection_error();
                                warn!(
                                    error = %e,
                                    retry_in = ?self.config.reconnect_delay,
                                    "{}",
                                    ERR_DIAL_FAILED
                                );
                                Phase::Backoff
                            }
                        },
                    }
                }
                Phase::Backoff => {
                    self.session.set_state(ClientState::Disconnected);
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = sleep(self.config.reconnect_delay) => Phase::Connecting,
                    }
                }
                Phase::Connected(stream) => {
                    let stopped = self
                        .serve(stream, &inbox_tx, &mut inbox, shutdown.as_mut())
                        .await;
                    if stopped {
                        break;
                    }
                    info!("Reconnecting");
                    Phase::Connecting
                }
            };
        }

        self.session.set_state(ClientState::Disconnected);
        info!("Client stopped");
        self.metrics.log_metrics();
        Ok(())
    }

    async fn dial(&self, kind: NetworkKind) -> Result<TcpStream> {
        let addr = kind.resolve(&self.config.address).await?;
        let stream = with_deadline(TcpStream::connect(addr), self.config.connect_timeout).await??;
        Ok(stream)
    }

    /// Drive one established connection; returns true if shutdown was requested
    async fn serve<F>(
        &self,
        stream: TcpStream,
        inbox_tx: &mpsc::Sender<Message>,
        inbox: &mut mpsc::Receiver<Message>,
        mut shutdown: Pin<&mut F>,
    ) -> bool
    where
        F: Future<Output = ()>,
    {
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(e) => {
                debug!(error = %e, "Connection lost before it was set up");
                return false;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let link = Link::new();
        self.session.attach(writer, link.clone(), peer).await;
        self.metrics.connection_established();
        info!(%peer, "Connected");

        // Runs before the receive task starts reading
        guarded(
            "connected",
            &self.metrics,
            self.observer.on_connected(&self.session),
        )
        .await;

        let receiver = tokio::spawn(
            receive_loop(
                reader,
                inbox_tx.clone(),
                link.clone(),
                self.config.read_deadline,
                self.config.max_body_size,
                self.metrics.clone(),
            )
            .in_current_span(),
        );

        let stopped = loop {
            tokio::select! {
                _ = link.cancelled() => break false,
                _ = &mut shutdown => break true,
                Some(message) = inbox.recv() => {
                    guarded(
                        "message",
                        &self.metrics,
                        self.observer.on_message(&self.session, message),
                    )
                    .await;
                }
            }
        };

        link.cancel();
        if let Err(e) = receiver.await {
            error!(error = %e, "Receive task failed");
        }
        self.session.detach().await;
        self.metrics.connection_closed();
        info!(%peer, "Disconnected");

        guarded(
            "disconnected",
            &self.metrics,
            self.observer.on_disconnected(),
        )
        .await;
        stopped
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use async_trait::async_trait;

    struct Silent;

    #[async_trait]
    impl ClientObserver for Silent {
        async fn on_message(&self, _session: &ClientSession, _message: Message) {}
    }

    #[tokio::test]
    async fn test_send_while_disconnected() {
        let client = Client::new(ClientConfig::default(), Silent);
        let session = client.session();

        assert_eq!(client.state(), ClientState::Disconnected);
        assert!(!session.is_connected());
        assert!(session.peer_addr().is_none());
        assert!(matches!(
            session.send(1, &b"x"[..]).await,
            Err(NetworkError::NotConnected)
        ));
        session.close();
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_config() {
        let config = ClientConfig {
            reconnect_delay: Duration::ZERO,
            ..ClientConfig::default()
        };
        let client = Client::new(config, Silent);
        assert!(matches!(
            client.run().await,
            Err(NetworkError::ConfigError(_))
        ));
    }
}
