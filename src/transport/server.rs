//! Listening server.
//!
//! [`Server::bind`] validates the configuration and opens the listener;
//! [`BoundServer::run`] accepts connections until shut down. Every accepted
//! socket gets its own [`Connection`] and task group, see
//! [`transport`](crate::transport) for the topology.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::error::constants::ERR_ACCEPT_FAILED;
use crate::error::Result;
use crate::protocol::observer::ConnectionObserver;
use crate::transport::connection::{Connection, QueueSizes};
use crate::transport::link::Link;
use crate::transport::registry::SessionRegistry;
use crate::transport::session::{run_session, SessionContext};
use crate::transport::NetworkKind;
use crate::utils::metrics::Metrics;

pub struct Server {
    config: ServerConfig,
    observer: Arc<dyn ConnectionObserver>,
    registry: Arc<SessionRegistry>,
    metrics: Arc<Metrics>,
}

impl Server {
    /// Create a server with its own empty registry
    pub fn new<O: ConnectionObserver>(config: ServerConfig, observer: O) -> Self {
        Self::with_shared_observer(config, Arc::new(observer))
    }

    pub fn with_shared_observer(config: ServerConfig, observer: Arc<dyn ConnectionObserver>) -> Self {
        Self {
            config,
            observer,
            registry: Arc::new(SessionRegistry::new()),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Use `registry` instead of a private one
    pub fn with_registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Validate the configuration and bind the listening socket
    #[instrument(skip(self), fields(address = %self.config.address))]
    pub async fn bind(self) -> Result<BoundServer> {
        self.config.validate_strict()?;

        let kind: NetworkKind = self.config.network.parse()?;
        let addr = kind.resolve(&self.config.address).await?;
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, network = %kind, "Server listening");

        let ctx = SessionContext {
            observer: self.observer,
            registry: self.registry,
            metrics: self.metrics,
            read_deadline: self.config.read_deadline,
            write_deadline: self.config.write_deadline,
            tick: self.config.tick(),
            max_body_size: Some(self.config.max_body_size),
        };

        Ok(BoundServer {
            listener,
            local_addr,
            sizes: QueueSizes {
                outbound: self.config.sender_queue_size,
                inbound: self.config.receiver_queue_size,
                mailbox: self.config.mailbox_queue_size,
            },
            shutdown_timeout: self.config.shutdown_timeout,
            shutdown: Link::new(),
            ctx: Arc::new(ctx),
        })
    }

    /// Bind and serve until CTRL+C
    pub async fn start(self) -> Result<()> {
        let bound = self.bind().await?;

        // Create internal shutdown channel
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        // Set up ctrl-c handler that sends to our internal shutdown channel
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received CTRL+C signal, shutting down");
                    let _ = shutdown_tx.send(()).await;
                }
                Err(e) => {
                    warn!(error = %e, "Unable to listen for CTRL+C");
                    // Dropping the sender would stop the server
                    let _keep = shutdown_tx;
                    std::future::pending::<()>().await;
                }
            }
        });

        bound.run_with_shutdown(shutdown_rx).await
    }
}

/// A server whose listener is open but not yet accepting
pub struct BoundServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    sizes: QueueSizes,
    shutdown_timeout: Duration,
    shutdown: Link,
    ctx: Arc<SessionContext>,
}

impl BoundServer {
    /// Address actually bound, useful when the configured port was 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.ctx.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.ctx.metrics
    }

    /// Accept connections forever
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown_rx` yields or its sender is dropped
    pub async fn run_with_shutdown(self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        self.run_until(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
    }

    /// Connections still running when `shutdown_timeout` expires are aborted.
    /// They are unregistered and counted as closed, but their kick callback
    /// does not run.
    async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut sessions = JoinSet::new();
        let mut live: Vec<Arc<Connection>> = Vec::new();
        tokio::pin!(shutdown);

        // Server main loop with graceful shutdown
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(
                        connections = sessions.len(),
                        "Shutting down server. Waiting for connections to close..."
                    );
                    break;
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => live.push(self.accept(&mut sessions, stream, peer)),
                    Err(e) => {
                        // A failed accept never stops the listener
                        self.ctx.metrics.connection_error();
                        error!(error = %e, "{}", ERR_ACCEPT_FAILED);
                    }
                },

                // Reap finished connections so the set does not grow unbounded
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {
                    live.retain(|conn| !conn.is_terminated());
                }
            }
        }

        drop(self.listener);
        self.shutdown.cancel();

        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = sessions.len(),
                "Shutdown timeout reached, aborting remaining connections"
            );
            sessions.abort_all();
            while sessions.join_next().await.is_some() {}

            // An aborted session never reached its own cleanup
            for conn in live.iter().filter(|conn| !conn.is_terminated()) {
                self.ctx.registry.unregister_if(conn);
                self.ctx.metrics.connection_closed();
                conn.mark_terminated();
            }
        } else {
            info!("All connections closed, shutting down");
        }

        self.ctx.metrics.log_metrics();
        Ok(())
    }

    fn accept(
        &self,
        sessions: &mut JoinSet<()>,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Arc<Connection> {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
        }
        let local = stream.local_addr().unwrap_or(self.local_addr);

        let (conn, queues) = Connection::new(peer, local, self.sizes, self.shutdown.child());
        self.ctx.metrics.connection_established();
        info!(%peer, "Connection accepted");

        sessions.spawn(run_session(stream, conn.clone(), queues, self.ctx.clone()));
        conn
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::error::NetworkError;
    use crate::protocol::observer::Callbacks;

    fn loopback() -> ServerConfig {
        ServerConfig {
            address: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let config = ServerConfig {
            sender_queue_size: 0,
            ..loopback()
        };
        let result = Server::new(config, Callbacks::new(|_, _| {})).bind().await;
        assert!(matches!(result, Err(NetworkError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_bind_reports_ephemeral_port() {
        let bound = Server::new(loopback(), Callbacks::new(|_, _| {}))
            .bind()
            .await
            .unwrap();
        assert_ne!(bound.local_addr().port(), 0);
        assert!(bound.registry().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_with_no_connections() {
        let bound = Server::new(loopback(), Callbacks::new(|_, _| {}))
            .bind()
            .await
            .unwrap();
        let (tx, rx) = mpsc::channel(1);
        let server = tokio::spawn(bound.run_with_shutdown(rx));

        tx.send(()).await.unwrap();
        let stopped = tokio::time::timeout(Duration::from_secs(2), server).await;
        assert!(stopped.unwrap().unwrap().is_ok());
    }
}
