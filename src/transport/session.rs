//! Per-connection task topology shared by the server and the client.
//!
//! The receive loop is used by both sides. The send and dispatch loops, and
//! the supervisor that joins all three, belong to server connections.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

use crate::core::codec::FrameCodec;
use crate::error::constants::{ERR_CALLBACK_PANIC, ERR_CONNECTION_CLOSED};
use crate::error::NetworkError;
use crate::protocol::message::{Command, Message};
use crate::protocol::observer::{panic_message, ConnectionObserver};
use crate::transport::connection::{Connection, ConnectionQueues};
use crate::transport::link::Link;
use crate::transport::registry::SessionRegistry;
use crate::utils::metrics::Metrics;
use crate::utils::timeout::with_deadline;

/// Everything a server connection's tasks need besides the connection itself
pub(crate) struct SessionContext {
    pub observer: Arc<dyn ConnectionObserver>,
    pub registry: Arc<SessionRegistry>,
    pub metrics: Arc<Metrics>,
    pub read_deadline: Duration,
    pub write_deadline: Duration,
    pub tick: Option<Duration>,
    pub max_body_size: Option<usize>,
}

/// Supervise one accepted connection until all of its tasks have exited
#[instrument(skip_all, fields(peer = %conn.key()))]
pub(crate) async fn run_session(
    stream: TcpStream,
    conn: Arc<Connection>,
    queues: ConnectionQueues,
    ctx: Arc<SessionContext>,
) {
    ctx.registry.register(conn.clone());

    let ConnectionQueues {
        outbound,
        inbound,
        mailbox,
    } = queues;
    let (reader, writer) = stream.into_split();

    let mut tasks = JoinSet::new();
    tasks.spawn(
        receive_loop(
            reader,
            conn.mailbox_sender(),
            conn.link().clone(),
            ctx.read_deadline,
            ctx.max_body_size,
            ctx.metrics.clone(),
        )
        .in_current_span(),
    );
    tasks.spawn(
        send_loop(
            writer,
            outbound,
            conn.link().clone(),
            ctx.write_deadline,
            ctx.metrics.clone(),
        )
        .in_current_span(),
    );

    // Socket I/O is already running so sends from on_accept drain under the write deadline
    guarded("accept", &ctx.metrics, ctx.observer.on_accept(&conn)).await;
    tasks.spawn(dispatch_loop(conn.clone(), mailbox, inbound, ctx.clone()).in_current_span());

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            // A task died outside the callback guard; take the others down too
            error!(error = %e, "Connection task failed");
            conn.close();
        }
    }

    // The dispatch loop may not have run its teardown if it was the task that failed
    ctx.registry.unregister_if(&conn);
    ctx.metrics.connection_closed();
    conn.mark_terminated();
    info!("Connection closed");
}

/// Read frames until EOF, an error, or the link closes.
///
/// Each decoded frame is pushed to `mailbox`, waiting while it is full.
pub(crate) async fn receive_loop<R>(
    reader: R,
    mailbox: mpsc::Sender<Message>,
    link: Link,
    read_deadline: Duration,
    max_body_size: Option<usize>,
    metrics: Arc<Metrics>,
) where
    R: AsyncRead + Unpin,
{
    let _close = link.close_on_drop();
    let codec = match max_body_size {
        Some(max) => FrameCodec::with_max_body(max),
        None => FrameCodec::new(),
    };
    let mut frames = FramedRead::new(reader, codec);

    loop {
        if link.is_cancelled() {
            break;
        }

        let next = tokio::select! {
            _ = link.cancelled() => break,
            next = with_deadline(frames.next(), read_deadline) => next,
        };

        let frame = match next {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) if e.is_protocol_error() => {
                metrics.protocol_error();
                warn!(error = %e, "Rejecting frame");
                break;
            }
            Ok(Some(Err(e))) => {
                metrics.connection_error();
                debug!(error = %e, "Read failed");
                break;
            }
            Ok(None) => {
                debug!("Peer closed the connection");
                break;
            }
            Err(_) => {
                debug!(deadline = ?read_deadline, "Read deadline exceeded");
                break;
            }
        };

        metrics.message_received(frame.encoded_len() as u64);
        trace!(method = frame.method, bytes = frame.body.len(), "Frame received");

        // Blocking here is the backpressure path when the mailbox is full
        tokio::select! {
            _ = link.cancelled() => break,
            pushed = mailbox.send(Message::from(frame)) => {
                if pushed.is_err() {
                    break;
                }
            }
        }
    }
}

/// Write queued messages in order until the link closes or a write fails
pub(crate) async fn send_loop<W>(
    writer: W,
    mut outbound: mpsc::Receiver<Message>,
    link: Link,
    write_deadline: Duration,
    metrics: Arc<Metrics>,
) where
    W: AsyncWrite + Unpin,
{
    let _close = link.close_on_drop();
    let mut sink = FramedWrite::new(writer, FrameCodec::new());

    loop {
        let message = tokio::select! {
            _ = link.cancelled() => break,
            message = outbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        if message.command() != Command::Send {
            continue;
        }

        let frame = message.to_frame();
        let len = frame.encoded_len() as u64;
        let written = tokio::select! {
            _ = link.cancelled() => break,
            written = with_deadline(sink.send(frame), write_deadline) => written,
        };

        match written {
            Ok(Ok(())) => metrics.message_sent(len),
            Ok(Err(e @ NetworkError::PayloadTooLarge { .. })) => {
                // Nothing was written, the stream is still in sync
                warn!(error = %e, "Dropping unencodable frame");
            }
            Ok(Err(e)) => {
                metrics.connection_error();
                debug!(error = %e, "Write failed");
                break;
            }
            Err(_) => {
                debug!(deadline = ?write_deadline, "Write deadline exceeded");
                break;
            }
        }
    }
}

/// Deliver messages and ticks to the observer, then run teardown once
async fn dispatch_loop(
    conn: Arc<Connection>,
    mut mailbox: mpsc::Receiver<Message>,
    mut inbound: mpsc::Receiver<Message>,
    ctx: Arc<SessionContext>,
) {
    let link = conn.link().clone();
    let tick = ctx.tick.filter(|_| ctx.observer.handles_tick());
    let period = tick.unwrap_or(Duration::MAX);

    // Without a tick the timer stays pending forever and its branch is disabled
    let timer = sleep(period);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            _ = link.cancelled() => break,

            received = mailbox.recv() => match received {
                Some(message) if message.command() == Command::Kick => {
                    debug!("Kick requested");
                    break;
                }
                Some(message) => {
                    guarded("message", &ctx.metrics, ctx.observer.on_message(&conn, message)).await;
                }
                None => break,
            },

            Some(message) = inbound.recv() => {
                guarded("message", &ctx.metrics, ctx.observer.on_message(&conn, message)).await;
            }

            _ = &mut timer, if tick.is_some() => {
                guarded("tick", &ctx.metrics, ctx.observer.on_tick(&conn)).await;
                // Re-armed after the callback so a slow tick never queues up behind itself
                timer.as_mut().reset(Instant::now() + period);
            }
        }
    }

    // Teardown: closing the link makes the receive and send loops drop the socket halves
    link.cancel();
    ctx.registry.unregister_if(&conn);
    guarded("kick", &ctx.metrics, ctx.observer.on_kick(&conn)).await;
    debug!(reason = ERR_CONNECTION_CLOSED, "Dispatch loop finished");
}

/// Run one application callback, containing any panic it raises
pub(crate) async fn guarded<F>(callback: &'static str, metrics: &Metrics, fut: F)
where
    F: Future<Output = ()>,
{
    if let Err(payload) = AssertUnwindSafe(fut).catch_unwind().await {
        metrics.callback_panic();
        error!(
            callback,
            panic = %panic_message(payload.as_ref()),
            "{}",
            ERR_CALLBACK_PANIC
        );
    }
}
