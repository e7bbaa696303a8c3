//! WebSocket connection task for the messaging server.
//!
//! One task per driver session. On every (re)connect it joins the room
//! keyed by the driver id, then pumps outbound frames from an `mpsc` queue
//! to the socket and inbound `receiveMessage` payloads to an `mpsc`
//! receiver. A dropped connection is retried with exponential backoff
//! (doubling from the initial delay up to the configured maximum, reset
//! after a successful join).
//!
//! The task only stops when its [`CancellationToken`] fires or the
//! [`SocketHandle`] is dropped; closing a chat view does not affect it.
//!
//! A publish resolves once its frame has been written to the socket. Frames
//! still queued when a connection drops fail instead of waiting for the
//! next connect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::channel::protocol::{parse_inbound_frame, OutboundFrame};
use crate::channel::ChannelTransport;
use crate::config::ChannelConfig;
use crate::models::message::WireMessage;
use crate::{AppError, Result};

/// Connection parameters for [`spawn_socket`].
#[derive(Debug, Clone)]
pub struct SocketSettings {
    /// `ws://` or `wss://` URL of the messaging server.
    pub url: String,
    /// Room to join on every connect.
    pub driver_id: String,
    /// First reconnect delay.
    pub initial_backoff: Duration,
    /// Reconnect delay ceiling.
    pub max_backoff: Duration,
    /// Capacity of the outbound and inbound queues.
    pub queue_capacity: usize,
}

impl SocketSettings {
    /// Build settings from configuration.
    #[must_use]
    pub fn from_config(url: &str, driver_id: &str, config: &ChannelConfig) -> Self {
        Self {
            url: url.to_owned(),
            driver_id: driver_id.to_owned(),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            queue_capacity: config.queue_capacity,
        }
    }
}

/// Next reconnect delay: double `current`, capped at `max`.
#[must_use]
pub fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

/// Longest a publish waits for its frame to be written.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// A queued frame and the publisher waiting on its write.
struct Outbound {
    frame: OutboundFrame,
    written: oneshot::Sender<Result<()>>,
}

/// Handle to the running socket task. Cancels the task on drop.
pub struct SocketHandle {
    outbound_tx: mpsc::Sender<Outbound>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl SocketHandle {
    /// Whether the room is currently joined.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Close the connection and wait for the task to exit.
    pub async fn await_completion(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }
}

impl ChannelTransport for SocketHandle {
    fn publish(
        &self,
        frame: OutboundFrame,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if !self.is_connected() {
                return Err(AppError::Channel("not connected".into()));
            }
            let (written, outcome) = oneshot::channel();
            self.outbound_tx
                .try_send(Outbound { frame, written })
                .map_err(|err| AppError::Channel(format!("outbound queue unavailable: {err}")))?;
            match tokio::time::timeout(WRITE_TIMEOUT, outcome).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(AppError::Channel("socket closed before write".into())),
                Err(_) => Err(AppError::Channel("socket write timed out".into())),
            }
        })
    }
}

/// Spawn the connection task.
///
/// Returns the handle used to publish frames and the receiver of inbound
/// chat messages.
#[must_use]
pub fn spawn_socket(
    settings: SocketSettings,
    cancel: CancellationToken,
) -> (SocketHandle, mpsc::Receiver<WireMessage>) {
    let (outbound_tx, outbound_rx) = mpsc::channel(settings.queue_capacity);
    let (inbound_tx, inbound_rx) = mpsc::channel(settings.queue_capacity);
    let connected = Arc::new(AtomicBool::new(false));

    let join_handle = tokio::spawn(
        run(
            settings,
            outbound_rx,
            inbound_tx,
            Arc::clone(&connected),
            cancel.clone(),
        )
        .instrument(info_span!("message_socket")),
    );

    (
        SocketHandle {
            outbound_tx,
            connected,
            cancel,
            join_handle: Some(join_handle),
        },
        inbound_rx,
    )
}

/// Why a connected session ended.
enum Disconnect {
    /// Reconnect after backoff.
    Dropped,
    /// Stop the task.
    Stop,
}

async fn run(
    settings: SocketSettings,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    inbound_tx: mpsc::Sender<WireMessage>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut backoff = settings.initial_backoff;

    loop {
        let attempt = tokio::select! {
            () = cancel.cancelled() => return,
            attempt = tokio_tungstenite::connect_async(settings.url.as_str()) => attempt,
        };

        let ws = match attempt {
            Ok((ws, _)) => ws,
            Err(err) => {
                warn!(%err, delay = ?backoff, "socket connect failed; retrying");
                if !sleep_or_cancel(backoff, &cancel).await {
                    return;
                }
                backoff = next_backoff(backoff, settings.max_backoff);
                continue;
            }
        };

        let (mut sink, mut stream) = ws.split();

        let joined = match OutboundFrame::Join(settings.driver_id.clone()).encode() {
            Ok(text) => sink.send(Message::Text(text.into())).await,
            Err(err) => {
                warn!(%err, "failed to encode join frame");
                return;
            }
        };
        if let Err(err) = joined {
            warn!(%err, delay = ?backoff, "join failed; retrying");
            if !sleep_or_cancel(backoff, &cancel).await {
                return;
            }
            backoff = next_backoff(backoff, settings.max_backoff);
            continue;
        }

        connected.store(true, Ordering::SeqCst);
        backoff = settings.initial_backoff;
        info!(driver_id = %settings.driver_id, "joined message room");

        let outcome = loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break Disconnect::Stop;
                }

                outbound = outbound_rx.recv() => {
                    let Some(outbound) = outbound else {
                        debug!("outbound queue closed, stopping socket");
                        break Disconnect::Stop;
                    };
                    if !write_frame(&mut sink, outbound).await {
                        break Disconnect::Dropped;
                    }
                }

                item = stream.next() => {
                    match item {
                        None => break Disconnect::Dropped,
                        Some(Err(err)) => {
                            warn!(%err, "socket read failed");
                            break Disconnect::Dropped;
                        }
                        Some(Ok(Message::Text(text))) => {
                            match parse_inbound_frame(text.as_str()) {
                                Ok(Some(message)) => {
                                    if inbound_tx.send(message).await.is_err() {
                                        debug!("inbound receiver closed, stopping socket");
                                        break Disconnect::Stop;
                                    }
                                }
                                Ok(None) => {}
                                Err(err) => warn!(%err, "skipping inbound frame"),
                            }
                        }
                        Some(Ok(Message::Close(_))) => break Disconnect::Dropped,
                        Some(Ok(_)) => {}
                    }
                }
            }
        };

        connected.store(false, Ordering::SeqCst);
        fail_queued(&mut outbound_rx);
        match outcome {
            Disconnect::Stop => {
                info!("message socket closed");
                return;
            }
            Disconnect::Dropped => {
                warn!(delay = ?backoff, "message socket dropped; reconnecting");
                if !sleep_or_cancel(backoff, &cancel).await {
                    return;
                }
                backoff = next_backoff(backoff, settings.max_backoff);
            }
        }
    }
}

/// Write one frame and report the outcome to its publisher. Returns `false`
/// when the connection is unusable.
async fn write_frame<S>(sink: &mut S, outbound: Outbound) -> bool
where
    S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let Outbound { frame, written } = outbound;
    let text = match frame.encode() {
        Ok(text) => text,
        Err(err) => {
            warn!(%err, "dropping unencodable frame");
            let _ = written.send(Err(err));
            return true;
        }
    };
    match sink.send(Message::Text(text.into())).await {
        Ok(()) => {
            let _ = written.send(Ok(()));
            true
        }
        Err(err) => {
            warn!(%err, "socket write failed");
            let _ = written.send(Err(AppError::Channel(format!("socket write failed: {err}"))));
            false
        }
    }
}

/// Fail every frame still queued for a connection that has ended.
fn fail_queued(outbound_rx: &mut mpsc::Receiver<Outbound>) {
    while let Ok(outbound) = outbound_rx.try_recv() {
        let _ = outbound
            .written
            .send(Err(AppError::Channel("connection lost before write".into())));
    }
}

/// Sleep for `delay`; returns `false` if cancelled first.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
