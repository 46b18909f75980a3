//! Connection lifecycle management.
//!
//! The manager owns the dial/reconnect loop and the outbound queue,
//! and publishes status and latency on watch channels so host UI code
//! can subscribe from any task. Reconnection backs off exponentially
//! and resets on success; a handshake rejection is terminal. `stop()`
//! is idempotent and prompt — it cancels pending I/O and leaves the
//! manager disconnected.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::MirrorError;
use crate::net::backoff::ReconnectBackoff;
use crate::net::link::MessageLink;
use crate::net::queue::{OutboundQueue, PushOutcome};
use crate::net::status::LinkStatus;
use crate::wire::WireFrame;

/// Factory producing one connect attempt per call.
pub type BoxedDialer = Box<
    dyn Fn() -> Pin<Box<dyn Future<Output = Result<MessageLink, MirrorError>> + Send>>
        + Send
        + Sync,
>;

/// Connection-scoped events delivered to the session handler.
#[derive(Debug)]
pub enum LinkEvent<'a> {
    /// A fresh connection is up; per-connection state must be reset.
    Connected,
    /// One whole inbound message.
    Message(&'a [u8]),
    /// The connection ended; a reconnect attempt follows unless the
    /// manager is stopping.
    Disconnected,
}

/// Drives connect → session → reconnect for one endpoint.
pub struct ConnectionManager {
    dialer: BoxedDialer,
    connect_timeout: Duration,
    backoff_initial: Duration,
    backoff_max: Duration,
    queue: Arc<OutboundQueue>,
    status_tx: watch::Sender<LinkStatus>,
    status_rx: watch::Receiver<LinkStatus>,
    latency_tx: watch::Sender<u32>,
    latency_rx: watch::Receiver<u32>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    /// Create a manager; nothing happens until [`run`](Self::run).
    pub fn new(dialer: BoxedDialer, config: &SessionConfig) -> Self {
        let (status_tx, status_rx) = watch::channel(LinkStatus::Disconnected);
        let (latency_tx, latency_rx) = watch::channel(0);
        Self {
            dialer,
            connect_timeout: config.connect_timeout(),
            backoff_initial: config.reconnect_delay_initial(),
            backoff_max: config.reconnect_delay_max(),
            queue: Arc::new(OutboundQueue::new(config.outbound_high_water)),
            status_tx,
            status_rx,
            latency_tx,
            latency_rx,
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to status transitions.
    pub fn status_receiver(&self) -> watch::Receiver<LinkStatus> {
        self.status_rx.clone()
    }

    /// Current status.
    pub fn status(&self) -> LinkStatus {
        *self.status_rx.borrow()
    }

    /// Subscribe to per-frame latency reports (milliseconds).
    pub fn latency_receiver(&self) -> watch::Receiver<u32> {
        self.latency_rx.clone()
    }

    /// Publish a latency measurement (called by the receiver pipeline
    /// for each accepted frame).
    pub fn report_latency(&self, ms: u32) {
        self.latency_tx.send_replace(ms);
    }

    /// Enqueue a frame for the writer. Applies the backpressure drop
    /// policy; returns what happened to the queue.
    pub fn send(&self, frame: &WireFrame) -> Result<PushOutcome, MirrorError> {
        self.queue.push(frame)
    }

    /// Stop the manager. Idempotent: subsequent calls are no-ops and
    /// surface no error.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.status_tx.send_replace(LinkStatus::Disconnected);
    }

    /// Whether `stop()` has been called.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run the connect/reconnect loop until `stop()` or a terminal
    /// handshake error. `handler` receives connection events and all
    /// inbound messages on this task.
    pub async fn run<F>(&self, mut handler: F)
    where
        F: FnMut(LinkEvent<'_>),
    {
        let mut backoff = ReconnectBackoff::new(self.backoff_initial, self.backoff_max);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.status_tx.send_replace(LinkStatus::Connecting);

            let attempt = tokio::time::timeout(self.connect_timeout, (self.dialer)());
            let result = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = attempt => result,
            };

            match result {
                Err(_elapsed) => {
                    debug!(timeout = ?self.connect_timeout, "connect attempt timed out");
                }
                Ok(Err(e)) if matches!(e, MirrorError::Handshake(_)) => {
                    warn!(error = %e, "terminal handshake failure; giving up");
                    self.status_tx.send_replace(LinkStatus::Failed);
                    return;
                }
                Ok(Err(e)) => {
                    debug!(error = %e, "connect attempt failed");
                }
                Ok(Ok(link)) => {
                    info!("connected");
                    backoff.reset();
                    // Frames queued against a dead connection are stale.
                    self.queue.clear();
                    self.status_tx.send_replace(LinkStatus::Connected);
                    handler(LinkEvent::Connected);

                    self.drive(link, &mut handler).await;

                    handler(LinkEvent::Disconnected);
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    info!("disconnected; will reconnect");
                }
            }

            self.status_tx.send_replace(LinkStatus::Disconnected);
            let delay = backoff.next_delay();
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.status_tx.send_replace(LinkStatus::Disconnected);
    }

    /// Pump one established connection: inbound messages to the
    /// handler, queued frames to the transport, until either side ends.
    async fn drive<F>(&self, link: MessageLink, handler: &mut F)
    where
        F: FnMut(LinkEvent<'_>),
    {
        let (tx, mut rx) = link.split();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                msg = rx.recv() => match msg {
                    None => return,
                    Some(bytes) => handler(LinkEvent::Message(&bytes)),
                },
                bytes = self.queue.pop() => {
                    if tx.send(bytes).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            reconnect_delay_initial_ms: 1,
            reconnect_delay_max_ms: 4,
            connect_timeout_ms: 50,
            ..SessionConfig::default()
        }
    }

    fn failing_dialer(counter: Arc<AtomicUsize>) -> BoxedDialer {
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(MirrorError::Other("nobody home".into())) })
        })
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let manager = Arc::new(ConnectionManager::new(
            failing_dialer(Arc::new(AtomicUsize::new(0))),
            &fast_config(),
        ));
        let m = Arc::clone(&manager);
        let task = tokio::spawn(async move { m.run(|_| {}).await });

        manager.stop();
        manager.stop();
        task.await.unwrap();
        assert_eq!(manager.status(), LinkStatus::Disconnected);
        assert!(manager.is_stopped());
    }

    #[tokio::test]
    async fn retries_until_stopped() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let manager = Arc::new(ConnectionManager::new(
            failing_dialer(Arc::clone(&attempts)),
            &fast_config(),
        ));
        let m = Arc::clone(&manager);
        let task = tokio::spawn(async move { m.run(|_| {}).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        manager.stop();
        task.await.unwrap();
        assert!(
            attempts.load(Ordering::SeqCst) >= 3,
            "expected several reconnect attempts, got {}",
            attempts.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn handshake_rejection_is_terminal() {
        let manager = ConnectionManager::new(
            Box::new(|| Box::pin(async { Err(MirrorError::Handshake("401".into())) })),
            &fast_config(),
        );
        // run() returns on its own, without stop().
        manager.run(|_| {}).await;
        assert_eq!(manager.status(), LinkStatus::Failed);
    }

    #[tokio::test]
    async fn delivers_session_events_and_outbound_frames() {
        // One prepared link; further dial attempts fail.
        let (local, mut remote) = MessageLink::pair(8);
        let links = Arc::new(Mutex::new(vec![local]));
        let dialer: BoxedDialer = Box::new(move || {
            let links = Arc::clone(&links);
            Box::pin(async move {
                links
                    .lock()
                    .unwrap()
                    .pop()
                    .ok_or_else(|| MirrorError::Other("no more links".into()))
            })
        });
        let manager = Arc::new(ConnectionManager::new(dialer, &fast_config()));

        let events = Arc::new(Mutex::new(Vec::<String>::new()));
        let m = Arc::clone(&manager);
        let ev = Arc::clone(&events);
        let task = tokio::spawn(async move {
            m.run(move |event| {
                ev.lock().unwrap().push(match event {
                    LinkEvent::Connected => "connected".into(),
                    LinkEvent::Message(bytes) => format!("msg:{}", bytes.len()),
                    LinkEvent::Disconnected => "disconnected".into(),
                });
            })
            .await
        });

        // Wait for the connection before enqueueing: the manager
        // clears stale queue contents when a connection comes up.
        let mut status = manager.status_receiver();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !status.borrow().is_connected() {
                status.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        // Inbound message reaches the handler.
        remote.send(vec![1, 2, 3]).await.unwrap();
        // Outbound frame reaches the remote side.
        manager.send(&WireFrame::Resync { seq: 0, ts: 0 }).unwrap();
        let out = tokio::time::timeout(Duration::from_secs(2), remote.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            WireFrame::decode(&out).unwrap(),
            WireFrame::Resync { .. }
        ));

        // Dropping the remote ends the session.
        drop(remote);
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.stop();
        task.await.unwrap();

        let log = events.lock().unwrap().clone();
        assert!(log.contains(&"connected".to_string()));
        assert!(log.contains(&"msg:3".to_string()));
        assert!(log.contains(&"disconnected".to_string()));
    }
}
