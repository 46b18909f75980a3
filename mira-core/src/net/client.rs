//! Viewer-side receiver wiring.
//!
//! `MirrorClient` glues the connection manager to a `CanvasSession`:
//! every reconnect gets a fresh session (canvas placeholder, sequence
//! expectation, decoders all reset), the first action on a new
//! connection is a resync request, and canvas snapshots plus rolling
//! stats are published on watch channels for whatever renders them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use crate::config::SessionConfig;
use crate::error::MirrorError;
use crate::input::InputEvent;
use crate::net::manager::{BoxedDialer, ConnectionManager, LinkEvent};
use crate::net::queue::PushOutcome;
use crate::net::status::LinkStatus;
use crate::stream::codec::{FrameCodec, TileCodec};
use crate::stream::receiver::CanvasSession;
use crate::stream::types::SessionClock;
use crate::wire::WireFrame;

// ── Published state ──────────────────────────────────────────────

/// An immutable copy of the canvas for rendering.
#[derive(Debug, Clone, Default)]
pub struct CanvasSnapshot {
    pub width: u16,
    pub height: u16,
    /// False until the first keyframe of the connection.
    pub ready: bool,
    /// Tight row-major RGB, `width * height * 3` bytes.
    pub pixels: Vec<u8>,
}

/// Rolling per-connection statistics.
#[derive(Debug, Clone, Default)]
pub struct ViewerStats {
    /// Smoothed frames per second over the last 60 arrivals.
    pub fps: f64,
    /// Frames received since the client started.
    pub total_frames: u64,
    /// Compressed bytes received since the client started.
    pub total_bytes: u64,
    /// Most recent latency probe in milliseconds.
    pub last_latency_ms: u32,
}

// ── MirrorClient ─────────────────────────────────────────────────

/// Reconnecting viewer endpoint.
pub struct MirrorClient {
    manager: ConnectionManager,
    config: SessionConfig,
    tile_codec: Arc<dyn TileCodec>,
    frame_codec: Arc<dyn FrameCodec>,
    canvas_tx: watch::Sender<CanvasSnapshot>,
    canvas_rx: watch::Receiver<CanvasSnapshot>,
    stats_tx: watch::Sender<ViewerStats>,
    stats_rx: watch::Receiver<ViewerStats>,
    /// Sequence counter for viewer-originated frames, reset per
    /// connection.
    out_seq: AtomicU32,
    clock: SessionClock,
}

impl MirrorClient {
    /// Create a client around an arbitrary dialer.
    pub fn new(
        dialer: BoxedDialer,
        config: SessionConfig,
        tile_codec: Arc<dyn TileCodec>,
        frame_codec: Arc<dyn FrameCodec>,
    ) -> Self {
        let manager = ConnectionManager::new(dialer, &config);
        let (canvas_tx, canvas_rx) = watch::channel(CanvasSnapshot::default());
        let (stats_tx, stats_rx) = watch::channel(ViewerStats::default());
        Self {
            manager,
            config,
            tile_codec,
            frame_codec,
            canvas_tx,
            canvas_rx,
            stats_tx,
            stats_rx,
            out_seq: AtomicU32::new(0),
            clock: SessionClock::start(),
        }
    }

    /// Convenience constructor dialing a `ws://` URL.
    pub fn with_ws_url(
        url: String,
        config: SessionConfig,
        tile_codec: Arc<dyn TileCodec>,
        frame_codec: Arc<dyn FrameCodec>,
    ) -> Self {
        let dialer: BoxedDialer = Box::new(move || {
            let url = url.clone();
            Box::pin(async move { crate::net::ws::connect(&url).await })
        });
        Self::new(dialer, config, tile_codec, frame_codec)
    }

    /// Latest canvas snapshot whenever it changes.
    pub fn canvas_receiver(&self) -> watch::Receiver<CanvasSnapshot> {
        self.canvas_rx.clone()
    }

    /// Rolling statistics.
    pub fn stats_receiver(&self) -> watch::Receiver<ViewerStats> {
        self.stats_rx.clone()
    }

    /// Connection status transitions.
    pub fn status_receiver(&self) -> watch::Receiver<LinkStatus> {
        self.manager.status_receiver()
    }

    /// Per-frame latency reports in milliseconds.
    pub fn latency_receiver(&self) -> watch::Receiver<u32> {
        self.manager.latency_receiver()
    }

    /// Forward an input event to the host.
    pub fn send_input(&self, event: &InputEvent) -> Result<PushOutcome, MirrorError> {
        let payload = event.encode()?;
        let frame = WireFrame::Input {
            seq: self.out_seq.fetch_add(1, Ordering::SeqCst),
            ts: self.clock.now_ms(),
            payload,
        };
        self.manager.send(&frame)
    }

    /// Stop the client. Idempotent.
    pub fn stop(&self) {
        self.manager.stop();
    }

    /// Run until `stop()` or a terminal handshake failure.
    pub async fn run(&self) {
        let mut session: Option<CanvasSession> = None;
        let mut arrivals: VecDeque<Instant> = VecDeque::with_capacity(64);
        let mut stats = ViewerStats::default();

        self.manager
            .run(|event| match event {
                LinkEvent::Connected => {
                    session = Some(CanvasSession::new(
                        &self.config,
                        Arc::clone(&self.tile_codec),
                        Arc::clone(&self.frame_codec),
                    ));
                    self.out_seq.store(0, Ordering::SeqCst);
                    // Ask for a keyframe straight away rather than
                    // waiting for the sender's first capture decision.
                    self.send_resync();
                }
                LinkEvent::Message(bytes) => {
                    let Some(active) = session.as_mut() else {
                        return;
                    };

                    stats.total_frames += 1;
                    stats.total_bytes += bytes.len() as u64;
                    arrivals.push_back(Instant::now());
                    if arrivals.len() > 60 {
                        arrivals.pop_front();
                    }
                    if arrivals.len() >= 2 {
                        let span = arrivals
                            .back()
                            .unwrap()
                            .duration_since(*arrivals.front().unwrap())
                            .as_secs_f64();
                        if span > 0.0 {
                            stats.fps = (arrivals.len() - 1) as f64 / span;
                        }
                    }

                    let outcome = active.handle_message(bytes);
                    if let Some(ms) = outcome.latency_ms {
                        stats.last_latency_ms = ms;
                        self.manager.report_latency(ms);
                    }
                    if outcome.resync {
                        self.send_resync();
                    }
                    if outcome.updated {
                        let canvas = active.canvas();
                        self.canvas_tx.send_replace(CanvasSnapshot {
                            width: canvas.width(),
                            height: canvas.height(),
                            ready: canvas.ready(),
                            pixels: canvas.pixels().to_vec(),
                        });
                    }
                    self.stats_tx.send_replace(stats.clone());
                }
                LinkEvent::Disconnected => {
                    session = None;
                    arrivals.clear();
                    stats.fps = 0.0;
                    self.stats_tx.send_replace(stats.clone());
                }
            })
            .await;
    }

    fn send_resync(&self) {
        let frame = WireFrame::Resync {
            seq: self.out_seq.fetch_add(1, Ordering::SeqCst),
            ts: self.clock.now_ms(),
        };
        if let Err(e) = self.manager.send(&frame) {
            tracing::warn!(error = %e, "failed to enqueue resync");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::codec::RawTestCodec;
    use crate::stream::encoder::StreamEncoder;
    use crate::stream::types::RawFrame;
    use std::sync::Mutex;
    use std::time::Duration;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            reconnect_delay_initial_ms: 1,
            reconnect_delay_max_ms: 4,
            connect_timeout_ms: 100,
            default_width: 128,
            default_height: 64,
            ..SessionConfig::default()
        }
    }

    fn client_with_prepared_link() -> (Arc<MirrorClient>, crate::net::link::MessageLink) {
        let (local, remote) = crate::net::link::MessageLink::pair(16);
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
        let client = Arc::new(MirrorClient::new(
            dialer,
            fast_config(),
            Arc::new(RawTestCodec),
            Arc::new(RawTestCodec),
        ));
        (client, remote)
    }

    #[tokio::test]
    async fn sends_resync_on_connect_and_publishes_canvas() {
        let (client, mut remote) = client_with_prepared_link();
        let mut canvas_rx = client.canvas_receiver();

        let c = Arc::clone(&client);
        let task = tokio::spawn(async move { c.run().await });

        // First thing on the wire is the connect-time resync.
        let first = tokio::time::timeout(Duration::from_secs(2), remote.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            WireFrame::decode(&first).unwrap(),
            WireFrame::Resync { seq: 0, .. }
        ));

        // Serve a keyframe; the canvas snapshot appears.
        let mut enc = StreamEncoder::new(
            128,
            64,
            &fast_config(),
            Arc::new(RawTestCodec),
            Arc::new(RawTestCodec),
        );
        let key = enc
            .encode_frame(&RawFrame::solid(128, 64, [255, 0, 0]))
            .unwrap();
        remote.send(key.encode().unwrap()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                canvas_rx.changed().await.unwrap();
                if canvas_rx.borrow().ready {
                    break;
                }
            }
        })
        .await
        .unwrap();

        {
            let snap = canvas_rx.borrow();
            assert_eq!((snap.width, snap.height), (128, 64));
            assert!(snap.pixels.chunks_exact(3).all(|p| p == [255, 0, 0]));
        }
        let stats = client.stats_receiver().borrow().clone();
        assert!(stats.total_frames >= 1);
        assert!(stats.total_bytes > 0);

        client.stop();
        client.stop(); // idempotent
        task.await.unwrap();
        assert_eq!(*client.status_receiver().borrow(), LinkStatus::Disconnected);
    }

    #[tokio::test]
    async fn input_events_reach_the_wire() {
        let (client, mut remote) = client_with_prepared_link();
        let c = Arc::clone(&client);
        let task = tokio::spawn(async move { c.run().await });

        // Wait for connect (the resync proves it).
        let _resync = tokio::time::timeout(Duration::from_secs(2), remote.recv())
            .await
            .unwrap()
            .unwrap();

        client
            .send_input(&InputEvent::MouseMove { x: 5, y: 6 })
            .unwrap();
        let bytes = tokio::time::timeout(Duration::from_secs(2), remote.recv())
            .await
            .unwrap()
            .unwrap();
        match WireFrame::decode(&bytes).unwrap() {
            WireFrame::Input { payload, .. } => {
                assert_eq!(
                    InputEvent::decode(&payload).unwrap(),
                    InputEvent::MouseMove { x: 5, y: 6 }
                );
            }
            other => panic!("expected input frame, got {other:?}"),
        }

        client.stop();
        task.await.unwrap();
    }
}
