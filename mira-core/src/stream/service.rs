//! Sender-side mirror service: one cooperative task per connection.
//!
//! Ticks the capture interval, pulls a frame from the source, runs the
//! delta encoder inline, and enqueues the result on the outbound queue
//! while servicing inbound resync and input frames. Suspension points
//! are exactly: the interval timer, frame capture, transport read, and
//! transport write.

use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::MirrorError;
use crate::input::InputEvent;
use crate::net::link::MessageLink;
use crate::net::queue::{OutboundQueue, PushOutcome};
use crate::stream::codec::{FrameCodec, TileCodec};
use crate::stream::encoder::StreamEncoder;
use crate::stream::source::FrameSource;
use crate::stream::types::RawFrame;
use crate::wire::WireFrame;

/// Per-connection sender pipeline.
pub struct MirrorService<S: FrameSource> {
    source: S,
    encoder: StreamEncoder,
    queue: Arc<OutboundQueue>,
    cancel: CancellationToken,
    config: SessionConfig,
    input_tx: Option<tokio::sync::mpsc::Sender<InputEvent>>,
}

impl<S: FrameSource> MirrorService<S> {
    /// Build a service for one connection. All state (fingerprint
    /// cache, sequence counter, queue) is private to this connection.
    pub fn new(
        source: S,
        config: SessionConfig,
        tile_codec: Arc<dyn TileCodec>,
        frame_codec: Arc<dyn FrameCodec>,
    ) -> Self {
        let (width, height) = source.geometry();
        let encoder = StreamEncoder::new(width, height, &config, tile_codec, frame_codec);
        let queue = Arc::new(OutboundQueue::new(config.outbound_high_water));
        Self {
            source,
            encoder,
            queue,
            cancel: CancellationToken::new(),
            config,
            input_tx: None,
        }
    }

    /// Forward decoded input events to this channel. Events are
    /// dropped, not buffered, if the host cannot keep up.
    pub fn with_input_sink(mut self, tx: tokio::sync::mpsc::Sender<InputEvent>) -> Self {
        self.input_tx = Some(tx);
        self
    }

    /// A handle that stops the service from another task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The outbound queue (exposed for tests and metrics).
    pub fn queue(&self) -> Arc<OutboundQueue> {
        Arc::clone(&self.queue)
    }

    /// Run the capture/encode/send loop until cancellation or
    /// transport loss.
    pub async fn run(mut self, link: MessageLink) -> Result<(), MirrorError> {
        let (tx, mut rx) = link.split();
        let mut ticker = tokio::time::interval(self.config.capture_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            geometry = ?self.source.geometry(),
            tile = self.config.tile,
            interval_ms = self.config.capture_interval_ms,
            "mirror service started"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("mirror service stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    let raw = self.source.next_frame().await?;
                    let (width, height) = self.source.geometry();
                    let frame = RawFrame::new(width, height, raw)?;
                    match self.encoder.encode_frame(&frame) {
                        Ok(wire) => match self.queue.push(&wire) {
                            Ok(PushOutcome::Enqueued) => {}
                            Ok(PushOutcome::DroppedOldest) => {
                                debug!("outbound queue over high water; shed oldest delta");
                            }
                            Ok(PushOutcome::RejectedNew) => {
                                debug!(seq = wire.seq(), "outbound queue saturated; frame dropped");
                            }
                            Err(e) => warn!(error = %e, "failed to serialize frame"),
                        },
                        Err(e) => {
                            // Cache is already invalidated; the next
                            // capture produces a keyframe.
                            warn!(error = %e, "frame encode failed");
                        }
                    }
                }
                msg = rx.recv() => match msg {
                    None => return Err(MirrorError::TransportClosed),
                    Some(bytes) => self.handle_control(&bytes),
                },
                bytes = self.queue.pop() => {
                    if tx.send(bytes).await.is_err() {
                        return Err(MirrorError::TransportClosed);
                    }
                }
            }
        }
    }

    fn handle_control(&mut self, bytes: &[u8]) {
        match WireFrame::decode(bytes) {
            Ok(WireFrame::Resync { seq, .. }) => {
                debug!(seq, "resync requested; scheduling keyframe");
                self.encoder.request_keyframe();
            }
            Ok(WireFrame::Input { payload, .. }) => match InputEvent::decode(&payload) {
                Ok(event) => {
                    if let Some(tx) = &self.input_tx {
                        if tx.try_send(event).is_err() {
                            debug!("input sink full; event dropped");
                        }
                    }
                }
                Err(e) => warn!(error = %e, "undecodable input payload"),
            },
            Ok(other) => {
                debug!(kind = other.kind(), "ignoring unexpected frame from viewer");
            }
            Err(e) => warn!(error = %e, "malformed control frame"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
