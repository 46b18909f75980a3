//! Receiver pipeline: wire bytes in, canvas mutations and control
//! decisions out.
//!
//! `CanvasSession` is pure with respect to I/O. It consumes one binary
//! message at a time and reports what happened, so the connection layer
//! decides how to ship the resulting resync requests. Every error kind
//! is recovered here: malformed or undecodable frames are discarded,
//! the canvas is never left half-applied, and anomalies turn into a
//! single resync request each.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::stream::canvas::{Canvas, DecodedTile};
use crate::stream::codec::{FrameCodec, TileCodec};
use crate::stream::sequence::{SeqVerdict, SequenceMonitor};
use crate::stream::types::SessionClock;
use crate::wire::WireFrame;

// ── ApplyOutcome ─────────────────────────────────────────────────

/// What a single inbound message did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// The canvas contents changed (keyframe or delta committed).
    pub updated: bool,
    /// The caller should send exactly one `Resync` to the sender.
    pub resync: bool,
    /// `now_ms − ts_ms` for the accepted frame, if one was accepted.
    pub latency_ms: Option<u32>,
}

// ── CanvasSession ────────────────────────────────────────────────

/// Per-connection receiver state: canvas, sequence expectation, codecs.
///
/// Dropped and rebuilt on every reconnect — a fresh connection resets
/// the canvas placeholder and the sequence expectation.
pub struct CanvasSession {
    canvas: Canvas,
    monitor: SequenceMonitor,
    tile_codec: Arc<dyn TileCodec>,
    frame_codec: Arc<dyn FrameCodec>,
    clock: SessionClock,
}

impl CanvasSession {
    /// Create a session with the placeholder canvas geometry from
    /// `config`.
    pub fn new(
        config: &SessionConfig,
        tile_codec: Arc<dyn TileCodec>,
        frame_codec: Arc<dyn FrameCodec>,
    ) -> Self {
        Self {
            canvas: Canvas::new(config.default_width, config.default_height),
            monitor: SequenceMonitor::new(),
            tile_codec,
            frame_codec,
            clock: SessionClock::start(),
        }
    }

    /// The receiver's canvas (for snapshotting).
    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Process one binary message from the transport.
    pub fn handle_message(&mut self, msg: &[u8]) -> ApplyOutcome {
        let frame = match WireFrame::decode(msg) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "discarding malformed frame");
                return ApplyOutcome {
                    resync: true,
                    ..Default::default()
                };
            }
        };

        match frame {
            WireFrame::Resync { .. } | WireFrame::Input { .. } => {
                // Client-to-server kinds have no business arriving here.
                debug!(kind = frame.kind(), "ignoring client-bound frame");
                ApplyOutcome::default()
            }
            WireFrame::Delta { seq, ts, ref tiles } if !self.canvas.ready() => {
                // A delta before the first keyframe is discarded without
                // advancing the sequence expectation.
                debug!(seq, n = tiles.len(), "delta before keyframe; requesting resync");
                let _ = ts;
                ApplyOutcome {
                    resync: true,
                    ..Default::default()
                }
            }
            WireFrame::Empty { seq, ts } => match self.monitor.observe(seq) {
                SeqVerdict::Stale => ApplyOutcome::default(),
                SeqVerdict::InOrder | SeqVerdict::Gap { .. } => ApplyOutcome {
                    latency_ms: Some(self.latency(ts)),
                    ..Default::default()
                },
            },
            WireFrame::Keyframe {
                seq,
                ts,
                width,
                height,
                tile,
                payload,
            } => match self.monitor.observe(seq) {
                SeqVerdict::Stale => ApplyOutcome::default(),
                SeqVerdict::InOrder | SeqVerdict::Gap { .. } => {
                    self.apply_keyframe(width, height, tile, &payload, ts)
                }
            },
            WireFrame::Delta { seq, ts, tiles } => match self.monitor.observe(seq) {
                SeqVerdict::Stale => ApplyOutcome::default(),
                verdict => {
                    // A delta across a gap may reference canvas state
                    // that never arrived: ask for a keyframe, but still
                    // apply the tiles we have.
                    let gap_resync = matches!(verdict, SeqVerdict::Gap { .. });
                    if gap_resync {
                        debug!(seq, expected = self.monitor.expected(), "delta across gap");
                    }
                    let mut outcome = self.apply_delta(&tiles, ts);
                    outcome.resync |= gap_resync;
                    outcome
                }
            },
        }
    }

    fn apply_keyframe(
        &mut self,
        width: u16,
        height: u16,
        tile: u16,
        payload: &[u8],
        ts: u32,
    ) -> ApplyOutcome {
        let image = match self.frame_codec.decode(payload) {
            Ok(img) => img,
            Err(e) => {
                warn!(error = %e, "keyframe decode failed; requesting resync");
                return ApplyOutcome {
                    resync: true,
                    latency_ms: Some(self.latency(ts)),
                    ..Default::default()
                };
            }
        };
        match self.canvas.apply_keyframe(width, height, tile, image) {
            Ok(()) => ApplyOutcome {
                updated: true,
                resync: false,
                latency_ms: Some(self.latency(ts)),
            },
            Err(e) => {
                warn!(error = %e, "keyframe rejected; requesting resync");
                ApplyOutcome {
                    resync: true,
                    latency_ms: Some(self.latency(ts)),
                    ..Default::default()
                }
            }
        }
    }

    fn apply_delta(&mut self, tiles: &[crate::wire::TilePatch], ts: u32) -> ApplyOutcome {
        // Decode every tile before touching the canvas — one codec
        // attempt per tile, and a single failure discards the frame.
        let mut decoded = Vec::with_capacity(tiles.len());
        for t in tiles {
            let image = match self.tile_codec.decode(&t.data) {
                Ok(img) => img,
                Err(e) => {
                    warn!(tile = ?(t.tx, t.ty), error = %e, "tile decode failed; requesting resync");
                    self.canvas.mark_stale();
                    return ApplyOutcome {
                        resync: true,
                        latency_ms: Some(self.latency(ts)),
                        ..Default::default()
                    };
                }
            };
            if (image.width, image.height) != (t.width, t.height) {
                warn!(
                    tile = ?(t.tx, t.ty),
                    header = ?(t.width, t.height),
                    decoded = ?(image.width, image.height),
                    "tile geometry disagrees with header; requesting resync"
                );
                self.canvas.mark_stale();
                return ApplyOutcome {
                    resync: true,
                    latency_ms: Some(self.latency(ts)),
                    ..Default::default()
                };
            }
            decoded.push(DecodedTile {
                tx: t.tx,
                ty: t.ty,
                width: t.width,
                height: t.height,
                rgb: image.rgb,
            });
        }

        match self.canvas.apply_delta(&decoded) {
            Ok(()) => ApplyOutcome {
                updated: true,
                resync: false,
                latency_ms: Some(self.latency(ts)),
            },
            Err(e) => {
                warn!(error = %e, "delta rejected; requesting resync");
                self.canvas.mark_stale();
                ApplyOutcome {
                    resync: true,
                    latency_ms: Some(self.latency(ts)),
                    ..Default::default()
                }
            }
        }
    }

    fn latency(&self, ts: u32) -> u32 {
        self.clock.now_ms().wrapping_sub(ts)
    }
}

// ── Tests ────────────────────────────────────────────────────────
