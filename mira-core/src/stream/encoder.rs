//! Sender pipeline head: plan, encode, serialize.
//!
//! `StreamEncoder` turns each captured frame into exactly one wire
//! frame. The fingerprint cache is committed only after the encode that
//! covers it succeeded; a tile codec failure discards the partial delta
//! and falls back to a keyframe (one codec attempt per tile per frame,
//! no retries).

use std::sync::Arc;

use tracing::warn;

use crate::config::SessionConfig;
use crate::error::MirrorError;
use crate::stream::codec::{FrameCodec, TileCodec};
use crate::stream::grid::TileGrid;
use crate::stream::planner::{DeltaPlanner, FramePlan, PlanDecision};
use crate::stream::types::{RawFrame, SessionClock};
use crate::wire::{TilePatch, WireFrame};

/// Per-connection encoder state for the sender pipeline.
pub struct StreamEncoder {
    grid: TileGrid,
    planner: DeltaPlanner,
    tile_codec: Arc<dyn TileCodec>,
    frame_codec: Arc<dyn FrameCodec>,
    clock: SessionClock,
    seq: u32,
}

impl StreamEncoder {
    /// Create an encoder for a fixed session geometry.
    pub fn new(
        width: u16,
        height: u16,
        config: &SessionConfig,
        tile_codec: Arc<dyn TileCodec>,
        frame_codec: Arc<dyn FrameCodec>,
    ) -> Self {
        let grid = TileGrid::new(width, height, config.tile);
        let planner = DeltaPlanner::new(&grid, config.fallback_threshold);
        Self {
            grid,
            planner,
            tile_codec,
            frame_codec,
            clock: SessionClock::start(),
            seq: 0,
        }
    }

    /// The session tile grid.
    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    /// Service an inbound resync request: the next frame will be a
    /// keyframe.
    pub fn request_keyframe(&mut self) {
        self.planner.invalidate();
    }

    /// Encode one captured frame into its wire form.
    ///
    /// On a tile codec failure the partial delta is discarded and a
    /// keyframe is emitted for the same capture. If the frame codec
    /// fails too, the error surfaces and the next call produces a
    /// keyframe.
    pub fn encode_frame(&mut self, frame: &RawFrame) -> Result<WireFrame, MirrorError> {
        if (frame.width, frame.height) != (self.grid.width(), self.grid.height()) {
            return Err(MirrorError::GeometryMismatch {
                expected_w: self.grid.width(),
                expected_h: self.grid.height(),
                actual_w: frame.width,
                actual_h: frame.height,
            });
        }

        let plan = self.planner.plan(frame, &self.grid);
        match plan.decision {
            PlanDecision::Empty => {
                let (seq, ts) = self.stamp();
                Ok(WireFrame::Empty { seq, ts })
            }
            PlanDecision::Keyframe => self.encode_keyframe(frame, plan),
            PlanDecision::Delta(ref rects) => {
                let mut tiles = Vec::with_capacity(rects.len());
                for rect in rects {
                    let rgb = frame.crop(rect);
                    match self.tile_codec.encode(&rgb, rect.w, rect.h) {
                        Ok(data) => tiles.push(TilePatch {
                            tx: rect.tx,
                            ty: rect.ty,
                            width: rect.w,
                            height: rect.h,
                            data,
                        }),
                        Err(e) => {
                            // Discard the partial delta and fall back.
                            warn!(tile = ?(rect.tx, rect.ty), error = %e, "tile encode failed; falling back to keyframe");
                            self.planner.invalidate();
                            let plan = self.planner.plan(frame, &self.grid);
                            return self.encode_keyframe(frame, plan);
                        }
                    }
                }
                self.planner.commit(&plan);
                let (seq, ts) = self.stamp();
                Ok(WireFrame::Delta { seq, ts, tiles })
            }
        }
    }

    fn encode_keyframe(
        &mut self,
        frame: &RawFrame,
        plan: FramePlan,
    ) -> Result<WireFrame, MirrorError> {
        match self
            .frame_codec
            .encode(&frame.data, frame.width, frame.height)
        {
            Ok(payload) => {
                self.planner.commit(&plan);
                let (seq, ts) = self.stamp();
                Ok(WireFrame::Keyframe {
                    seq,
                    ts,
                    width: frame.width,
                    height: frame.height,
                    tile: self.grid.tile(),
                    payload,
                })
            }
            Err(e) => {
                self.planner.invalidate();
                Err(e)
            }
        }
    }

    fn stamp(&mut self) -> (u32, u32) {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        (seq, self.clock.now_ms())
    }
}

// ── Tests ────────────────────────────────────────────────────────
