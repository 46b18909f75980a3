//! Per-frame emission decision: keyframe, delta, or empty.
//!
//! The planner digests every tile of a captured frame, diffs against the
//! fingerprint cache, and decides what to put on the wire:
//!
//! - cache invalid (session start, resync request, prior codec failure)
//!   → **keyframe**;
//! - more than `fallback_threshold · total` tiles changed → **keyframe**
//!   (cheaper than shipping most of the grid as tiles);
//! - nothing changed → **empty**;
//! - otherwise → **delta** carrying the changed tiles in raster order.
//!
//! Cache mutation is split from planning: the caller `commit`s a plan
//! only after the corresponding encode succeeded, so the cache always
//! reflects exactly what was transmitted.

use crate::stream::fingerprint::{digest_tile, FingerprintCache, TileDigest};
use crate::stream::grid::TileGrid;
use crate::stream::types::{RawFrame, TileRect};

// ── FramePlan ────────────────────────────────────────────────────

/// What to emit for one captured frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanDecision {
    /// Transmit the full frame.
    Keyframe,
    /// Transmit only these tiles, in raster order.
    Delta(Vec<TileRect>),
    /// Transmit a bare sequence/timestamp marker.
    Empty,
}

/// A decision plus the digests to store once the emission succeeds.
#[derive(Debug, Clone)]
pub struct FramePlan {
    pub decision: PlanDecision,
    /// `(tx, ty, digest)` for every cell the emission will cover.
    digests: Vec<(u16, u16, TileDigest)>,
}

impl FramePlan {
    /// Cells this plan will refresh on commit.
    pub fn refresh_count(&self) -> usize {
        self.digests.len()
    }
}

// ── DeltaPlanner ─────────────────────────────────────────────────

/// Stateful planner owning the fingerprint cache.
#[derive(Debug)]
pub struct DeltaPlanner {
    cache: FingerprintCache,
    fallback_threshold: f64,
    /// When false the cache contents are meaningless and the next plan
    /// must be a keyframe.
    cache_valid: bool,
}

impl DeltaPlanner {
    /// Create a planner for `grid` with the given fallback threshold.
    pub fn new(grid: &TileGrid, fallback_threshold: f64) -> Self {
        Self {
            cache: FingerprintCache::new(grid),
            fallback_threshold,
            cache_valid: false,
        }
    }

    /// Invalidate the cache, forcing the next plan to be a keyframe.
    ///
    /// Triggered by connection start, an explicit resync request, or a
    /// codec failure on any tile.
    pub fn invalidate(&mut self) {
        self.cache.clear();
        self.cache_valid = false;
    }

    /// Whether the next plan is forced to a keyframe.
    pub fn needs_keyframe(&self) -> bool {
        !self.cache_valid
    }

    /// Decide what to emit for `frame`. Does not mutate the cache.
    pub fn plan(&self, frame: &RawFrame, grid: &TileGrid) -> FramePlan {
        let total = grid.len();

        // Digest every tile in raster order.
        let mut all: Vec<(TileRect, TileDigest)> = Vec::with_capacity(total);
        for rect in grid.iter() {
            let digest = digest_tile(&frame.crop(&rect));
            all.push((rect, digest));
        }

        if !self.cache_valid {
            return FramePlan {
                decision: PlanDecision::Keyframe,
                digests: all.iter().map(|(r, d)| (r.tx, r.ty, *d)).collect(),
            };
        }

        let changed: Vec<&(TileRect, TileDigest)> = all
            .iter()
            .filter(|(rect, digest)| self.cache.get(rect.tx, rect.ty) != Some(digest))
            .collect();

        if changed.is_empty() {
            return FramePlan {
                decision: PlanDecision::Empty,
                digests: Vec::new(),
            };
        }

        if changed.len() as f64 > self.fallback_threshold * total as f64 {
            return FramePlan {
                decision: PlanDecision::Keyframe,
                digests: all.iter().map(|(r, d)| (r.tx, r.ty, *d)).collect(),
            };
        }

        FramePlan {
            decision: PlanDecision::Delta(changed.iter().map(|(r, _)| *r).collect()),
            digests: changed.iter().map(|(r, d)| (r.tx, r.ty, *d)).collect(),
        }
    }

    /// Apply a plan's digest refresh after the emission succeeded.
    ///
    /// A keyframe refreshes every cell, a delta only the cells it
    /// carried, an empty frame nothing.
    pub fn commit(&mut self, plan: &FramePlan) {
        for (tx, ty, digest) in &plan.digests {
            self.cache.put(*tx, *ty, *digest);
        }
        if matches!(plan.decision, PlanDecision::Keyframe) {
            self.cache_valid = true;
        }
    }

    /// Read access to the cache (used by tests to assert the
    /// transmitted-content invariant).
    pub fn cache(&self) -> &FingerprintCache {
        &self.cache
    }
}

// ── Tests ────────────────────────────────────────────────────────
