//! Per-tile content fingerprints.
//!
//! A tile's fingerprint is a BLAKE3 digest over its raw RGB bytes in
//! row-major order. Digests only ever detect change — they are never
//! sent on the wire.

use crate::stream::grid::TileGrid;

/// Fixed-width tile digest.
pub type TileDigest = [u8; 32];

/// Digest the raw pixel bytes of one tile.
pub fn digest_tile(rgb: &[u8]) -> TileDigest {
    *blake3::hash(rgb).as_bytes()
}

/// Mapping from every grid cell to `absent` or the digest of the tile
/// content most recently **transmitted** for that cell.
///
/// The cache is refreshed only after an emission succeeds, so a cell
/// whose encode failed (or that a delta skipped) keeps its previous
/// digest and stays eligible for retransmission.
#[derive(Debug, Clone)]
pub struct FingerprintCache {
    cols: u16,
    cells: Vec<Option<TileDigest>>,
}

impl FingerprintCache {
    /// An all-absent cache sized for `grid`.
    pub fn new(grid: &TileGrid) -> Self {
        Self {
            cols: grid.cols(),
            cells: vec![None; grid.len()],
        }
    }

    fn index(&self, tx: u16, ty: u16) -> usize {
        ty as usize * self.cols as usize + tx as usize
    }

    /// Digest stored for cell `(tx, ty)`, if any.
    pub fn get(&self, tx: u16, ty: u16) -> Option<&TileDigest> {
        self.cells[self.index(tx, ty)].as_ref()
    }

    /// Store the digest for cell `(tx, ty)`.
    pub fn put(&mut self, tx: u16, ty: u16, digest: TileDigest) {
        let i = self.index(tx, ty);
        self.cells[i] = Some(digest);
    }

    /// Drop every stored digest.
    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = None);
    }

    /// Number of populated cells.
    pub fn populated(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }
}

// ── Tests ────────────────────────────────────────────────────────
