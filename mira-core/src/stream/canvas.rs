//! Receiver-side persistent canvas.
//!
//! The canvas owns a `W × H` RGB buffer. Keyframes replace it
//! wholesale; deltas paste individual tiles. Every delta is validated
//! completely — geometry, bounds, payload sizes — before the first
//! paste, so a failed frame leaves the buffer byte-identical to its
//! pre-frame state.

use crate::error::MirrorError;
use crate::stream::codec::DecodedImage;
use crate::stream::types::RawFrame;

/// A fully decoded tile ready to paste.
#[derive(Debug, Clone)]
pub struct DecodedTile {
    pub tx: u16,
    pub ty: u16,
    pub width: u16,
    pub height: u16,
    pub rgb: Vec<u8>,
}

/// Persistent RGB buffer owned by the receiver pipeline.
#[derive(Debug, Clone)]
pub struct Canvas {
    frame: RawFrame,
    tile: u16,
    /// True once a keyframe has been applied and deltas may paste.
    ready: bool,
    /// Geometry locks on the first keyframe; it is session-constant.
    geometry_locked: bool,
}

impl Canvas {
    /// A zeroed placeholder canvas at the configured default geometry.
    pub fn new(default_width: u16, default_height: u16) -> Self {
        Self {
            frame: RawFrame::solid(default_width, default_height, [0, 0, 0]),
            tile: 0,
            ready: false,
            geometry_locked: false,
        }
    }

    /// Whether a keyframe has been applied since the last reset or
    /// failure.
    pub fn ready(&self) -> bool {
        self.ready
    }

    /// Canvas width in pixels.
    pub fn width(&self) -> u16 {
        self.frame.width
    }

    /// Canvas height in pixels.
    pub fn height(&self) -> u16 {
        self.frame.height
    }

    /// Session tile size (0 until the first keyframe).
    pub fn tile(&self) -> u16 {
        self.tile
    }

    /// Current pixel contents.
    pub fn pixels(&self) -> &[u8] {
        &self.frame.data
    }

    /// Mark the canvas stale after a failed delta; deltas are refused
    /// until the next keyframe.
    pub fn mark_stale(&mut self) {
        self.ready = false;
    }

    /// Apply a keyframe: the decoded image must match the advertised
    /// geometry, and the advertised geometry must match the session's.
    pub fn apply_keyframe(
        &mut self,
        width: u16,
        height: u16,
        tile: u16,
        image: DecodedImage,
    ) -> Result<(), MirrorError> {
        if (image.width, image.height) != (width, height) {
            return Err(MirrorError::GeometryMismatch {
                expected_w: width,
                expected_h: height,
                actual_w: image.width,
                actual_h: image.height,
            });
        }
        if tile == 0 {
            return Err(MirrorError::FrameMalformed("keyframe tile size is zero"));
        }
        if self.geometry_locked
            && (width, height, tile) != (self.frame.width, self.frame.height, self.tile)
        {
            return Err(MirrorError::GeometryMismatch {
                expected_w: self.frame.width,
                expected_h: self.frame.height,
                actual_w: width,
                actual_h: height,
            });
        }

        self.frame = RawFrame::new(width, height, image.rgb)?;
        self.tile = tile;
        self.ready = true;
        self.geometry_locked = true;
        Ok(())
    }

    /// Apply a delta. Either every tile is pasted or none is; on error
    /// the buffer is untouched and the caller is expected to mark the
    /// canvas stale and request a resync.
    pub fn apply_delta(&mut self, tiles: &[DecodedTile]) -> Result<(), MirrorError> {
        if !self.ready {
            return Err(MirrorError::FrameMalformed("delta before first keyframe"));
        }

        // Validate everything before the first paste.
        for t in tiles {
            let x = t.tx as usize * self.tile as usize;
            let y = t.ty as usize * self.tile as usize;
            if x >= self.frame.width as usize || y >= self.frame.height as usize {
                return Err(MirrorError::FrameMalformed("tile index out of bounds"));
            }
            let expected_w = (self.tile as usize).min(self.frame.width as usize - x) as u16;
            let expected_h = (self.tile as usize).min(self.frame.height as usize - y) as u16;
            if (t.width, t.height) != (expected_w, expected_h) {
                return Err(MirrorError::GeometryMismatch {
                    expected_w,
                    expected_h,
                    actual_w: t.width,
                    actual_h: t.height,
                });
            }
            if t.rgb.len() != t.width as usize * t.height as usize * 3 {
                return Err(MirrorError::FrameMalformed("tile payload size mismatch"));
            }
        }

        for t in tiles {
            self.frame.paste(
                t.tx * self.tile,
                t.ty * self.tile,
                t.width,
                t.height,
                &t.rgb,
            );
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(width: u16, height: u16, rgb: [u8; 3]) -> DecodedImage {
        DecodedImage {
            rgb: RawFrame::solid(width, height, rgb).data,
            width,
            height,
        }
    }

    fn tile(tx: u16, ty: u16, w: u16, h: u16, rgb: [u8; 3]) -> DecodedTile {
        DecodedTile {
            tx,
            ty,
            width: w,
            height: h,
            rgb: RawFrame::solid(w, h, rgb).data,
        }
    }

    #[test]
    fn starts_as_zeroed_placeholder() {
        let canvas = Canvas::new(16, 8);
        assert!(!canvas.ready());
        assert_eq!(canvas.pixels().len(), 16 * 8 * 3);
        assert!(canvas.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn keyframe_replaces_canvas_and_adopts_geometry() {
        let mut canvas = Canvas::new(1920, 1080);
        canvas
            .apply_keyframe(128, 64, 64, decoded(128, 64, [255, 0, 0]))
            .unwrap();
        assert!(canvas.ready());
        assert_eq!((canvas.width(), canvas.height(), canvas.tile()), (128, 64, 64));
        assert!(canvas.pixels().chunks_exact(3).all(|p| p == [255, 0, 0]));
    }

    #[test]
    fn keyframe_geometry_mismatch_rejected() {
        let mut canvas = Canvas::new(128, 64);
        // Decoded image disagrees with the advertised header.
        let err = canvas
            .apply_keyframe(128, 64, 64, decoded(64, 64, [0, 0, 0]))
            .unwrap_err();
        assert!(matches!(err, MirrorError::GeometryMismatch { .. }));
        assert!(!canvas.ready());
    }

    #[test]
    fn session_geometry_is_locked_after_first_keyframe() {
        let mut canvas = Canvas::new(128, 64);
        canvas
            .apply_keyframe(128, 64, 64, decoded(128, 64, [1, 1, 1]))
            .unwrap();
        let err = canvas
            .apply_keyframe(64, 64, 64, decoded(64, 64, [2, 2, 2]))
            .unwrap_err();
        assert!(matches!(err, MirrorError::GeometryMismatch { .. }));
        // The original contents survive.
        assert!(canvas.pixels().chunks_exact(3).all(|p| p == [1, 1, 1]));
    }

    #[test]
    fn delta_pastes_only_named_cells() {
        let mut canvas = Canvas::new(128, 64);
        canvas
            .apply_keyframe(128, 64, 64, decoded(128, 64, [255, 0, 0]))
            .unwrap();

        canvas
            .apply_delta(&[tile(0, 0, 64, 64, [0, 255, 0])])
            .unwrap();

        // Left half green, right half still red.
        let row_stride = 128 * 3;
        for y in 0..64usize {
            let left = &canvas.pixels()[y * row_stride..y * row_stride + 3];
            let right = &canvas.pixels()[y * row_stride + 64 * 3..y * row_stride + 64 * 3 + 3];
            assert_eq!(left, [0, 255, 0]);
            assert_eq!(right, [255, 0, 0]);
        }
    }

    #[test]
    fn delta_before_keyframe_refused_without_mutation() {
        let mut canvas = Canvas::new(128, 64);
        let before = canvas.pixels().to_vec();
        assert!(canvas.apply_delta(&[tile(0, 0, 64, 64, [9, 9, 9])]).is_err());
        assert_eq!(canvas.pixels(), &before[..]);
    }

    #[test]
    fn failed_delta_leaves_canvas_byte_identical() {
        let mut canvas = Canvas::new(128, 64);
        canvas
            .apply_keyframe(128, 64, 64, decoded(128, 64, [255, 0, 0]))
            .unwrap();
        let before = canvas.pixels().to_vec();

        // Second tile is out of bounds: nothing may be pasted, not
        // even the valid first tile.
        let bad = [
            tile(0, 0, 64, 64, [0, 255, 0]),
            tile(5, 5, 64, 64, [0, 0, 255]),
        ];
        assert!(canvas.apply_delta(&bad).is_err());
        assert_eq!(canvas.pixels(), &before[..]);
    }

    #[test]
    fn wrong_tile_size_for_cell_rejected() {
        let mut canvas = Canvas::new(100, 64);
        canvas
            .apply_keyframe(100, 64, 64, decoded(100, 64, [0, 0, 0]))
            .unwrap();
        // The ragged right column must be 36 px wide, not 64.
        let err = canvas
            .apply_delta(&[tile(1, 0, 64, 64, [1, 1, 1])])
            .unwrap_err();
        assert!(matches!(err, MirrorError::GeometryMismatch { .. }));

        // The true size is accepted.
        canvas
            .apply_delta(&[tile(1, 0, 36, 64, [1, 1, 1])])
            .unwrap();
    }

    #[test]
    fn mark_stale_refuses_further_deltas() {
        let mut canvas = Canvas::new(128, 64);
        canvas
            .apply_keyframe(128, 64, 64, decoded(128, 64, [0, 0, 0]))
            .unwrap();
        canvas.mark_stale();
        assert!(!canvas.ready());
        assert!(canvas.apply_delta(&[tile(0, 0, 64, 64, [1, 1, 1])]).is_err());
    }
}
