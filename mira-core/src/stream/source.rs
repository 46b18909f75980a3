//! Frame acquisition interface.
//!
//! Real desktop capture backends live outside this crate; the pipeline
//! only needs something that reports a fixed geometry and yields raw
//! RGB frames. `SyntheticSource` is the built-in generator used by the
//! demo server and the integration tests.

use std::future::Future;

use crate::error::MirrorError;

/// Yields raw RGB frames of a fixed geometry for a selected display.
///
/// `next_frame` may suspend while waiting for the next source frame and
/// must return exactly `width * height * 3` bytes.
pub trait FrameSource: Send {
    /// The session-constant frame geometry.
    fn geometry(&self) -> (u16, u16);

    /// Acquire the next frame.
    fn next_frame(&mut self) -> impl Future<Output = Result<Vec<u8>, MirrorError>> + Send;
}

// ── SyntheticSource ──────────────────────────────────────────────

/// Animated test pattern: a dark gradient backdrop with a bright block
/// bouncing across it, so consecutive frames differ in a handful of
/// tiles — enough to exercise the delta path without a real desktop.
pub struct SyntheticSource {
    width: u16,
    height: u16,
    tick: u64,
}

impl SyntheticSource {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            tick: 0,
        }
    }

    fn render(&self) -> Vec<u8> {
        let w = self.width as usize;
        let h = self.height as usize;
        let mut data = vec![0u8; w * h * 3];

        // Static gradient backdrop.
        for y in 0..h {
            for x in 0..w {
                let off = (y * w + x) * 3;
                data[off] = (x * 96 / w.max(1)) as u8;
                data[off + 1] = (y * 96 / h.max(1)) as u8;
                data[off + 2] = 40;
            }
        }

        // Bouncing block, 1/8th of the frame on each side.
        let bw = (w / 8).max(1);
        let bh = (h / 8).max(1);
        let span_x = (w - bw).max(1);
        let span_y = (h - bh).max(1);
        let step = self.tick as usize * 7;
        let bx = bounce(step % (span_x * 2), span_x);
        let by = bounce(step % (span_y * 2), span_y);
        for y in by..by + bh {
            for x in bx..bx + bw {
                let off = (y * w + x) * 3;
                data[off] = 235;
                data[off + 1] = 235;
                data[off + 2] = 90;
            }
        }

        data
    }
}

/// Reflect `pos` within `0..=span` (triangle wave).
fn bounce(pos: usize, span: usize) -> usize {
    if pos <= span {
        pos
    } else {
        2 * span - pos
    }
}

impl FrameSource for SyntheticSource {
    fn geometry(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    async fn next_frame(&mut self) -> Result<Vec<u8>, MirrorError> {
        let frame = self.render();
        self.tick += 1;
        Ok(frame)
    }
}

// ── Tests ────────────────────────────────────────────────────────
