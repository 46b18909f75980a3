//! Binary wire format — one logical frame per transport message.
//!
//! All multi-byte integers are **big-endian**. Every frame starts with a
//! 9-byte common prefix:
//!
//! ```text
//! kind:   u8   (1)
//! seq:    u32  (4)
//! ts_ms:  u32  (4)   milliseconds from a session-local epoch
//! ```
//!
//! Per kind:
//!
//! ```text
//! 0x00 Empty      (no further bytes)
//! 0x01 Keyframe   w: u16, h: u16, tile: u16, payload_len: u32, payload
//! 0x02 Delta      n: u16, then n tile records:
//!                   tx: u16, ty: u16, tw: u16, th: u16,
//!                   data_len: u32, data
//! 0x10 Resync     (no further bytes; viewer → server)
//! 0x20 Input      payload_len: u16, payload (viewer → server, opaque)
//! ```
//!
//! A parser rejects any message whose declared lengths do not consume the
//! body exactly, and any kind byte outside the five assigned values.

use crate::error::MirrorError;

// ── Kind bytes ───────────────────────────────────────────────────

pub const KIND_EMPTY: u8 = 0x00;
pub const KIND_KEYFRAME: u8 = 0x01;
pub const KIND_DELTA: u8 = 0x02;
pub const KIND_RESYNC: u8 = 0x10;
pub const KIND_INPUT: u8 = 0x20;

/// Size of the common prefix on the wire.
pub const PREFIX_LEN: usize = 9;

// ── TilePatch ────────────────────────────────────────────────────

/// One compressed tile inside a delta frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePatch {
    /// Tile column index.
    pub tx: u16,
    /// Tile row index.
    pub ty: u16,
    /// Tile width in pixels (ragged edge tiles carry their true size).
    pub width: u16,
    /// Tile height in pixels.
    pub height: u16,
    /// Compressed tile bytes.
    pub data: Vec<u8>,
}

// ── WireFrame ────────────────────────────────────────────────────

/// A parsed (or to-be-serialized) protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    /// Nothing changed since the previous frame.
    Empty { seq: u32, ts: u32 },
    /// Self-contained full-frame image replacing the canvas.
    Keyframe {
        seq: u32,
        ts: u32,
        width: u16,
        height: u16,
        tile: u16,
        payload: Vec<u8>,
    },
    /// Sparse frame carrying only tiles that changed.
    Delta {
        seq: u32,
        ts: u32,
        tiles: Vec<TilePatch>,
    },
    /// Viewer request for a fresh keyframe.
    Resync { seq: u32, ts: u32 },
    /// Opaque input-event payload, carried but not interpreted here.
    Input { seq: u32, ts: u32, payload: Vec<u8> },
}

impl WireFrame {
    /// The kind byte this frame serializes with.
    pub fn kind(&self) -> u8 {
        match self {
            WireFrame::Empty { .. } => KIND_EMPTY,
            WireFrame::Keyframe { .. } => KIND_KEYFRAME,
            WireFrame::Delta { .. } => KIND_DELTA,
            WireFrame::Resync { .. } => KIND_RESYNC,
            WireFrame::Input { .. } => KIND_INPUT,
        }
    }

    /// Sequence number from the common prefix.
    pub fn seq(&self) -> u32 {
        match self {
            WireFrame::Empty { seq, .. }
            | WireFrame::Keyframe { seq, .. }
            | WireFrame::Delta { seq, .. }
            | WireFrame::Resync { seq, .. }
            | WireFrame::Input { seq, .. } => *seq,
        }
    }

    /// Timestamp from the common prefix.
    pub fn ts(&self) -> u32 {
        match self {
            WireFrame::Empty { ts, .. }
            | WireFrame::Keyframe { ts, .. }
            | WireFrame::Delta { ts, .. }
            | WireFrame::Resync { ts, .. }
            | WireFrame::Input { ts, .. } => *ts,
        }
    }

    /// Whether backpressure may shed this frame: deltas and empties
    /// are disposable, keyframes never are.
    pub fn is_droppable_kind(kind: u8) -> bool {
        kind == KIND_DELTA || kind == KIND_EMPTY
    }

    // ── FrameWriter ──────────────────────────────────────────────

    /// Serialize into a single binary message.
    pub fn encode(&self) -> Result<Vec<u8>, MirrorError> {
        let mut out = Vec::with_capacity(PREFIX_LEN + self.body_size_hint());
        out.push(self.kind());
        out.extend_from_slice(&self.seq().to_be_bytes());
        out.extend_from_slice(&self.ts().to_be_bytes());

        match self {
            WireFrame::Empty { .. } | WireFrame::Resync { .. } => {}
            WireFrame::Keyframe {
                width,
                height,
                tile,
                payload,
                ..
            } => {
                let len = u32::try_from(payload.len())
                    .map_err(|_| MirrorError::FrameMalformed("keyframe payload too large"))?;
                out.extend_from_slice(&width.to_be_bytes());
                out.extend_from_slice(&height.to_be_bytes());
                out.extend_from_slice(&tile.to_be_bytes());
                out.extend_from_slice(&len.to_be_bytes());
                out.extend_from_slice(payload);
            }
            WireFrame::Delta { tiles, .. } => {
                let n = u16::try_from(tiles.len())
                    .map_err(|_| MirrorError::FrameMalformed("too many tiles in delta"))?;
                out.extend_from_slice(&n.to_be_bytes());
                for t in tiles {
                    let len = u32::try_from(t.data.len())
                        .map_err(|_| MirrorError::FrameMalformed("tile data too large"))?;
                    out.extend_from_slice(&t.tx.to_be_bytes());
                    out.extend_from_slice(&t.ty.to_be_bytes());
                    out.extend_from_slice(&t.width.to_be_bytes());
                    out.extend_from_slice(&t.height.to_be_bytes());
                    out.extend_from_slice(&len.to_be_bytes());
                    out.extend_from_slice(&t.data);
                }
            }
            WireFrame::Input { payload, .. } => {
                let len = u16::try_from(payload.len())
                    .map_err(|_| MirrorError::FrameMalformed("input payload too large"))?;
                out.extend_from_slice(&len.to_be_bytes());
                out.extend_from_slice(payload);
            }
        }

        Ok(out)
    }

    // ── FrameReader ──────────────────────────────────────────────

    /// Parse a single binary message.
    ///
    /// Rejects unknown kind bytes and any length mismatch between the
    /// declared and actual body.
    pub fn decode(buf: &[u8]) -> Result<WireFrame, MirrorError> {
        let mut r = ByteReader::new(buf);
        let kind = r.u8()?;
        let seq = r.u32()?;
        let ts = r.u32()?;

        let frame = match kind {
            KIND_EMPTY => WireFrame::Empty { seq, ts },
            KIND_RESYNC => WireFrame::Resync { seq, ts },
            KIND_KEYFRAME => {
                let width = r.u16()?;
                let height = r.u16()?;
                let tile = r.u16()?;
                let len = r.u32()? as usize;
                let payload = r.bytes(len)?.to_vec();
                WireFrame::Keyframe {
                    seq,
                    ts,
                    width,
                    height,
                    tile,
                    payload,
                }
            }
            KIND_DELTA => {
                let n = r.u16()? as usize;
                let mut tiles = Vec::with_capacity(n.min(1024));
                for _ in 0..n {
                    let tx = r.u16()?;
                    let ty = r.u16()?;
                    let width = r.u16()?;
                    let height = r.u16()?;
                    let len = r.u32()? as usize;
                    let data = r.bytes(len)?.to_vec();
                    tiles.push(TilePatch {
                        tx,
                        ty,
                        width,
                        height,
                        data,
                    });
                }
                WireFrame::Delta { seq, ts, tiles }
            }
            KIND_INPUT => {
                let len = r.u16()? as usize;
                let payload = r.bytes(len)?.to_vec();
                WireFrame::Input { seq, ts, payload }
            }
            _ => return Err(MirrorError::FrameMalformed("unknown kind byte")),
        };

        r.finish()?;
        Ok(frame)
    }

    fn body_size_hint(&self) -> usize {
        match self {
            WireFrame::Empty { .. } | WireFrame::Resync { .. } => 0,
            WireFrame::Keyframe { payload, .. } => 10 + payload.len(),
            WireFrame::Delta { tiles, .. } => {
                2 + tiles.iter().map(|t| 12 + t.data.len()).sum::<usize>()
            }
            WireFrame::Input { payload, .. } => 2 + payload.len(),
        }
    }
}

// ── ByteReader ───────────────────────────────────────────────────

/// Minimal big-endian cursor over a message body.
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8, MirrorError> {
        let b = self.bytes(1)?;
        Ok(b[0])
    }

    fn u16(&mut self) -> Result<u16, MirrorError> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, MirrorError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], MirrorError> {
        if self.buf.len() - self.pos < len {
            return Err(MirrorError::FrameMalformed("truncated frame"));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// The declared lengths must consume the message exactly.
    fn finish(self) -> Result<(), MirrorError> {
        if self.pos != self.buf.len() {
            return Err(MirrorError::FrameMalformed("trailing bytes after frame"));
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: WireFrame) {
        let bytes = frame.encode().unwrap();
        let parsed = WireFrame::decode(&bytes).unwrap();
        assert_eq!(parsed, frame);
        // Serializing the parse must reproduce the bytes exactly.
        assert_eq!(parsed.encode().unwrap(), bytes);
    }

    #[test]
    fn empty_roundtrip() {
        roundtrip(WireFrame::Empty { seq: 7, ts: 1234 });
    }

    #[test]
    fn resync_roundtrip() {
        roundtrip(WireFrame::Resync {
            seq: u32::MAX,
            ts: 0,
        });
    }

    #[test]
    fn keyframe_roundtrip() {
        roundtrip(WireFrame::Keyframe {
            seq: 0,
            ts: 42,
            width: 1920,
            height: 1080,
            tile: 64,
            payload: vec![0xAB; 513],
        });
    }

    #[test]
    fn delta_roundtrip() {
        roundtrip(WireFrame::Delta {
            seq: 3,
            ts: 99,
            tiles: vec![
                TilePatch {
                    tx: 0,
                    ty: 0,
                    width: 64,
                    height: 64,
                    data: vec![1, 2, 3],
                },
                TilePatch {
                    tx: 29,
                    ty: 16,
                    width: 36,
                    height: 64,
                    data: vec![],
                },
            ],
        });
    }

    #[test]
    fn input_roundtrip() {
        roundtrip(WireFrame::Input {
            seq: 11,
            ts: 500,
            payload: b"opaque".to_vec(),
        });
    }

    #[test]
    fn golden_empty_layout() {
        let bytes = WireFrame::Empty {
            seq: 0x01020304,
            ts: 0x0A0B0C0D,
        }
        .encode()
        .unwrap();
        assert_eq!(
            bytes,
            [0x00, 0x01, 0x02, 0x03, 0x04, 0x0A, 0x0B, 0x0C, 0x0D]
        );
    }

    #[test]
    fn golden_delta_tile_record() {
        let bytes = WireFrame::Delta {
            seq: 1,
            ts: 0,
            tiles: vec![TilePatch {
                tx: 0,
                ty: 0,
                width: 64,
                height: 64,
                data: vec![0xFF, 0xEE],
            }],
        }
        .encode()
        .unwrap();
        // prefix(9) + n(2)
        assert_eq!(bytes[0], KIND_DELTA);
        assert_eq!(&bytes[9..11], &[0x00, 0x01]); // n = 1, big-endian
        // tile record: tx, ty, tw, th
        assert_eq!(&bytes[11..19], &[0, 0, 0, 0, 0, 64, 0, 64]);
        // data_len = 2
        assert_eq!(&bytes[19..23], &[0, 0, 0, 2]);
        assert_eq!(&bytes[23..], &[0xFF, 0xEE]);
    }

    #[test]
    fn rejects_unknown_kind() {
        let mut bytes = WireFrame::Empty { seq: 0, ts: 0 }.encode().unwrap();
        bytes[0] = 0x7F;
        assert!(matches!(
            WireFrame::decode(&bytes),
            Err(MirrorError::FrameMalformed(_))
        ));
    }

    #[test]
    fn rejects_truncated_prefix() {
        assert!(WireFrame::decode(&[0x00, 0x01]).is_err());
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = WireFrame::Empty { seq: 0, ts: 0 }.encode().unwrap();
        bytes.push(0);
        assert!(matches!(
            WireFrame::decode(&bytes),
            Err(MirrorError::FrameMalformed("trailing bytes after frame"))
        ));
    }

    #[test]
    fn rejects_short_keyframe_payload() {
        let mut bytes = WireFrame::Keyframe {
            seq: 0,
            ts: 0,
            width: 8,
            height: 8,
            tile: 64,
            payload: vec![1, 2, 3, 4],
        }
        .encode()
        .unwrap();
        bytes.truncate(bytes.len() - 1);
        assert!(WireFrame::decode(&bytes).is_err());
    }

    #[test]
    fn rejects_overdeclared_tile_length() {
        // Declare 5 data bytes but supply 2.
        let mut bytes = Vec::new();
        bytes.push(KIND_DELTA);
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&1u16.to_be_bytes()); // n
        bytes.extend_from_slice(&0u16.to_be_bytes()); // tx
        bytes.extend_from_slice(&0u16.to_be_bytes()); // ty
        bytes.extend_from_slice(&8u16.to_be_bytes()); // tw
        bytes.extend_from_slice(&8u16.to_be_bytes()); // th
        bytes.extend_from_slice(&5u32.to_be_bytes()); // data_len
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        assert!(WireFrame::decode(&bytes).is_err());
    }
}
