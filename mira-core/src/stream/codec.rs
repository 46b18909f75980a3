//! Tile and frame codec interfaces plus the default implementations.
//!
//! Tiles travel as lossy WebP (libwebp via the `webp` crate), full
//! frames as lossy JPEG (`image` crate). Both codecs are deterministic
//! for identical input and quality, and quality is session-constant —
//! the planner never retunes them mid-stream.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, RgbImage};

use crate::error::MirrorError;

// ── DecodedImage ─────────────────────────────────────────────────

/// Output of a codec decode: tight row-major RGB plus dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub rgb: Vec<u8>,
    pub width: u16,
    pub height: u16,
}

// ── Codec traits ─────────────────────────────────────────────────

/// Compresses and decompresses individual tiles.
///
/// `decode` returns exactly the geometry the sender encoded; the
/// receiver verifies it against the per-tile wire header and fails the
/// frame on mismatch.
pub trait TileCodec: Send + Sync {
    fn encode(&self, rgb: &[u8], width: u16, height: u16) -> Result<Vec<u8>, MirrorError>;
    fn decode(&self, data: &[u8]) -> Result<DecodedImage, MirrorError>;
}

/// Compresses and decompresses full frames for keyframes.
pub trait FrameCodec: Send + Sync {
    fn encode(&self, rgb: &[u8], width: u16, height: u16) -> Result<Vec<u8>, MirrorError>;
    fn decode(&self, data: &[u8]) -> Result<DecodedImage, MirrorError>;
}

fn check_input_size(rgb: &[u8], width: u16, height: u16) -> Result<(), MirrorError> {
    let expected = width as usize * height as usize * 3;
    if rgb.len() != expected {
        return Err(MirrorError::Codec(format!(
            "encoder input size mismatch: expected {expected} bytes, got {}",
            rgb.len()
        )));
    }
    Ok(())
}

// ── WebpTileCodec ────────────────────────────────────────────────

/// Lossy WebP tile codec (default quality 80).
pub struct WebpTileCodec {
    quality: f32,
}

impl WebpTileCodec {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.min(100) as f32,
        }
    }
}

impl TileCodec for WebpTileCodec {
    fn encode(&self, rgb: &[u8], width: u16, height: u16) -> Result<Vec<u8>, MirrorError> {
        check_input_size(rgb, width, height)?;
        let encoder = webp::Encoder::from_rgb(rgb, width as u32, height as u32);
        Ok(encoder.encode(self.quality).to_vec())
    }

    fn decode(&self, data: &[u8]) -> Result<DecodedImage, MirrorError> {
        let image = webp::Decoder::new(data)
            .decode()
            .ok_or_else(|| MirrorError::Codec("webp decode failed".into()))?;
        let (w, h) = (image.width(), image.height());
        let width = u16::try_from(w).map_err(|_| MirrorError::Codec("webp width overflow".into()))?;
        let height =
            u16::try_from(h).map_err(|_| MirrorError::Codec("webp height overflow".into()))?;

        let pixels = w as usize * h as usize;
        let raw: &[u8] = &image;
        let rgb = if raw.len() == pixels * 3 {
            raw.to_vec()
        } else if raw.len() == pixels * 4 {
            // Alpha plane present — drop it.
            let mut out = Vec::with_capacity(pixels * 3);
            for px in raw.chunks_exact(4) {
                out.extend_from_slice(&px[..3]);
            }
            out
        } else {
            return Err(MirrorError::Codec(format!(
                "webp decode produced {} bytes for {pixels} pixels",
                raw.len()
            )));
        };

        Ok(DecodedImage { rgb, width, height })
    }
}

// ── JpegFrameCodec ───────────────────────────────────────────────

/// Lossy JPEG full-frame codec (default quality 70).
pub struct JpegFrameCodec {
    quality: u8,
}

impl JpegFrameCodec {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl FrameCodec for JpegFrameCodec {
    fn encode(&self, rgb: &[u8], width: u16, height: u16) -> Result<Vec<u8>, MirrorError> {
        check_input_size(rgb, width, height)?;
        let img: RgbImage =
            ImageBuffer::from_raw(width as u32, height as u32, rgb.to_vec())
                .ok_or_else(|| MirrorError::Codec("invalid frame dimensions".into()))?;

        let mut buf = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut buf, self.quality);
        img.write_with_encoder(encoder)
            .map_err(|e| MirrorError::Codec(format!("jpeg encode failed: {e}")))?;
        Ok(buf.into_inner())
    }

    fn decode(&self, data: &[u8]) -> Result<DecodedImage, MirrorError> {
        let img = image::load_from_memory(data)
            .map_err(|e| MirrorError::Codec(format!("jpeg decode failed: {e}")))?
            .to_rgb8();
        let width = u16::try_from(img.width())
            .map_err(|_| MirrorError::Codec("jpeg width overflow".into()))?;
        let height = u16::try_from(img.height())
            .map_err(|_| MirrorError::Codec("jpeg height overflow".into()))?;
        Ok(DecodedImage {
            rgb: img.into_raw(),
            width,
            height,
        })
    }
}

// ── Test codecs ──────────────────────────────────────────────────

/// Lossless codec for unit tests: a 4-byte dimension header followed by
/// the raw pixel bytes. Lets tests assert exact pixel values where the
/// lossy codecs would only be approximate.
#[cfg(test)]
pub(crate) struct RawTestCodec;

#[cfg(test)]
impl RawTestCodec {
    fn enc(rgb: &[u8], width: u16, height: u16) -> Result<Vec<u8>, MirrorError> {
        check_input_size(rgb, width, height)?;
        let mut out = Vec::with_capacity(4 + rgb.len());
        out.extend_from_slice(&width.to_be_bytes());
        out.extend_from_slice(&height.to_be_bytes());
        out.extend_from_slice(rgb);
        Ok(out)
    }

    fn dec(data: &[u8]) -> Result<DecodedImage, MirrorError> {
        if data.len() < 4 {
            return Err(MirrorError::Codec("raw codec header truncated".into()));
        }
        let width = u16::from_be_bytes([data[0], data[1]]);
        let height = u16::from_be_bytes([data[2], data[3]]);
        let rgb = data[4..].to_vec();
        if rgb.len() != width as usize * height as usize * 3 {
            return Err(MirrorError::Codec("raw codec body size mismatch".into()));
        }
        Ok(DecodedImage { rgb, width, height })
    }
}

#[cfg(test)]
impl TileCodec for RawTestCodec {
    fn encode(&self, rgb: &[u8], width: u16, height: u16) -> Result<Vec<u8>, MirrorError> {
        Self::enc(rgb, width, height)
    }
    fn decode(&self, data: &[u8]) -> Result<DecodedImage, MirrorError> {
        Self::dec(data)
    }
}

#[cfg(test)]
impl FrameCodec for RawTestCodec {
    fn encode(&self, rgb: &[u8], width: u16, height: u16) -> Result<Vec<u8>, MirrorError> {
        Self::enc(rgb, width, height)
    }
    fn decode(&self, data: &[u8]) -> Result<DecodedImage, MirrorError> {
        Self::dec(data)
    }
}

/// Codec whose encode always fails, for exercising the keyframe
/// fallback and cache-invalidation paths.
#[cfg(test)]
pub(crate) struct FailingTestCodec;

#[cfg(test)]
impl TileCodec for FailingTestCodec {
    fn encode(&self, _rgb: &[u8], _w: u16, _h: u16) -> Result<Vec<u8>, MirrorError> {
        Err(MirrorError::Codec("injected tile failure".into()))
    }
    fn decode(&self, _data: &[u8]) -> Result<DecodedImage, MirrorError> {
        Err(MirrorError::Codec("injected tile failure".into()))
    }
}

#[cfg(test)]
impl FrameCodec for FailingTestCodec {
    fn encode(&self, _rgb: &[u8], _w: u16, _h: u16) -> Result<Vec<u8>, MirrorError> {
        Err(MirrorError::Codec("injected frame failure".into()))
    }
    fn decode(&self, _data: &[u8]) -> Result<DecodedImage, MirrorError> {
        Err(MirrorError::Codec("injected frame failure".into()))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_rgb(w: u16, h: u16, rgb: [u8; 3]) -> Vec<u8> {
        let mut out = Vec::with_capacity(w as usize * h as usize * 3);
        for _ in 0..w as usize * h as usize {
            out.extend_from_slice(&rgb);
        }
        out
    }

    fn max_channel_error(a: &[u8], b: &[u8]) -> u8 {
        a.iter()
            .zip(b)
            .map(|(x, y)| x.abs_diff(*y))
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn webp_tile_roundtrip_geometry() {
        let codec = WebpTileCodec::new(80);
        let rgb = solid_rgb(64, 64, [200, 40, 40]);
        let encoded = codec.encode(&rgb, 64, 64).unwrap();
        assert!(!encoded.is_empty());

        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!((decoded.width, decoded.height), (64, 64));
        assert_eq!(decoded.rgb.len(), 64 * 64 * 3);
        // Lossy, but a solid tile should stay close.
        assert!(max_channel_error(&rgb, &decoded.rgb) < 32);
    }

    #[test]
    fn webp_ragged_tile_keeps_true_size() {
        let codec = WebpTileCodec::new(80);
        let rgb = solid_rgb(36, 64, [10, 200, 10]);
        let encoded = codec.encode(&rgb, 36, 64).unwrap();
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!((decoded.width, decoded.height), (36, 64));
    }

    #[test]
    fn webp_encode_is_deterministic() {
        let codec = WebpTileCodec::new(80);
        let rgb = solid_rgb(32, 32, [1, 2, 3]);
        let a = codec.encode(&rgb, 32, 32).unwrap();
        let b = codec.encode(&rgb, 32, 32).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn webp_rejects_wrong_input_size() {
        let codec = WebpTileCodec::new(80);
        assert!(codec.encode(&[0u8; 10], 64, 64).is_err());
    }

    #[test]
    fn webp_rejects_garbage() {
        let codec = WebpTileCodec::new(80);
        assert!(codec.decode(b"definitely not webp").is_err());
    }

    #[test]
    fn jpeg_frame_roundtrip_geometry() {
        let codec = JpegFrameCodec::new(70);
        let rgb = solid_rgb(100, 64, [255, 0, 0]);
        let encoded = codec.encode(&rgb, 100, 64).unwrap();
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!((decoded.width, decoded.height), (100, 64));
        assert!(max_channel_error(&rgb, &decoded.rgb) < 48);
    }

    #[test]
    fn jpeg_rejects_garbage() {
        let codec = JpegFrameCodec::new(70);
        assert!(codec.decode(&[0u8; 16]).is_err());
    }

    #[test]
    fn raw_test_codec_is_lossless() {
        let rgb = solid_rgb(8, 4, [7, 8, 9]);
        let encoded = TileCodec::encode(&RawTestCodec, &rgb, 8, 4).unwrap();
        let decoded = TileCodec::decode(&RawTestCodec, &encoded).unwrap();
        assert_eq!(decoded.rgb, rgb);
        assert_eq!((decoded.width, decoded.height), (8, 4));
    }
}
