//! Domain-specific error types for the mirror pipeline.
//!
//! All fallible operations return `Result<T, MirrorError>`.
//! Every error kind is recovered locally: the sender falls back to a
//! keyframe, the receiver discards the frame and requests a resync, the
//! client reconnects. No error is allowed to corrupt canvas state.

use std::time::Duration;

use thiserror::Error;

/// The canonical error type for the mirror protocol.
#[derive(Debug, Error)]
pub enum MirrorError {
    // ── Transport ────────────────────────────────────────────────
    /// The channel ended, cleanly or otherwise. Triggers reconnect on
    /// the viewer and session teardown on the server.
    #[error("transport closed")]
    TransportClosed,

    /// A connect attempt did not complete within its deadline.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The peer rejected the connection during the handshake.
    /// Terminal: the reconnect loop does not retry on this.
    #[error("handshake rejected: {0}")]
    Handshake(String),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// The TCP/IO layer reported an error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Wire format ──────────────────────────────────────────────
    /// The parser detected invalid lengths or an unknown kind byte.
    #[error("malformed frame: {0}")]
    FrameMalformed(&'static str),

    /// Decoded dimensions disagree with the advertised geometry or
    /// the declared tile size.
    #[error("geometry mismatch: expected {expected_w}x{expected_h}, got {actual_w}x{actual_h}")]
    GeometryMismatch {
        expected_w: u16,
        expected_h: u16,
        actual_w: u16,
        actual_h: u16,
    },

    // ── Codecs ───────────────────────────────────────────────────
    /// An image encode or decode failed.
    #[error("codec failure: {0}")]
    Codec(String),

    /// Serialization of a structured payload failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for MirrorError {
    fn from(s: String) -> Self {
        MirrorError::Other(s)
    }
}

impl From<&str> for MirrorError {
    fn from(s: &str) -> Self {
        MirrorError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for MirrorError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        MirrorError::ChannelClosed
    }
}

impl From<Box<bincode::ErrorKind>> for MirrorError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        MirrorError::Encoding(e.to_string())
    }
}
