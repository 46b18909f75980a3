//! Typed input events carried inside `Input` frames.
//!
//! The wire layer treats input payloads as opaque bytes; these types
//! are the agreed encoding between the bundled viewer and server
//! shells. Actual OS injection is the host's concern — the server
//! surfaces decoded events on a channel and stops there.

use serde::{Deserialize, Serialize};

use crate::error::MirrorError;

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// An input event forwarded from viewer to host.
///
/// Coordinates are absolute pixels in the mirrored frame's geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputEvent {
    /// Pointer moved to `(x, y)`.
    MouseMove { x: u16, y: u16 },
    /// Button clicked at `(x, y)`.
    MouseClick { x: u16, y: u16, button: MouseButton },
    /// A named key was pressed.
    KeyPress { key: String },
}

impl InputEvent {
    /// Serialize for an `Input` frame payload.
    pub fn encode(&self) -> Result<Vec<u8>, MirrorError> {
        Ok(bincode::serialize(self)?)
    }

    /// Parse an `Input` frame payload.
    pub fn decode(payload: &[u8]) -> Result<Self, MirrorError> {
        Ok(bincode::deserialize(payload)?)
    }
}
