//! Session configuration.
//!
//! Every value here is session-constant: the core takes a `SessionConfig`
//! by value at construction and never reads global state. The binaries
//! layer TOML files and CLI flags on top of these defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Session-constant tuning for both pipeline endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Tile edge length in pixels.
    pub tile: u16,
    /// Fraction of changed tiles above which a delta is replaced by a
    /// keyframe (0.0 – 1.0).
    pub fallback_threshold: f64,
    /// Interval between frame captures in milliseconds.
    pub capture_interval_ms: u64,
    /// WebP quality for tile encoding (0 – 100).
    pub tile_quality: u8,
    /// JPEG quality for full-frame encoding (0 – 100).
    pub frame_quality: u8,
    /// Canvas placeholder width before the first keyframe arrives.
    pub default_width: u16,
    /// Canvas placeholder height before the first keyframe arrives.
    pub default_height: u16,
    /// Initial reconnect delay in milliseconds.
    pub reconnect_delay_initial_ms: u64,
    /// Reconnect delay cap in milliseconds.
    pub reconnect_delay_max_ms: u64,
    /// Deadline for a single connect attempt in milliseconds.
    pub connect_timeout_ms: u64,
    /// Outbound queue depth above which droppable frames are shed.
    pub outbound_high_water: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tile: 64,
            fallback_threshold: 0.7,
            capture_interval_ms: 100,
            tile_quality: 80,
            frame_quality: 70,
            default_width: 1920,
            default_height: 1080,
            reconnect_delay_initial_ms: 1_000,
            reconnect_delay_max_ms: 30_000,
            connect_timeout_ms: 10_000,
            outbound_high_water: 8,
        }
    }
}

impl SessionConfig {
    /// Capture interval as a `Duration`.
    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    /// Initial reconnect delay as a `Duration`.
    pub fn reconnect_delay_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_initial_ms)
    }

    /// Reconnect delay cap as a `Duration`.
    pub fn reconnect_delay_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_max_ms)
    }

    /// Connect deadline as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
