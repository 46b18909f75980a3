//! Configuration for the mirror server.

use std::path::Path;

use mira_core::SessionConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Mirrored display settings.
    pub display: DisplayConfig,
    /// Delta pipeline tuning, shared with viewers by convention.
    pub stream: SessionConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the WebSocket listener binds to.
    pub bind: String,
}

/// Source display configuration.
///
/// The bundled server mirrors a synthetic test pattern; a real capture
/// backend would replace these with monitor enumeration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Source frame width in pixels.
    pub width: u16,
    /// Source frame height in pixels.
    pub height: u16,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8765".into(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = ServerConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("bind"));
        assert!(text.contains("fallback_threshold"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = ServerConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ServerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.bind, "127.0.0.1:8765");
        assert_eq!(parsed.display.width, 1280);
        assert_eq!(parsed.stream.tile, 64);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let parsed: ServerConfig = toml::from_str("[display]\nwidth = 640\n").unwrap();
        assert_eq!(parsed.display.width, 640);
        assert_eq!(parsed.display.height, 720);
        assert_eq!(parsed.stream.tile_quality, 80);
    }
}
