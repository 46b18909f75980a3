//! MIRA server — entry point.
//!
//! ```text
//! mira-server                        Run with defaults
//! mira-server --config <path>       Load a custom config TOML
//! mira-server --gen-config          Write default config to stdout
//! mira-server --bind 0.0.0.0:9000   Override the listen address
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod server;

use config::ServerConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mira-server", about = "MIRA screen mirroring server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "mira-server.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Override the listen address.
    #[arg(long)]
    bind: Option<String>,

    /// Override the mirrored width.
    #[arg(long)]
    width: Option<u16>,

    /// Override the mirrored height.
    #[arg(long)]
    height: Option<u16>,

    /// Override the tile size in pixels.
    #[arg(long)]
    tile_size: Option<u16>,

    /// Override the delta→keyframe fallback threshold (0.0–1.0).
    #[arg(long)]
    fallback_threshold: Option<f64>,

    /// Override the capture interval in milliseconds.
    #[arg(long)]
    capture_interval_ms: Option<u64>,

    /// Override the WebP tile quality (0–100).
    #[arg(long)]
    tile_quality: Option<u8>,

    /// Override the JPEG keyframe quality (0–100).
    #[arg(long)]
    frame_quality: Option<u8>,
}

impl Cli {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(bind) = &self.bind {
            config.network.bind = bind.clone();
        }
        if let Some(width) = self.width {
            config.display.width = width;
        }
        if let Some(height) = self.height {
            config.display.height = height;
        }
        if let Some(tile) = self.tile_size {
            config.stream.tile = tile;
        }
        if let Some(threshold) = self.fallback_threshold {
            config.stream.fallback_threshold = threshold;
        }
        if let Some(interval) = self.capture_interval_ms {
            config.stream.capture_interval_ms = interval;
        }
        if let Some(q) = self.tile_quality {
            config.stream.tile_quality = q;
        }
        if let Some(q) = self.frame_quality {
            config.stream.frame_quality = q;
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ServerConfig::load(&cli.config);
    cli.apply(&mut config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("mira-server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "mirroring {}x{} at {} ms/frame, tile {} px",
        config.display.width,
        config.display.height,
        config.stream.capture_interval_ms,
        config.stream.tile
    );

    // Ctrl-C handler.
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received — shutting down");
        ctrl_c.cancel();
    });

    server::run(config, cancel).await?;
    Ok(())
}
