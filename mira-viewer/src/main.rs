//! MIRA viewer — entry point.
//!
//! ```text
//! mira-viewer                              Connect to ws://127.0.0.1:8765
//! mira-viewer --url ws://host:port        Connect elsewhere
//! mira-viewer --reconnect-delay-ms 500    Tune the backoff ladder
//! ```

use clap::Parser;
use mira_core::SessionConfig;
use tracing_subscriber::EnvFilter;

mod app;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mira-viewer", about = "MIRA screen mirroring viewer")]
struct Cli {
    /// Server WebSocket URL.
    #[arg(long, default_value = "ws://127.0.0.1:8765")]
    url: String,

    /// Initial reconnect delay in milliseconds.
    #[arg(long)]
    reconnect_delay_ms: Option<u64>,

    /// Canvas placeholder width before the first keyframe.
    #[arg(long)]
    default_width: Option<u16>,

    /// Canvas placeholder height before the first keyframe.
    #[arg(long)]
    default_height: Option<u16>,

    /// Log level (overridden by RUST_LOG).
    #[arg(long, default_value = "info")]
    log_level: String,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = SessionConfig::default();
    if let Some(delay) = cli.reconnect_delay_ms {
        config.reconnect_delay_initial_ms = delay;
    }
    if let Some(width) = cli.default_width {
        config.default_width = width;
    }
    if let Some(height) = cli.default_height {
        config.default_height = height;
    }

    app::run(cli.url, config).await;
}
