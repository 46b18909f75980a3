//! Viewer application: client wiring plus terminal reporting.
//!
//! There is deliberately no rendering here — the canvas is published
//! on a watch channel, and a GUI would subscribe to it exactly the way
//! the log reporter below does.

use std::sync::Arc;
use std::time::Duration;

use mira_core::{
    JpegFrameCodec, LinkStatus, MirrorClient, SessionConfig, WebpTileCodec,
};
use tracing::info;

/// Run the viewer against `url` until Ctrl-C.
pub async fn run(url: String, config: SessionConfig) {
    let client = Arc::new(MirrorClient::with_ws_url(
        url.clone(),
        config.clone(),
        Arc::new(WebpTileCodec::new(config.tile_quality)),
        Arc::new(JpegFrameCodec::new(config.frame_quality)),
    ));

    // Status transitions.
    let mut status_rx = client.status_receiver();
    tokio::spawn(async move {
        loop {
            let status = *status_rx.borrow_and_update();
            info!(%status, "connection status");
            if status == LinkStatus::Failed || status_rx.changed().await.is_err() {
                break;
            }
        }
    });

    // Periodic stats summary.
    let stats_rx = client.stats_receiver();
    let canvas_rx = client.canvas_receiver();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(5));
        loop {
            ticker.tick().await;
            let stats = stats_rx.borrow().clone();
            let (w, h, ready) = {
                let snap = canvas_rx.borrow();
                (snap.width, snap.height, snap.ready)
            };
            info!(
                fps = format!("{:.1}", stats.fps),
                frames = stats.total_frames,
                bytes = stats.total_bytes,
                latency_ms = stats.last_latency_ms,
                canvas = format!("{w}x{h} ready={ready}"),
                "viewer stats"
            );
        }
    });

    // Ctrl-C stops the client; run() returns once disconnected.
    let stopper = Arc::clone(&client);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received — stopping viewer");
        stopper.stop();
    });

    info!(%url, "viewer starting");
    client.run().await;
    info!("viewer stopped");
}
