//! WebSocket accept loop and per-viewer pipelines.
//!
//! Every accepted viewer gets a fully independent mirror pipeline —
//! its own frame source, fingerprint cache, sequence counter, and
//! outbound queue — so one slow viewer cannot stall or corrupt
//! another's stream.

use std::sync::Arc;

use mira_core::net::ws;
use mira_core::{
    InputEvent, JpegFrameCodec, MirrorError, MirrorService, SyntheticSource, WebpTileCodec,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ServerConfig;

/// Run the server until `cancel` fires.
pub async fn run(config: ServerConfig, cancel: CancellationToken) -> Result<(), MirrorError> {
    let listener = TcpListener::bind(&config.network.bind).await?;
    info!(addr = %config.network.bind, "listening for viewers");

    // Decoded input events from all viewers funnel into one channel;
    // a capture backend with injection support would consume it here.
    let (input_tx, mut input_rx) = mpsc::channel::<InputEvent>(64);
    tokio::spawn(async move {
        while let Some(event) = input_rx.recv().await {
            info!(?event, "viewer input");
        }
    });

    let config = Arc::new(config);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("server stopping");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                info!(%peer, "viewer connecting");
                let config = Arc::clone(&config);
                let input_tx = input_tx.clone();
                let child = cancel.child_token();
                tokio::spawn(async move {
                    if let Err(e) = serve_viewer(stream, &config, input_tx, child).await {
                        match e {
                            MirrorError::TransportClosed => info!(%peer, "viewer disconnected"),
                            other => warn!(%peer, error = %other, "viewer session ended"),
                        }
                    }
                });
            }
        }
    }
}

/// One viewer: WebSocket handshake, then a mirror pipeline of its own.
async fn serve_viewer(
    stream: TcpStream,
    config: &ServerConfig,
    input_tx: mpsc::Sender<InputEvent>,
    cancel: CancellationToken,
) -> Result<(), MirrorError> {
    let link = ws::accept(stream).await?;
    let source = SyntheticSource::new(config.display.width, config.display.height);
    let service = MirrorService::new(
        source,
        config.stream.clone(),
        Arc::new(WebpTileCodec::new(config.stream.tile_quality)),
        Arc::new(JpegFrameCodec::new(config.stream.frame_quality)),
    )
    .with_input_sink(input_tx);

    // Tie the pipeline to server shutdown.
    let token = service.cancellation_token();
    let guard = tokio::spawn(async move {
        cancel.cancelled().await;
        token.cancel();
    });

    let result = service.run(link).await;
    guard.abort();
    result
}
