//! WebSocket transport adapter.
//!
//! Wraps a tokio-tungstenite socket into a [`MessageLink`] by spawning
//! two pump tasks: a writer draining the outbound channel into the
//! sink, and a reader forwarding binary messages into the inbound
//! channel. Either side closing tears both down, which the pipelines
//! observe as `TransportClosed`.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

use crate::error::MirrorError;
use crate::net::link::{MessageLink, LINK_CHANNEL_CAPACITY};

/// Dial a `ws://` URL and wrap the socket.
pub async fn connect(url: &str) -> Result<MessageLink, MirrorError> {
    let (socket, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(map_ws_error)?;
    Ok(spawn_pumps(socket))
}

/// Accept a WebSocket handshake on an established TCP stream.
pub async fn accept(stream: TcpStream) -> Result<MessageLink, MirrorError> {
    let socket = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(map_ws_error)?;
    Ok(spawn_pumps(socket))
}

fn spawn_pumps<S>(socket: WebSocketStream<S>) -> MessageLink
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(LINK_CHANNEL_CAPACITY);
    let (in_tx, in_rx) = mpsc::channel::<Vec<u8>>(LINK_CHANNEL_CAPACITY);

    // Writer pump: outbound channel → socket.
    tokio::spawn(async move {
        while let Some(bytes) = out_rx.recv().await {
            if let Err(e) = sink.send(Message::Binary(bytes)).await {
                debug!(error = %e, "websocket write ended");
                return;
            }
        }
        // Sender side dropped — close politely.
        let _ = sink.send(Message::Close(None)).await;
    });

    // Reader pump: socket → inbound channel. Pings are answered by
    // tungstenite itself; anything non-binary is ignored.
    tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Binary(bytes)) => {
                    if in_tx.send(bytes).await.is_err() {
                        return; // receiver dropped
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("websocket closed by peer");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "websocket read ended");
                    return;
                }
            }
        }
    });

    MessageLink::new(out_tx, in_rx)
}

/// Map tungstenite errors onto the pipeline taxonomy. HTTP-level
/// rejections are terminal (the peer refused us); everything else is
/// retryable.
fn map_ws_error(e: WsError) -> MirrorError {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => MirrorError::TransportClosed,
        WsError::Io(io) => MirrorError::Io(io),
        WsError::Http(response) => {
            MirrorError::Handshake(format!("HTTP {}", response.status()))
        }
        WsError::Url(e) => MirrorError::Handshake(format!("bad URL: {e}")),
        other => MirrorError::Other(format!("websocket error: {other}")),
    }
}

// ── Tests ────────────────────────────────────────────────────────
