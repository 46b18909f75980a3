//! Message-oriented transport handle.
//!
//! A `MessageLink` is a pair of mpsc channels carrying whole binary
//! messages — the transport behind them (WebSocket pump tasks, or a
//! loopback pair in tests) is invisible to the pipelines. Each `send`
//! produces exactly one message on the channel; each `recv` yields one.

use tokio::sync::mpsc;

use crate::error::MirrorError;

/// Channel capacity between a pipeline and its transport pumps. Kept
/// small so the policy-bearing outbound queue, not the channel, absorbs
/// backpressure.
pub(crate) const LINK_CHANNEL_CAPACITY: usize = 32;

/// One endpoint of a bidirectional binary message channel.
#[derive(Debug)]
pub struct MessageLink {
    tx: mpsc::Sender<Vec<u8>>,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl MessageLink {
    /// Wrap pre-wired channel halves (used by transport adapters).
    pub fn new(tx: mpsc::Sender<Vec<u8>>, rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self { tx, rx }
    }

    /// Send one whole message to the peer.
    pub async fn send(&self, msg: Vec<u8>) -> Result<(), MirrorError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| MirrorError::TransportClosed)
    }

    /// Receive the next whole message, or `None` when the transport
    /// has closed.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Split into independent send/receive halves.
    pub fn split(self) -> (mpsc::Sender<Vec<u8>>, mpsc::Receiver<Vec<u8>>) {
        (self.tx, self.rx)
    }

    /// An in-memory cross-wired pair for tests: whatever one endpoint
    /// sends, the other receives.
    pub fn pair(capacity: usize) -> (MessageLink, MessageLink) {
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);
        (
            MessageLink { tx: a_tx, rx: a_rx },
            MessageLink { tx: b_tx, rx: b_rx },
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_is_cross_wired() {
        let (a, mut b) = MessageLink::pair(4);
        a.send(vec![1, 2, 3]).await.unwrap();
        assert_eq!(b.recv().await.unwrap(), vec![1, 2, 3]);
        b.send(vec![4]).await.unwrap();
        let (_, mut a_rx) = a.split();
        assert_eq!(a_rx.recv().await.unwrap(), vec![4]);
    }

    #[tokio::test]
    async fn recv_returns_none_after_peer_drop() {
        let (a, mut b) = MessageLink::pair(4);
        drop(a);
        assert!(b.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_to_dropped_peer_reports_transport_closed() {
        let (a, b) = MessageLink::pair(4);
        drop(b);
        assert!(matches!(
            a.send(vec![0]).await,
            Err(MirrorError::TransportClosed)
        ));
    }
}
