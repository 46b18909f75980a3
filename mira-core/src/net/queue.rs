//! Outbound frame queue with keyframe-preserving backpressure.
//!
//! `send` enqueues; a single writer drains in FIFO order, so wire
//! frames observe strict per-connection ordering. When the queue climbs
//! past its high-water mark, the oldest queued delta or empty frame is
//! shed — those are disposable by design. Keyframes are never dropped,
//! and if nothing is droppable the incoming frame itself is rejected
//! unless it is a keyframe.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::error::MirrorError;
use crate::wire::{WireFrame, KIND_KEYFRAME};

/// What `push` did with the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Enqueued without shedding anything.
    Enqueued,
    /// Enqueued after dropping the oldest droppable frame.
    DroppedOldest,
    /// The queue was saturated with protected frames; the new frame
    /// was discarded.
    RejectedNew,
}

#[derive(Debug)]
struct QueuedFrame {
    kind: u8,
    bytes: Vec<u8>,
}

/// FIFO of serialized frames shared between a pipeline and its writer.
#[derive(Debug)]
pub struct OutboundQueue {
    inner: Mutex<VecDeque<QueuedFrame>>,
    notify: Notify,
    high_water: usize,
}

impl OutboundQueue {
    pub fn new(high_water: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            high_water: high_water.max(1),
        }
    }

    /// Serialize and enqueue a frame, applying the drop policy at the
    /// high-water mark.
    pub fn push(&self, frame: &WireFrame) -> Result<PushOutcome, MirrorError> {
        let bytes = frame.encode()?;
        let kind = frame.kind();

        let outcome = {
            let mut q = self.inner.lock().expect("outbound queue poisoned");
            let mut outcome = PushOutcome::Enqueued;
            if q.len() >= self.high_water {
                if let Some(pos) = q.iter().position(|f| WireFrame::is_droppable_kind(f.kind)) {
                    q.remove(pos);
                    outcome = PushOutcome::DroppedOldest;
                } else if kind != KIND_KEYFRAME {
                    return Ok(PushOutcome::RejectedNew);
                }
            }
            q.push_back(QueuedFrame { kind, bytes });
            outcome
        };

        self.notify.notify_one();
        Ok(outcome)
    }

    /// Dequeue the oldest frame without waiting.
    pub fn try_pop(&self) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .expect("outbound queue poisoned")
            .pop_front()
            .map(|f| f.bytes)
    }

    /// Dequeue the oldest frame, waiting for one if the queue is empty.
    pub async fn pop(&self) -> Vec<u8> {
        loop {
            if let Some(bytes) = self.try_pop() {
                return bytes;
            }
            self.notify.notified().await;
        }
    }

    /// Frames currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("outbound queue poisoned").len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything queued (used when a connection is replaced).
    pub fn clear(&self) {
        self.inner.lock().expect("outbound queue poisoned").clear();
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn empty(seq: u32) -> WireFrame {
        WireFrame::Empty { seq, ts: 0 }
    }

    fn delta(seq: u32) -> WireFrame {
        WireFrame::Delta {
            seq,
            ts: 0,
            tiles: Vec::new(),
        }
    }

    fn keyframe(seq: u32) -> WireFrame {
        WireFrame::Keyframe {
            seq,
            ts: 0,
            width: 8,
            height: 8,
            tile: 64,
            payload: vec![seq as u8],
        }
    }

    #[test]
    fn fifo_order_preserved() {
        let q = OutboundQueue::new(8);
        q.push(&empty(0)).unwrap();
        q.push(&delta(1)).unwrap();
        q.push(&empty(2)).unwrap();
        for seq in 0..3u32 {
            let bytes = q.try_pop().unwrap();
            assert_eq!(WireFrame::decode(&bytes).unwrap().seq(), seq);
        }
        assert!(q.try_pop().is_none());
    }

    #[test]
    fn high_water_sheds_oldest_droppable() {
        let q = OutboundQueue::new(3);
        q.push(&keyframe(0)).unwrap();
        q.push(&delta(1)).unwrap();
        q.push(&delta(2)).unwrap();
        // Queue full: pushing sheds the oldest delta (seq 1).
        assert_eq!(q.push(&delta(3)).unwrap(), PushOutcome::DroppedOldest);
        let seqs: Vec<u32> = std::iter::from_fn(|| q.try_pop())
            .map(|b| WireFrame::decode(&b).unwrap().seq())
            .collect();
        assert_eq!(seqs, [0, 2, 3]);
    }

    #[test]
    fn keyframes_are_never_dropped() {
        let q = OutboundQueue::new(2);
        q.push(&keyframe(0)).unwrap();
        q.push(&keyframe(1)).unwrap();
        // Saturated with keyframes: a new delta is rejected...
        assert_eq!(q.push(&delta(2)).unwrap(), PushOutcome::RejectedNew);
        assert_eq!(q.len(), 2);
        // ...but a new keyframe still gets through.
        assert_eq!(q.push(&keyframe(3)).unwrap(), PushOutcome::Enqueued);
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn clear_empties_the_queue() {
        let q = OutboundQueue::new(4);
        q.push(&empty(0)).unwrap();
        q.push(&empty(1)).unwrap();
        q.clear();
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn pop_waits_for_push() {
        use std::sync::Arc;
        let q = Arc::new(OutboundQueue::new(4));
        let q2 = Arc::clone(&q);
        let waiter = tokio::spawn(async move { q2.pop().await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        q.push(&empty(42)).unwrap();
        let bytes = waiter.await.unwrap();
        assert_eq!(WireFrame::decode(&bytes).unwrap().seq(), 42);
    }
}
