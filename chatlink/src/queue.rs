//! Outbound frame queue.
//!
//! Holds frames that could not be sent while the channel was down and
//! flushes them in FIFO order once it reopens. The whole flush runs
//! under the queue lock so a concurrent `push` cannot interleave a new
//! frame ahead of older ones.
//!
//! Not every frame is worth keeping across a failure: a chat message
//! must eventually reach the server, but a stale typing signal or read
//! receipt is useless by the time the channel recovers.

use std::collections::VecDeque;

use tokio::sync::Mutex;

use chatlink_proto::frame::ClientFrame;

use crate::transport::{Channel, ChannelError};

/// Retention class of an outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// User content; requeued if a flush fails mid-send.
    ChatMessage,
    /// Ephemeral typing signal; dropped on failure.
    TypingSignal,
    /// Read receipt; dropped on failure, the next receipt supersedes it.
    ReadReceipt,
}

impl EnvelopeKind {
    /// Classify a frame.
    #[must_use]
    pub const fn of(frame: &ClientFrame) -> Self {
        match frame {
            ClientFrame::ChatMessage { .. } => Self::ChatMessage,
            ClientFrame::Typing { .. } => Self::TypingSignal,
            ClientFrame::ReadMessages { .. } => Self::ReadReceipt,
        }
    }

    /// Whether a frame of this kind survives a failed send.
    #[must_use]
    pub const fn requeue_on_failure(self) -> bool {
        matches!(self, Self::ChatMessage)
    }
}

/// FIFO queue of outbound frames awaiting an open channel.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    inner: Mutex<VecDeque<ClientFrame>>,
}

impl OutboundQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame to the back of the queue.
    pub async fn push(&self, frame: ClientFrame) {
        self.inner.lock().await.push_back(frame);
    }

    /// Number of queued frames.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether the queue holds no frames.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Send every queued frame over `channel` in FIFO order.
    ///
    /// Returns the number of frames delivered. The queue lock is held
    /// for the whole pass. On a send failure the flush stops: the
    /// failed frame is put back at the front if its kind survives
    /// failure, otherwise it is dropped, and everything behind it stays
    /// queued in order either way.
    ///
    /// # Errors
    ///
    /// Propagates the [`ChannelError`] of the failed send.
    pub async fn flush<C: Channel>(&self, channel: &C) -> Result<usize, ChannelError> {
        let mut queue = self.inner.lock().await;
        let mut sent = 0;

        while let Some(frame) = queue.pop_front() {
            if let Err(e) = channel.send(&frame).await {
                if EnvelopeKind::of(&frame).requeue_on_failure() {
                    queue.push_front(frame);
                } else {
                    tracing::debug!(kind = ?EnvelopeKind::of(&frame), "dropping stale frame after send failure");
                }
                tracing::warn!(sent, remaining = queue.len(), "queue flush interrupted");
                return Err(e);
            }
            sent += 1;
        }

        if sent > 0 {
            tracing::info!(sent, "flushed outbound queue");
        }
        Ok(sent)
    }
}
