//! Loopback channel for testing.
//!
//! Uses in-process [`tokio::sync::mpsc`] channels to stand in for a
//! server connection. [`loopback_pair`] returns the client-side
//! [`LoopbackChannel`] and a [`ServerHandle`] the test drives: the
//! handle observes frames the client sent and injects server events or
//! a close. [`LoopbackConnector`] produces such pairs on demand and can
//! be scripted to fail connection attempts, which is how the reconnect
//! path is exercised without a network.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc};

use chatlink_proto::event::ServerEvent;
use chatlink_proto::frame::ClientFrame;
use chatlink_proto::id::ConversationId;

use super::{Channel, ChannelError, ChannelItem, Connector};

/// Client side of an in-process channel pair.
pub struct LoopbackChannel {
    /// Frames the client sends land here for the test to observe.
    outbound: mpsc::UnboundedSender<ClientFrame>,
    /// Items the test injects for the client to receive.
    inbound: Mutex<mpsc::UnboundedReceiver<ChannelItem>>,
    /// Shared open flag, flipped by [`ServerHandle::drop_connection`].
    open: Arc<AtomicBool>,
}

/// Test-side handle for driving a [`LoopbackChannel`].
pub struct ServerHandle {
    sent: mpsc::UnboundedReceiver<ClientFrame>,
    inject: mpsc::UnboundedSender<ChannelItem>,
    open: Arc<AtomicBool>,
}

/// Create a connected channel/handle pair.
#[must_use]
pub fn loopback_pair() -> (LoopbackChannel, ServerHandle) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let open = Arc::new(AtomicBool::new(true));

    let channel = LoopbackChannel {
        outbound: out_tx,
        inbound: Mutex::new(in_rx),
        open: Arc::clone(&open),
    };
    let handle = ServerHandle {
        sent: out_rx,
        inject: in_tx,
        open,
    };
    (channel, handle)
}

impl ServerHandle {
    /// Receive the next frame the client sent, or `None` if the client
    /// side was dropped.
    pub async fn next_frame(&mut self) -> Option<ClientFrame> {
        self.sent.recv().await
    }

    /// Receive the next frame without waiting.
    pub fn try_next_frame(&mut self) -> Option<ClientFrame> {
        self.sent.try_recv().ok()
    }

    /// Push a server event toward the client.
    pub fn push(&self, event: ServerEvent) {
        let _ = self.inject.send(ChannelItem::Event(event));
    }

    /// Close the channel with the given close code.
    pub fn close(&self, code: u16) {
        self.open.store(false, Ordering::Relaxed);
        let _ = self.inject.send(ChannelItem::Closed { code: Some(code) });
    }

    /// Drop the connection without a close handshake.
    pub fn drop_connection(&self) {
        self.open.store(false, Ordering::Relaxed);
        let _ = self.inject.send(ChannelItem::Closed { code: None });
    }
}

impl Channel for LoopbackChannel {
    async fn send(&self, frame: &ClientFrame) -> Result<(), ChannelError> {
        if !self.open.load(Ordering::Relaxed) {
            return Err(ChannelError::NotOpen);
        }
        self.outbound
            .send(frame.clone())
            .map_err(|_| ChannelError::NotOpen)
    }

    async fn recv(&self) -> Result<ChannelItem, ChannelError> {
        let mut rx = self.inbound.lock().await;
        rx.recv().await.ok_or(ChannelError::NotOpen)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    async fn close(&self) -> Result<(), ChannelError> {
        self.open.store(false, Ordering::Relaxed);
        Ok(())
    }
}

/// Scriptable connector producing loopback pairs.
///
/// Each successful [`Connector::connect`] creates a fresh pair and
/// delivers the [`ServerHandle`] through the receiver returned by
/// [`LoopbackConnector::handles`]. Queued failures are consumed first,
/// one per attempt.
#[derive(Clone)]
pub struct LoopbackConnector {
    inner: Arc<parking_lot::Mutex<ConnectorScript>>,
}

struct ConnectorScript {
    failures: VecDeque<ChannelError>,
    handle_tx: mpsc::UnboundedSender<ServerHandle>,
}

impl LoopbackConnector {
    /// Create a connector and the receiver for server handles of the
    /// channels it opens.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerHandle>) {
        let (handle_tx, handle_rx) = mpsc::unbounded_channel();
        let connector = Self {
            inner: Arc::new(parking_lot::Mutex::new(ConnectorScript {
                failures: VecDeque::new(),
                handle_tx,
            })),
        };
        (connector, handle_rx)
    }

    /// Make the next `n` connection attempts fail with a timeout.
    pub fn fail_next(&self, n: usize) {
        let mut script = self.inner.lock();
        for _ in 0..n {
            script.failures.push_back(ChannelError::Timeout);
        }
    }
}

impl Connector for LoopbackConnector {
    type Channel = LoopbackChannel;

    async fn connect(
        &self,
        _conversation: ConversationId,
    ) -> Result<LoopbackChannel, ChannelError> {
        let mut script = self.inner.lock();
        if let Some(err) = script.failures.pop_front() {
            return Err(err);
        }
        let (channel, handle) = loopback_pair();
        let _ = script.handle_tx.send(handle);
        Ok(channel)
    }
}
