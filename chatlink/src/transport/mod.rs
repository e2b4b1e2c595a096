//! Channel layer abstraction.
//!
//! Defines the [`Channel`] trait that concrete message channels satisfy.
//! Implementations:
//! - [`ws::WsChannel`] — WebSocket channel to the message server
//! - [`loopback::LoopbackChannel`] — in-process channel for testing
//!
//! A [`Connector`] opens fresh channels; the session layer calls it on
//! every (re)connection attempt so a single connector value carries the
//! endpoint and credentials across reconnects.

pub mod loopback;
pub mod ws;

use std::fmt;

use chatlink_proto::codec::CodecError;
use chatlink_proto::event::ServerEvent;
use chatlink_proto::frame::ClientFrame;
use chatlink_proto::id::ConversationId;

/// Lifecycle state of a conversation channel.
///
/// Transitions only move forward within one connection attempt:
/// `Idle → Connecting → Open → Closing → Closed`. A reconnect starts a
/// new cycle from `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No connection attempt has been made yet.
    Idle,
    /// A connection attempt is in flight.
    Connecting,
    /// The channel is established and frames flow both ways.
    Open,
    /// A local shutdown has been requested; no new frames accepted.
    Closing,
    /// The channel is gone, cleanly or otherwise.
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Errors that can occur during channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The channel is not open; the frame was not sent.
    #[error("channel is not open")]
    NotOpen,

    /// The connection attempt timed out.
    #[error("channel connect timed out")]
    Timeout,

    /// The server refused the connection during the handshake.
    #[error("handshake rejected: {0}")]
    Rejected(String),

    /// A payload could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// An underlying I/O error occurred.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An item delivered by the server side of a channel.
#[derive(Debug)]
pub enum ChannelItem {
    /// A decoded server event.
    Event(ServerEvent),
    /// The channel closed. `code` is the close code when the peer sent
    /// a close frame; `None` when the connection dropped without one.
    Closed { code: Option<u16> },
}

impl ChannelItem {
    /// Returns `true` if this is a close with a clean close code.
    ///
    /// A drop without a close frame counts as abnormal.
    #[must_use]
    pub const fn is_clean_close(&self) -> bool {
        match self {
            Self::Closed { code: Some(code) } => chatlink_proto::close::is_clean(*code),
            Self::Closed { code: None } | Self::Event(_) => false,
        }
    }
}

/// Async trait for an established bidirectional message channel.
///
/// Frames are typed at this boundary; JSON encoding happens inside the
/// implementation. Delivery of a sent frame is NOT guaranteed — callers
/// wait for the server echo to confirm it.
pub trait Channel: Send + Sync {
    /// Send one outbound frame.
    ///
    /// Returns `Ok(())` once the frame has been handed to the underlying
    /// connection.
    fn send(
        &self,
        frame: &ClientFrame,
    ) -> impl std::future::Future<Output = Result<(), ChannelError>> + Send;

    /// Receive the next inbound item.
    ///
    /// Blocks asynchronously until an event arrives or the channel
    /// closes. After a [`ChannelItem::Closed`] has been yielded, further
    /// calls return [`ChannelError::NotOpen`].
    fn recv(&self) -> impl std::future::Future<Output = Result<ChannelItem, ChannelError>> + Send;

    /// Check whether the channel is currently open.
    fn is_open(&self) -> bool;

    /// Request a clean shutdown of the channel.
    fn close(&self) -> impl std::future::Future<Output = Result<(), ChannelError>> + Send;
}

/// Opens channels to a conversation endpoint.
///
/// The session layer owns one connector per binding and calls
/// [`Connector::connect`] for the initial attempt and every reconnect.
pub trait Connector: Send + Sync + 'static {
    /// The channel type this connector produces.
    type Channel: Channel + Send + Sync + 'static;

    /// Open a new channel to the given conversation.
    fn connect(
        &self,
        conversation: ConversationId,
    ) -> impl std::future::Future<Output = Result<Self::Channel, ChannelError>> + Send;
}
