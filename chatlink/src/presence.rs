//! Typing debounce and peer presence tracking.
//!
//! [`TypingTracker`] owns the local side: a keystroke opens a typing
//! burst, further keystrokes extend it, and the burst ends when no
//! keystroke lands within the debounce window (or a message is sent).
//! The tracker is pure state; the session drives it with the current
//! time and a `select!` arm on [`TypingTracker::deadline`].
//!
//! [`PresenceRegistry`] owns the remote side: the peer's typing flag
//! (with a safety timeout in case the stop signal is lost) and per-user
//! online status.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

use chatlink_proto::id::UserId;

/// How long after the last keystroke a typing burst ends.
pub const TYPING_DEBOUNCE: Duration = Duration::from_millis(3000);

/// How long a peer's typing flag may stay up without a fresh signal.
pub const PEER_TYPING_SAFETY: Duration = Duration::from_millis(10_000);

/// Debounced local typing state.
#[derive(Debug)]
pub struct TypingTracker {
    debounce: Duration,
    deadline: Option<Instant>,
}

impl TypingTracker {
    /// Create a tracker with the given debounce window.
    #[must_use]
    pub const fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            deadline: None,
        }
    }

    /// Register a keystroke at `now`.
    ///
    /// Returns `true` exactly when this keystroke opens a new typing
    /// burst, meaning a start signal should go out. Keystrokes inside
    /// an open burst only push the deadline and return `false`.
    pub fn keystroke(&mut self, now: Instant) -> bool {
        let starting = self.deadline.is_none();
        self.deadline = Some(now + self.debounce);
        starting
    }

    /// When the current burst ends, if one is open.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check the deadline at `now`.
    ///
    /// Returns `true` when the burst just expired and a stop signal
    /// should go out.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// End the burst immediately, as when a message is sent.
    ///
    /// Returns `true` if a burst was open and a stop signal should go out.
    pub fn stop(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// Whether a typing burst is currently open.
    #[must_use]
    pub const fn is_typing(&self) -> bool {
        self.deadline.is_some()
    }
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new(TYPING_DEBOUNCE)
    }
}

/// Online status of one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStatus {
    /// Whether the user is currently connected.
    pub online: bool,
    /// Last-seen timestamp reported by the server, if any.
    pub last_seen: Option<String>,
}

#[derive(Debug, Default)]
struct PresenceState {
    peer_typing: bool,
    typing_deadline: Option<Instant>,
    users: HashMap<UserId, PeerStatus>,
}

/// Shared view of the remote side of a conversation.
#[derive(Debug)]
pub struct PresenceRegistry {
    inner: RwLock<PresenceState>,
    safety: Duration,
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceRegistry {
    /// Create a registry with the default safety timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_safety(PEER_TYPING_SAFETY)
    }

    /// Create a registry with a custom safety timeout.
    #[must_use]
    pub fn with_safety(safety: Duration) -> Self {
        Self {
            inner: RwLock::new(PresenceState::default()),
            safety,
        }
    }

    /// Apply a typing indicator from the server.
    ///
    /// Raising the flag arms the safety deadline; a fresh indicator
    /// re-arms it.
    pub fn set_peer_typing(&self, is_typing: bool, now: Instant) {
        let mut state = self.inner.write();
        state.peer_typing = is_typing;
        state.typing_deadline = is_typing.then(|| now + self.safety);
    }

    /// Whether the peer is currently shown as typing.
    #[must_use]
    pub fn peer_typing(&self) -> bool {
        self.inner.read().peer_typing
    }

    /// When the typing flag must be force-cleared, if it is up.
    #[must_use]
    pub fn typing_deadline(&self) -> Option<Instant> {
        self.inner.read().typing_deadline
    }

    /// Force-clear the typing flag if its safety deadline has passed.
    ///
    /// Returns `true` if the flag was cleared.
    pub fn expire_typing(&self, now: Instant) -> bool {
        let mut state = self.inner.write();
        match state.typing_deadline {
            Some(deadline) if now >= deadline => {
                state.peer_typing = false;
                state.typing_deadline = None;
                tracing::debug!("peer typing flag cleared by safety timeout");
                true
            }
            _ => false,
        }
    }

    /// Apply a user status update from the server.
    pub fn set_user_status(&self, user: UserId, online: bool, last_seen: Option<String>) {
        self.inner
            .write()
            .users
            .insert(user, PeerStatus { online, last_seen });
    }

    /// Last known status of a user, if the server has reported one.
    #[must_use]
    pub fn user_status(&self, user: UserId) -> Option<PeerStatus> {
        self.inner.read().users.get(&user).cloned()
    }
}
