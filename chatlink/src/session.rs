//! Conversation session driver.
//!
//! One session serves one conversation. [`SessionHandle::bind`] spawns
//! a background task that owns the channel, the reconnect supervisor,
//! the outbound queue, and the typing trackers, and drives them from a
//! single `select!` loop. The caller talks to the task through
//! [`SessionCommand`]s and drains [`SessionEvent`]s:
//!
//! ```text
//! caller  ─── SessionCommand →  driver task
//!         ←── SessionEvent ───
//! ```
//!
//! Binding a different conversation means tearing this session down and
//! binding a new one; [`SessionHandle::rebind`] does both.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;

use chatlink_proto::event::{ServerEvent, ServerMessage};
use chatlink_proto::frame::ClientFrame;
use chatlink_proto::id::{ClientTag, ConversationId, UserId};

use crate::presence::{PEER_TYPING_SAFETY, PresenceRegistry, TYPING_DEBOUNCE, TypingTracker};
use crate::queue::OutboundQueue;
use crate::reconcile::{DeliveryStatus, MessageLog, MessageRecord, Reconciliation};
use crate::reconnect::{ReconnectDecision, ReconnectPlan, ReconnectSupervisor};
use crate::transport::{Channel, ChannelError, ChannelItem, ChannelState, Connector};

/// Default buffer size for the command and event channels.
const DEFAULT_EVENT_BUFFER: usize = 64;

/// Everything a session needs to know about its conversation.
#[derive(Debug, Clone)]
pub struct SessionBinding {
    /// The conversation this session serves.
    pub conversation: ConversationId,
    /// The local user, needed to tell echoes from peer messages.
    pub local_user: UserId,
    /// Reconnection schedule.
    pub reconnect: ReconnectPlan,
    /// Debounce window for outgoing typing signals.
    pub typing_debounce: Duration,
    /// Safety timeout for the peer typing flag.
    pub peer_typing_safety: Duration,
    /// Buffer size for the command and event channels.
    pub event_buffer: usize,
}

impl SessionBinding {
    /// Binding with default timing parameters.
    #[must_use]
    pub fn new(conversation: ConversationId, local_user: UserId) -> Self {
        Self {
            conversation,
            local_user,
            reconnect: ReconnectPlan::default(),
            typing_debounce: TYPING_DEBOUNCE,
            peer_typing_safety: PEER_TYPING_SAFETY,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Commands sent from the caller to the driver task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Transmit a message already recorded in the log under `tag`.
    Transmit {
        /// Log tag of the pending record.
        tag: ClientTag,
        /// Message text.
        content: String,
    },
    /// The user pressed a key in the composer.
    Keystroke,
    /// Mark the conversation read.
    MarkRead,
    /// Restart connection attempts with a fresh budget.
    RetryConnect,
    /// Close the channel cleanly and end the session.
    Shutdown,
}

/// Events sent from the driver task to the caller.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The channel lifecycle state changed.
    StateChanged(ChannelState),
    /// A reconnect attempt has been scheduled.
    Reconnecting {
        /// One-based attempt number.
        attempt: u32,
        /// Attempt budget.
        max_attempts: u32,
        /// Wait before the attempt.
        delay: Duration,
    },
    /// The reconnect budget is exhausted; no further automatic attempts
    /// happen until [`SessionHandle::retry_connect`].
    ReconnectFailed,
    /// The server confirmed a message we sent.
    MessageConfirmed {
        /// Log tag of the confirmed record.
        tag: ClientTag,
    },
    /// A message arrived that was not already in the log.
    MessageReceived {
        /// The stored message.
        message: ServerMessage,
    },
    /// A message could not be sent and sits in the outbound queue.
    MessageQueued {
        /// Log tag of the queued record.
        tag: ClientTag,
    },
    /// The peer's typing state changed.
    PeerTyping {
        /// Whether the peer is typing.
        is_typing: bool,
    },
    /// The peer read our messages.
    MessagesRead,
    /// A user's online status changed.
    UserStatus {
        /// The user in question.
        user_id: UserId,
        /// Whether they are online.
        online: bool,
        /// Last-seen timestamp, if offline.
        last_seen: Option<String>,
    },
    /// A message landed in a conversation this session is not bound to.
    Notification {
        /// The other conversation.
        conversation_id: ConversationId,
        /// The stored message.
        message: ServerMessage,
    },
}

/// Errors returned by [`SessionHandle`] methods.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The driver task has ended; the session is gone.
    #[error("session is closed")]
    Closed,
}

/// Caller-side handle to a running session.
///
/// Dropping the handle aborts the driver task, which is the teardown
/// path a rebind relies on.
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    log: Arc<RwLock<MessageLog>>,
    presence: Arc<PresenceRegistry>,
    task: tokio::task::JoinHandle<()>,
}

impl SessionHandle {
    /// Bind a conversation and spawn its driver task.
    ///
    /// Returns the handle and the receiver for [`SessionEvent`]s. The
    /// driver starts its first connection attempt immediately.
    pub fn bind<C: Connector>(
        connector: C,
        binding: SessionBinding,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(binding.event_buffer);
        let (evt_tx, evt_rx) = mpsc::channel(binding.event_buffer);
        let log = Arc::new(RwLock::new(MessageLog::new(binding.local_user)));
        let presence = Arc::new(PresenceRegistry::with_safety(binding.peer_typing_safety));

        let task = tokio::spawn(run_session(
            connector,
            binding,
            Arc::clone(&log),
            Arc::clone(&presence),
            cmd_rx,
            evt_tx,
        ));

        (
            Self {
                commands: cmd_tx,
                log,
                presence,
                task,
            },
            evt_rx,
        )
    }

    /// Tear this session down and bind a different conversation.
    pub fn rebind<C: Connector>(
        self,
        connector: C,
        binding: SessionBinding,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        self.task.abort();
        Self::bind(connector, binding)
    }

    /// Record a message as pending and hand it to the driver.
    ///
    /// Returns the log tag; [`SessionEvent::MessageConfirmed`] or
    /// [`SessionEvent::MessageQueued`] will reference it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the driver task has ended.
    pub async fn send_message(&self, content: impl Into<String>) -> Result<ClientTag, SessionError> {
        let content = content.into();
        let tag = self.log.write().record_outgoing(content.clone());
        self.commands
            .send(SessionCommand::Transmit { tag, content })
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(tag)
    }

    /// Report a composer keystroke.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the driver task has ended.
    pub async fn keystroke(&self) -> Result<(), SessionError> {
        self.commands
            .send(SessionCommand::Keystroke)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Mark the conversation read.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the driver task has ended.
    pub async fn mark_read(&self) -> Result<(), SessionError> {
        self.commands
            .send(SessionCommand::MarkRead)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Restart connection attempts after the reconnect budget ran out,
    /// for example on a network-restoration signal or a user retry.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the driver task has ended.
    pub async fn retry_connect(&self) -> Result<(), SessionError> {
        self.commands
            .send(SessionCommand::RetryConnect)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Ask the driver to close the channel cleanly and end.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the driver task already ended.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.commands
            .send(SessionCommand::Shutdown)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Peer presence state for this conversation.
    #[must_use]
    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Delivery status of a sent message.
    #[must_use]
    pub fn status_of(&self, tag: ClientTag) -> Option<DeliveryStatus> {
        self.log.read().status_of(tag)
    }

    /// Fold a message stored outside the channel into the log.
    ///
    /// The REST fallback returns the stored message directly; recording
    /// it here lets the later channel echo deduplicate by server id
    /// instead of appearing twice.
    pub fn record_stored(&self, message: &ServerMessage) -> Reconciliation {
        self.log.write().apply_server_message(message)
    }

    /// Snapshot of the message log, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<MessageRecord> {
        self.log.read().records().to_vec()
    }

    /// Whether the driver task has ended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// One step of the driver loop, extracted so the `select!` borrows stay
/// disjoint from the handling code.
enum Step {
    Command(Option<SessionCommand>),
    Inbound(Result<ChannelItem, ChannelError>),
    ConnectDue,
    TypingExpired,
    SafetyExpired,
}

/// The driver task: owns the channel and every timer of one session.
#[allow(clippy::too_many_lines)]
async fn run_session<C: Connector>(
    connector: C,
    binding: SessionBinding,
    log: Arc<RwLock<MessageLog>>,
    presence: Arc<PresenceRegistry>,
    mut commands: mpsc::Receiver<SessionCommand>,
    events: mpsc::Sender<SessionEvent>,
) {
    let mut link: Option<C::Channel> = None;
    let mut state = ChannelState::Idle;
    let mut supervisor = ReconnectSupervisor::new(binding.reconnect);
    let mut typing = TypingTracker::new(binding.typing_debounce);
    let queue = OutboundQueue::new();

    // First attempt fires immediately.
    let mut connect_at: Option<Instant> = Some(Instant::now());

    loop {
        let typing_deadline = typing.deadline();
        let safety_deadline = presence.typing_deadline();

        let step = tokio::select! {
            cmd = commands.recv() => Step::Command(cmd),
            item = next_item(link.as_ref()), if link.is_some() => Step::Inbound(item),
            () = sleep_until_opt(connect_at), if connect_at.is_some() => Step::ConnectDue,
            () = sleep_until_opt(typing_deadline), if typing_deadline.is_some() => Step::TypingExpired,
            () = sleep_until_opt(safety_deadline), if safety_deadline.is_some() => Step::SafetyExpired,
        };

        match step {
            Step::ConnectDue => {
                connect_at = None;
                set_state(&events, &mut state, ChannelState::Connecting).await;

                match connector.connect(binding.conversation).await {
                    Ok(channel) => {
                        supervisor.reset();
                        // Read receipts are advisory; a lost one is logged,
                        // never retried.
                        let receipt = ClientFrame::ReadMessages {
                            conversation_id: binding.conversation,
                        };
                        if let Err(e) = channel.send(&receipt).await {
                            tracing::debug!(err = %e, "mark-read on open failed");
                        }
                        if let Err(e) = queue.flush(&channel).await {
                            tracing::warn!(err = %e, "flush on reopen failed");
                        }
                        link = Some(channel);
                        set_state(&events, &mut state, ChannelState::Open).await;
                    }
                    Err(e) => {
                        tracing::warn!(err = %e, conversation = %binding.conversation, "connect failed");
                        if !schedule_retry(&mut supervisor, &mut connect_at, &events).await {
                            set_state(&events, &mut state, ChannelState::Closed).await;
                        }
                    }
                }
            }

            Step::Inbound(Ok(ChannelItem::Event(event))) => {
                handle_event(event, link.as_ref(), &binding, &log, &presence, &events).await;
            }

            Step::Inbound(Ok(item @ ChannelItem::Closed { .. })) => {
                link = None;
                set_state(&events, &mut state, ChannelState::Closed).await;
                if item.is_clean_close() {
                    tracing::info!(conversation = %binding.conversation, "channel closed cleanly, session ending");
                    break;
                }
                let _ = schedule_retry(&mut supervisor, &mut connect_at, &events).await;
            }

            Step::Inbound(Err(e)) => {
                tracing::warn!(err = %e, "channel receive failed");
                link = None;
                set_state(&events, &mut state, ChannelState::Closed).await;
                let _ = schedule_retry(&mut supervisor, &mut connect_at, &events).await;
            }

            Step::Command(Some(SessionCommand::Transmit { tag, content })) => {
                // Sending implies the typing burst is over.
                if typing.stop() {
                    send_typing(link.as_ref(), binding.conversation, false).await;
                }

                let frame = ClientFrame::ChatMessage {
                    conversation_id: binding.conversation,
                    content,
                };
                let sent = match &link {
                    Some(channel) => channel.send(&frame).await.is_ok(),
                    None => false,
                };
                if !sent {
                    queue.push(frame).await;
                    emit(&events, SessionEvent::MessageQueued { tag }).await;
                }
            }

            Step::Command(Some(SessionCommand::Keystroke)) => {
                if typing.keystroke(Instant::now()) {
                    send_typing(link.as_ref(), binding.conversation, true).await;
                }
            }

            Step::Command(Some(SessionCommand::MarkRead)) => {
                send_read_receipt(link.as_ref(), binding.conversation).await;
            }

            Step::Command(Some(SessionCommand::RetryConnect)) => {
                if link.is_none() && connect_at.is_none() {
                    tracing::info!(conversation = %binding.conversation, "manual retry, budget restored");
                    supervisor.reset();
                    connect_at = Some(Instant::now());
                }
            }

            Step::Command(Some(SessionCommand::Shutdown)) => {
                set_state(&events, &mut state, ChannelState::Closing).await;
                if let Some(channel) = &link {
                    let _ = channel.close().await;
                }
                link = None;
                set_state(&events, &mut state, ChannelState::Closed).await;
                break;
            }

            Step::Command(None) => {
                // Handle dropped; close quietly and exit.
                if let Some(channel) = &link {
                    let _ = channel.close().await;
                }
                break;
            }

            Step::TypingExpired => {
                if typing.expire(Instant::now()) {
                    send_typing(link.as_ref(), binding.conversation, false).await;
                }
            }

            Step::SafetyExpired => {
                if presence.expire_typing(Instant::now()) {
                    emit(&events, SessionEvent::PeerTyping { is_typing: false }).await;
                }
            }
        }
    }

    tracing::info!(conversation = %binding.conversation, "session driver exiting");
}

/// Fold one server event into the session state.
async fn handle_event<Ch: Channel>(
    event: ServerEvent,
    link: Option<&Ch>,
    binding: &SessionBinding,
    log: &RwLock<MessageLog>,
    presence: &PresenceRegistry,
    events: &mpsc::Sender<SessionEvent>,
) {
    match event {
        ServerEvent::ChatMessage {
            conversation_id,
            message,
        } if conversation_id == binding.conversation => {
            if message.sender_id != binding.local_user {
                // A delivered message supersedes any typing indicator.
                if presence.peer_typing() {
                    presence.set_peer_typing(false, Instant::now());
                    emit(events, SessionEvent::PeerTyping { is_typing: false }).await;
                }
                // The conversation is on screen, so the message is read
                // the moment it lands.
                send_read_receipt(link, binding.conversation).await;
            }
            let outcome = log.write().apply_server_message(&message);
            match outcome {
                Reconciliation::Confirmed(tag) => {
                    emit(events, SessionEvent::MessageConfirmed { tag }).await;
                }
                Reconciliation::Appended(_) => {
                    emit(events, SessionEvent::MessageReceived { message }).await;
                }
                Reconciliation::AlreadyKnown => {}
            }
        }

        ServerEvent::TypingIndicator {
            conversation_id,
            is_typing,
        } if conversation_id == binding.conversation => {
            presence.set_peer_typing(is_typing, Instant::now());
            emit(events, SessionEvent::PeerTyping { is_typing }).await;
        }

        ServerEvent::MessagesRead { conversation_id }
            if conversation_id == binding.conversation =>
        {
            let changed = log.write().apply_messages_read();
            tracing::debug!(changed, "read confirmation applied");
            emit(events, SessionEvent::MessagesRead).await;
        }

        ServerEvent::UserStatus {
            user_id,
            status,
            last_seen,
        } => {
            presence.set_user_status(user_id, status, last_seen.clone());
            emit(
                events,
                SessionEvent::UserStatus {
                    user_id,
                    online: status,
                    last_seen,
                },
            )
            .await;
        }

        // The chat_message event already covers the bound conversation;
        // its notification twin is only news elsewhere.
        ServerEvent::NewMessageNotification {
            conversation_id,
            message,
        } if conversation_id != binding.conversation => {
            emit(
                events,
                SessionEvent::Notification {
                    conversation_id,
                    message,
                },
            )
            .await;
        }

        other => {
            tracing::debug!(conversation = ?other.conversation_id(), "event ignored");
        }
    }
}

/// Schedule the next reconnect attempt, or report exhaustion.
///
/// Returns `false` when the budget is spent; the driver then idles
/// until a manual retry or shutdown.
async fn schedule_retry(
    supervisor: &mut ReconnectSupervisor,
    connect_at: &mut Option<Instant>,
    events: &mpsc::Sender<SessionEvent>,
) -> bool {
    let max_attempts = supervisor.plan().max_attempts;
    match supervisor.next() {
        ReconnectDecision::Retry { attempt, delay } => {
            tracing::info!(attempt, max_attempts, ?delay, "scheduling reconnect");
            emit(
                events,
                SessionEvent::Reconnecting {
                    attempt,
                    max_attempts,
                    delay,
                },
            )
            .await;
            *connect_at = Some(Instant::now() + delay);
            true
        }
        ReconnectDecision::GiveUp => {
            tracing::warn!(max_attempts, "reconnect budget exhausted, giving up");
            emit(events, SessionEvent::ReconnectFailed).await;
            false
        }
    }
}

/// Fire an advisory read receipt; a lost one is logged, never retried.
async fn send_read_receipt<Ch: Channel>(link: Option<&Ch>, conversation: ConversationId) {
    match link {
        Some(channel) => {
            let frame = ClientFrame::ReadMessages {
                conversation_id: conversation,
            };
            if let Err(e) = channel.send(&frame).await {
                tracing::debug!(err = %e, "read receipt lost to send failure");
            }
        }
        None => {
            tracing::debug!("dropping read receipt while offline");
        }
    }
}

/// Fire a typing signal, ignoring failures; the signal is ephemeral.
async fn send_typing<Ch: Channel>(
    link: Option<&Ch>,
    conversation: ConversationId,
    is_typing: bool,
) {
    if let Some(channel) = link {
        let frame = ClientFrame::Typing {
            conversation_id: conversation,
            is_typing,
        };
        if let Err(e) = channel.send(&frame).await {
            tracing::debug!(err = %e, is_typing, "typing signal lost");
        }
    }
}

async fn emit(events: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    // A dropped receiver is not an error; the driver exits via commands.
    let _ = events.send(event).await;
}

async fn set_state(
    events: &mpsc::Sender<SessionEvent>,
    state: &mut ChannelState,
    next: ChannelState,
) {
    if *state != next {
        tracing::debug!(from = %state, to = %next, "channel state change");
        *state = next;
        emit(events, SessionEvent::StateChanged(next)).await;
    }
}

/// Receive from the channel when one is up; pend forever otherwise.
async fn next_item<Ch: Channel>(link: Option<&Ch>) -> Result<ChannelItem, ChannelError> {
    match link {
        Some(channel) => channel.recv().await,
        None => std::future::pending().await,
    }
}

fn sleep_until_opt(deadline: Option<Instant>) -> tokio::time::Sleep {
    tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now))
}
