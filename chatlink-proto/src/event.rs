//! Inbound wire events pushed by the message server.
//!
//! Every frame the server sends over the persistent channel is a JSON object
//! with a `type` discriminator. [`ServerEvent`] models the closed set of
//! known types; anything else fails to decode and is discarded by the
//! receiving layer.

use serde::{Deserialize, Serialize};

use crate::id::{ConversationId, MessageId, UserId};

/// A server-confirmed chat message as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    /// Server-assigned message id. Absent on some notification payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// Who sent the message.
    pub sender_id: UserId,
    /// The message text.
    pub content: String,
    /// ISO-8601 creation timestamp, as formatted by the server.
    pub timestamp: String,
    /// Whether the recipient has already read the message.
    pub is_read: bool,
    /// URL of an uploaded attachment, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

/// An event pushed by the server over the persistent channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A chat message delivered to a conversation the user participates in.
    ChatMessage {
        /// The conversation the message belongs to.
        conversation_id: ConversationId,
        /// The confirmed message.
        message: ServerMessage,
    },
    /// The peer started or stopped typing in a conversation.
    TypingIndicator {
        /// The conversation where typing is occurring.
        conversation_id: ConversationId,
        /// `true` while the peer is typing, `false` when they stop.
        is_typing: bool,
    },
    /// The peer has read all messages in a conversation.
    MessagesRead {
        /// The conversation whose messages were read.
        conversation_id: ConversationId,
    },
    /// A user's online status changed.
    UserStatus {
        /// The user whose presence changed.
        user_id: UserId,
        /// `true` when the user is online.
        status: bool,
        /// ISO-8601 last-seen timestamp, sent when the user goes offline.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_seen: Option<String>,
    },
    /// A message arrived in a conversation other than the active one.
    NewMessageNotification {
        /// The conversation that received the message.
        conversation_id: ConversationId,
        /// The message, for list previews.
        message: ServerMessage,
    },
}

impl ServerEvent {
    /// Returns the conversation this event is scoped to, if it has one.
    ///
    /// `user_status` events are user-scoped, not conversation-scoped.
    #[must_use]
    pub const fn conversation_id(&self) -> Option<ConversationId> {
        match self {
            Self::ChatMessage {
                conversation_id, ..
            }
            | Self::TypingIndicator {
                conversation_id, ..
            }
            | Self::MessagesRead { conversation_id }
            | Self::NewMessageNotification {
                conversation_id, ..
            } => Some(*conversation_id),
            Self::UserStatus { .. } => None,
        }
    }
}
