//! Outbound wire frames sent by the client over the persistent channel.

use serde::{Deserialize, Serialize};

use crate::id::ConversationId;

/// A frame the client sends to the message server.
///
/// Note the asymmetric tag names: the server pushes `typing_indicator`
/// events but accepts `typing` frames, and read receipts are sent as
/// `read_messages` while the confirmation comes back as `messages_read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Send a chat message to a conversation.
    ChatMessage {
        /// The target conversation.
        conversation_id: ConversationId,
        /// The message text.
        content: String,
    },
    /// Report a typing-state transition.
    Typing {
        /// The conversation being typed in.
        conversation_id: ConversationId,
        /// `true` at the start of a typing burst, `false` when it ends.
        is_typing: bool,
    },
    /// Mark all messages in a conversation as read.
    ReadMessages {
        /// The conversation to mark read.
        conversation_id: ConversationId,
    },
}

impl ClientFrame {
    /// Returns the conversation this frame targets.
    #[must_use]
    pub const fn conversation_id(&self) -> ConversationId {
        match self {
            Self::ChatMessage {
                conversation_id, ..
            }
            | Self::Typing {
                conversation_id, ..
            }
            | Self::ReadMessages { conversation_id } => *conversation_id,
        }
    }
}
