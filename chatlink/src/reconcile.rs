//! Local message log and delivery-status reconciliation.
//!
//! Outgoing messages are recorded as `Pending` before they hit the
//! wire. The server echoes stored messages back over the channel; the
//! log matches an echo against the oldest pending record with the same
//! content, attaches the server id, and advances the status. The wire
//! format carries no client-side correlation id, so content matching is
//! best effort and an unmatched echo is simply appended.
//!
//! Status only ever moves forward: `Pending → Sent → Read`.

use chatlink_proto::event::ServerMessage;
use chatlink_proto::id::{ClientTag, MessageId, UserId};

/// Delivery status of a message in the local log.
///
/// Ordering matters: later variants compare greater, and
/// [`DeliveryStatus::advance_to`] relies on that to stay monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeliveryStatus {
    /// Recorded locally, not yet confirmed by the server.
    Pending,
    /// Stored by the server.
    Sent,
    /// Read by the other participant.
    Read,
}

impl DeliveryStatus {
    /// Advance to `next` if it is a later status.
    ///
    /// Returns `true` if the status changed. A stale or duplicate
    /// update that would move the status backwards is ignored.
    pub fn advance_to(&mut self, next: Self) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }
}

/// One message as the local log knows it.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    /// Local correlation tag, assigned at record time.
    pub tag: ClientTag,
    /// Server-assigned id, known once the server has stored the message.
    pub server_id: Option<MessageId>,
    /// Author of the message.
    pub sender_id: UserId,
    /// Message text.
    pub content: String,
    /// Server timestamp, if known.
    pub timestamp: Option<String>,
    /// Attachment URL, if the message carries one.
    pub file_url: Option<String>,
    /// Current delivery status.
    pub status: DeliveryStatus,
}

/// What a server echo did to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The echo confirmed a pending outgoing message.
    Confirmed(ClientTag),
    /// The echo was new (a peer message, or an echo with no matching
    /// pending record) and was appended.
    Appended(ClientTag),
    /// The message id was already in the log; only the status moved.
    AlreadyKnown,
}

/// Append-only log of messages in one conversation.
#[derive(Debug)]
pub struct MessageLog {
    local_user: UserId,
    records: Vec<MessageRecord>,
}

impl MessageLog {
    /// Create an empty log for the given local user.
    #[must_use]
    pub const fn new(local_user: UserId) -> Self {
        Self {
            local_user,
            records: Vec::new(),
        }
    }

    /// Record an outgoing message as `Pending` and return its tag.
    pub fn record_outgoing(&mut self, content: impl Into<String>) -> ClientTag {
        let tag = ClientTag::new();
        self.records.push(MessageRecord {
            tag,
            server_id: None,
            sender_id: self.local_user,
            content: content.into(),
            timestamp: None,
            file_url: None,
            status: DeliveryStatus::Pending,
        });
        tag
    }

    /// Fold a server-stored message into the log.
    pub fn apply_server_message(&mut self, message: &ServerMessage) -> Reconciliation {
        let incoming_status = if message.is_read {
            DeliveryStatus::Read
        } else {
            DeliveryStatus::Sent
        };

        // Exact id match wins; duplicates only move the status forward.
        if let Some(id) = message.id {
            if let Some(record) = self.records.iter_mut().find(|r| r.server_id == Some(id)) {
                record.status.advance_to(incoming_status);
                return Reconciliation::AlreadyKnown;
            }
        }

        // Echo of our own message: confirm the oldest pending record
        // with the same content.
        if message.sender_id == self.local_user {
            let pending = self.records.iter_mut().find(|r| {
                r.server_id.is_none()
                    && r.status == DeliveryStatus::Pending
                    && r.content == message.content
            });
            if let Some(record) = pending {
                record.server_id = message.id;
                record.timestamp = Some(message.timestamp.clone());
                record.file_url.clone_from(&message.file_url);
                record.status.advance_to(incoming_status);
                tracing::debug!(tag = %record.tag, id = ?message.id, "confirmed pending message");
                return Reconciliation::Confirmed(record.tag);
            }
        }

        let tag = ClientTag::new();
        self.records.push(MessageRecord {
            tag,
            server_id: message.id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            timestamp: Some(message.timestamp.clone()),
            file_url: message.file_url.clone(),
            status: incoming_status,
        });
        Reconciliation::Appended(tag)
    }

    /// Apply a read confirmation for this conversation.
    ///
    /// Advances every server-confirmed message of the local user to
    /// `Read`. Pending records are untouched, the server cannot have
    /// marked read a message it never stored. Returns how many records
    /// changed.
    pub fn apply_messages_read(&mut self) -> usize {
        self.records
            .iter_mut()
            .filter(|r| r.sender_id == self.local_user && r.server_id.is_some())
            .map(|r| r.status.advance_to(DeliveryStatus::Read))
            .filter(|changed| *changed)
            .count()
    }

    /// All records, oldest first.
    #[must_use]
    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    /// Status of the record carrying `tag`, if it exists.
    #[must_use]
    pub fn status_of(&self, tag: ClientTag) -> Option<DeliveryStatus> {
        self.records
            .iter()
            .find(|r| r.tag == tag)
            .map(|r| r.status)
    }
}
