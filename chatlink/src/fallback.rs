//! REST fallback for sends when the channel is down.
//!
//! A [`FallbackSender`] posts directly to the message API over HTTP.
//! Each call is one-shot: no retry, no interaction with the outbound
//! queue. Attachments can only travel this path since the WebSocket
//! frames carry text only.

use reqwest::StatusCode;
use reqwest::multipart;
use url::Url;

use chatlink_proto::event::ServerMessage;
use chatlink_proto::id::ConversationId;

/// Largest attachment the client will upload.
pub const MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;

/// Errors from the REST fallback path.
#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    /// The attachment exceeds [`MAX_ATTACHMENT_BYTES`]; nothing was sent.
    #[error("attachment is {size} bytes, limit is {MAX_ATTACHMENT_BYTES}")]
    AttachmentTooLarge {
        /// Actual attachment size.
        size: usize,
    },

    /// The HTTP request failed before a response arrived.
    #[error("fallback request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("fallback request rejected with status {0}")]
    Status(StatusCode),
}

/// A file to attach to a message sent over the fallback path.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// File name reported to the server.
    pub file_name: String,
    /// MIME type of the content.
    pub content_type: String,
    /// Raw file bytes.
    pub bytes: Vec<u8>,
}

/// One-shot REST sender for a message server.
#[derive(Debug, Clone)]
pub struct FallbackSender {
    http: reqwest::Client,
    base: Url,
    csrf_token: String,
}

impl FallbackSender {
    /// Create a sender for the given API base URL and CSRF token.
    pub fn new(base: Url, csrf_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
            csrf_token: csrf_token.into(),
        }
    }

    /// Build the endpoint URL for a conversation action.
    ///
    /// Segments extend the configured base, so a base carrying its own
    /// path prefix keeps it.
    fn endpoint(&self, conversation: ConversationId, action: &str) -> Url {
        let mut url = self.base.clone();
        let id = conversation.to_string();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["api", "chat", "conversations", id.as_str(), action, ""]);
        }
        url
    }

    /// Send one message over HTTP.
    ///
    /// Plain messages post as JSON; messages with an attachment post as
    /// multipart form data. Returns the stored message as the server
    /// recorded it, so the local log can reconcile against it.
    ///
    /// # Errors
    ///
    /// - [`FallbackError::AttachmentTooLarge`] before any network traffic
    ///   if the attachment exceeds the size limit.
    /// - [`FallbackError::Http`] or [`FallbackError::Status`] when the
    ///   request fails. The caller decides what to do; this path never
    ///   retries and never enqueues.
    pub async fn send_message(
        &self,
        conversation: ConversationId,
        content: &str,
        attachment: Option<Attachment>,
    ) -> Result<ServerMessage, FallbackError> {
        let url = self.endpoint(conversation, "add_message");

        let request = self
            .http
            .post(url)
            .header("X-CSRFToken", &self.csrf_token);

        let request = match attachment {
            Some(file) => {
                if file.bytes.len() > MAX_ATTACHMENT_BYTES {
                    return Err(FallbackError::AttachmentTooLarge {
                        size: file.bytes.len(),
                    });
                }
                let part = multipart::Part::bytes(file.bytes)
                    .file_name(file.file_name)
                    .mime_str(&file.content_type)?;
                let form = multipart::Form::new()
                    .text("content", content.to_owned())
                    .part("file_attachment", part);
                request.multipart(form)
            }
            None => request.json(&serde_json::json!({ "content": content })),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, %conversation, "fallback send rejected");
            return Err(FallbackError::Status(status));
        }

        tracing::info!(%conversation, "message delivered over fallback");
        Ok(response.json::<ServerMessage>().await?)
    }

    /// Mark every message in a conversation as read.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`FallbackSender::send_message`].
    pub async fn mark_read(&self, conversation: ConversationId) -> Result<(), FallbackError> {
        let url = self.endpoint(conversation, "mark_read");

        let response = self
            .http
            .post(url)
            .header("X-CSRFToken", &self.csrf_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FallbackError::Status(status));
        }
        Ok(())
    }
}
