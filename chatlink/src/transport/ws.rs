//! WebSocket channel to the message server.
//!
//! Implements the [`Channel`] trait over a `tokio-tungstenite`
//! connection. One channel serves one conversation; the endpoint path
//! carries the conversation id and the CSRF token rides as a query
//! parameter because browsers cannot set headers on WebSocket upgrades
//! and the server expects the same shape from every client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use chatlink_proto::codec;
use chatlink_proto::event::ServerEvent;
use chatlink_proto::frame::ClientFrame;
use chatlink_proto::id::ConversationId;

use super::{Channel, ChannelError, ChannelItem, Connector};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Default timeout for the connection handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket channel implementing the [`Channel`] trait.
///
/// Created via [`WsChannel::connect`], which establishes the connection
/// and spawns a background reader task that decodes inbound frames.
pub struct WsChannel {
    /// Write half of the connection (shared for concurrent sends).
    ws_sender: Arc<Mutex<WsSender>>,
    /// Items pushed by the background reader task.
    incoming: Mutex<mpsc::Receiver<ChannelItem>>,
    /// Whether the connection is still up.
    open: Arc<AtomicBool>,
    /// Handle to the background reader task.
    _reader_handle: tokio::task::JoinHandle<()>,
}

impl WsChannel {
    /// Connect to a conversation endpoint.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Timeout`] if the handshake does not complete in time.
    /// - [`ChannelError::Rejected`] if the server refuses the upgrade.
    /// - [`ChannelError::Io`] for network failures.
    pub async fn connect(endpoint: &Url) -> Result<Self, ChannelError> {
        let (ws_stream, _response) =
            tokio::time::timeout(CONNECT_TIMEOUT, connect_async(endpoint.as_str()))
                .await
                .map_err(|_| {
                    tracing::warn!(url = %endpoint, "WebSocket connect timed out");
                    ChannelError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url = %endpoint, err = %e, "WebSocket connect failed");
                    map_ws_connect_error(e)
                })?;

        let (ws_sender, ws_reader) = ws_stream.split();

        let (tx, rx) = mpsc::channel(256);
        let open = Arc::new(AtomicBool::new(true));
        let reader_open = Arc::clone(&open);

        let reader_handle = tokio::spawn(reader_loop(ws_reader, tx, reader_open));

        tracing::debug!(url = %endpoint, "WebSocket channel established");

        Ok(Self {
            ws_sender: Arc::new(Mutex::new(ws_sender)),
            incoming: Mutex::new(rx),
            open,
            _reader_handle: reader_handle,
        })
    }
}

impl Channel for WsChannel {
    /// Send one frame as a WebSocket text message.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotOpen`] if the connection is down, or
    /// a codec error if the frame cannot be encoded.
    async fn send(&self, frame: &ClientFrame) -> Result<(), ChannelError> {
        if !self.open.load(Ordering::Relaxed) {
            return Err(ChannelError::NotOpen);
        }

        let text = codec::encode(frame)?;
        let mut sender = self.ws_sender.lock().await;
        sender.send(Message::Text(text.into())).await.map_err(|e| {
            tracing::warn!(err = %e, "WebSocket send failed");
            self.open.store(false, Ordering::Relaxed);
            ChannelError::NotOpen
        })?;

        Ok(())
    }

    /// Receive the next decoded item from the background reader.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotOpen`] once the reader task has exited
    /// and all buffered items have been drained.
    async fn recv(&self) -> Result<ChannelItem, ChannelError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(ChannelError::NotOpen)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    /// Send a normal close frame and mark the channel closed.
    async fn close(&self) -> Result<(), ChannelError> {
        self.open.store(false, Ordering::Relaxed);
        let mut sender = self.ws_sender.lock().await;
        sender
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            })))
            .await
            .map_err(|e| {
                tracing::debug!(err = %e, "close frame send failed");
                ChannelError::NotOpen
            })?;
        Ok(())
    }
}

/// Background task that reads WebSocket messages and dispatches them.
///
/// Decodes text frames as [`ServerEvent`] values. Malformed frames are
/// logged and skipped; the task does not disconnect on bad data. When
/// the connection ends, pushes one [`ChannelItem::Closed`] carrying the
/// close code (if any) and exits.
async fn reader_loop(
    mut ws_reader: WsReader,
    tx: mpsc::Sender<ChannelItem>,
    open: Arc<AtomicBool>,
) {
    let mut close_code: Option<u16> = None;

    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match codec::decode::<ServerEvent>(&text) {
                Ok(event) => {
                    if tx.send(ChannelItem::Event(event)).await.is_err() {
                        // Receiver dropped, the channel was dropped.
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed server frame, skipping");
                }
            },
            Ok(Message::Close(frame)) => {
                close_code = frame.map(|f| u16::from(f.code));
                tracing::info!(code = ?close_code, "WebSocket closed by server");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_)) => {
                // Control and binary frames carry nothing for us.
            }
            Err(e) => {
                tracing::warn!(err = %e, "WebSocket read error");
                break;
            }
        }
    }

    open.store(false, Ordering::Relaxed);
    let _ = tx.send(ChannelItem::Closed { code: close_code }).await;
}

/// Map a `tokio_tungstenite` connection error to a [`ChannelError`].
fn map_ws_connect_error(err: tokio_tungstenite::tungstenite::Error) -> ChannelError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => ChannelError::Io(io_err),
        WsError::Http(response) => {
            ChannelError::Rejected(format!("HTTP status {}", response.status()))
        }
        other => ChannelError::Io(std::io::Error::other(format!("connection error: {other}"))),
    }
}

/// Connector that opens [`WsChannel`]s against a message server.
///
/// Holds the server base URL and the CSRF token; the per-conversation
/// endpoint is derived on every connect, so reconnects after a rebind
/// always target the currently bound conversation.
#[derive(Debug, Clone)]
pub struct WsConnector {
    base: Url,
    csrf_token: String,
}

impl WsConnector {
    /// Create a connector for the given server base URL and CSRF token.
    pub fn new(base: Url, csrf_token: impl Into<String>) -> Self {
        Self {
            base,
            csrf_token: csrf_token.into(),
        }
    }

    /// Build the WebSocket endpoint URL for a conversation.
    #[must_use]
    pub fn endpoint(&self, conversation: ConversationId) -> Url {
        let mut url = self.base.clone();
        url.set_path(&format!("/ws/chat/{conversation}/"));
        url.query_pairs_mut()
            .append_pair("csrf_token", &self.csrf_token);
        url
    }
}

impl Connector for WsConnector {
    type Channel = WsChannel;

    async fn connect(&self, conversation: ConversationId) -> Result<WsChannel, ChannelError> {
        WsChannel::connect(&self.endpoint(conversation)).await
    }
}
