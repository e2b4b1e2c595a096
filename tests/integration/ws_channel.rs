// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::match_same_arms,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! WebSocket channel behavior against real in-process servers.
//!
//! Each test stands up a minimal `tokio-tungstenite` accept loop that
//! plays one server scenario: handshake inspection, frame exchange,
//! malformed data, clean close, and abrupt disconnect.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

use chatlink::transport::ws::{WsChannel, WsConnector};
use chatlink::transport::{Channel, ChannelError, ChannelItem, Connector};
use chatlink_proto::event::ServerEvent;
use chatlink_proto::frame::ClientFrame;
use chatlink_proto::id::ConversationId;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn bind_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

fn base_url(addr: SocketAddr) -> Url {
    Url::parse(&format!("ws://{addr}")).unwrap()
}

#[tokio::test]
async fn handshake_carries_conversation_path_and_csrf_token() {
    let (listener, addr) = bind_listener().await;
    let (uri_tx, uri_rx) = tokio::sync::oneshot::channel::<String>();

    tokio::spawn(async move {
        use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

        let (stream, _) = listener.accept().await.unwrap();
        let mut uri_tx = Some(uri_tx);
        let callback = move |req: &Request, resp: Response| {
            let _ = uri_tx.take().unwrap().send(req.uri().to_string());
            Ok(resp)
        };
        let ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();
        // Hold the connection open until the test finishes.
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(ws);
    });

    let connector = WsConnector::new(base_url(addr), "csrf-abc");
    let _channel = connector.connect(ConversationId::new(42)).await.unwrap();

    let uri = tokio::time::timeout(RECV_TIMEOUT, uri_rx)
        .await
        .expect("handshake timed out")
        .unwrap();
    assert_eq!(uri, "/ws/chat/42/?csrf_token=csrf-abc");
}

#[tokio::test]
async fn frames_round_trip_as_json_text() {
    let (listener, addr) = bind_listener().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        // Expect one chat_message frame from the client.
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                assert_eq!(value["type"], "chat_message");
                assert_eq!(value["conversation_id"], 1);
                assert_eq!(value["content"], "ping");
            }
            other => panic!("unexpected server-side frame: {other:?}"),
        }

        // Answer with a typing indicator.
        let reply = r#"{"type":"typing_indicator","conversation_id":1,"is_typing":true}"#;
        ws.send(Message::Text(reply.into())).await.unwrap();
    });

    let channel = WsChannel::connect(
        &Url::parse(&format!("ws://{addr}/ws/chat/1/?csrf_token=t")).unwrap(),
    )
    .await
    .unwrap();

    channel
        .send(&ClientFrame::ChatMessage {
            conversation_id: ConversationId::new(1),
            content: "ping".into(),
        })
        .await
        .unwrap();

    let item = tokio::time::timeout(RECV_TIMEOUT, channel.recv())
        .await
        .expect("recv timed out")
        .unwrap();
    match item {
        ChannelItem::Event(ServerEvent::TypingIndicator { is_typing, .. }) => {
            assert!(is_typing);
        }
        other => panic!("unexpected item: {other:?}"),
    }
}

#[tokio::test]
async fn malformed_frames_are_skipped_not_fatal() {
    let (listener, addr) = bind_listener().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        ws.send(Message::Text("not json at all".into()))
            .await
            .unwrap();
        ws.send(Message::Text(r#"{"type":"mystery"}"#.into()))
            .await
            .unwrap();
        ws.send(Message::Text(
            r#"{"type":"messages_read","conversation_id":4}"#.into(),
        ))
        .await
        .unwrap();
    });

    let channel = WsChannel::connect(
        &Url::parse(&format!("ws://{addr}/ws/chat/4/?csrf_token=t")).unwrap(),
    )
    .await
    .unwrap();

    // The two bad frames vanish; the first item is the valid event.
    let item = tokio::time::timeout(RECV_TIMEOUT, channel.recv())
        .await
        .expect("recv timed out")
        .unwrap();
    assert!(matches!(
        item,
        ChannelItem::Event(ServerEvent::MessagesRead { conversation_id })
            if conversation_id == ConversationId::new(4)
    ));
}

#[tokio::test]
async fn server_close_frame_yields_clean_close() {
    let (listener, addr) = bind_listener().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        })))
        .await
        .unwrap();
    });

    let channel = WsChannel::connect(
        &Url::parse(&format!("ws://{addr}/ws/chat/1/?csrf_token=t")).unwrap(),
    )
    .await
    .unwrap();

    let item = tokio::time::timeout(RECV_TIMEOUT, channel.recv())
        .await
        .expect("recv timed out")
        .unwrap();
    assert!(matches!(item, ChannelItem::Closed { code: Some(1000) }));
    assert!(item.is_clean_close());
    assert!(!channel.is_open());
}

#[tokio::test]
async fn dropped_connection_yields_abnormal_close() {
    let (listener, addr) = bind_listener().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        // Kill the TCP stream without a close handshake.
        drop(ws);
    });

    let channel = WsChannel::connect(
        &Url::parse(&format!("ws://{addr}/ws/chat/1/?csrf_token=t")).unwrap(),
    )
    .await
    .unwrap();

    let item = tokio::time::timeout(RECV_TIMEOUT, channel.recv())
        .await
        .expect("recv timed out")
        .unwrap();
    match item {
        ChannelItem::Closed { code } => {
            assert!(!ChannelItem::Closed { code }.is_clean_close());
        }
        other => panic!("unexpected item: {other:?}"),
    }
}

#[tokio::test]
async fn send_after_close_returns_not_open() {
    let (listener, addr) = bind_listener().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let _ = ws.close(None).await;
    });

    let channel = WsChannel::connect(
        &Url::parse(&format!("ws://{addr}/ws/chat/1/?csrf_token=t")).unwrap(),
    )
    .await
    .unwrap();

    // Wait until the reader reports the close.
    let _ = tokio::time::timeout(RECV_TIMEOUT, channel.recv())
        .await
        .expect("recv timed out");

    let result = channel
        .send(&ClientFrame::ReadMessages {
            conversation_id: ConversationId::new(1),
        })
        .await;
    assert!(matches!(result, Err(ChannelError::NotOpen)));
}

#[tokio::test]
async fn connect_to_dead_port_fails() {
    let result = WsChannel::connect(
        &Url::parse("ws://127.0.0.1:1/ws/chat/1/?csrf_token=t").unwrap(),
    )
    .await;
    assert!(result.is_err());
}
