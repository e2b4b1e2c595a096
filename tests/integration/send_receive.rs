// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::match_same_arms,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! End-to-end message exchange over a session.
//!
//! Drives a bound session through the full send path: record as
//! pending, transmit, confirm on echo, receive peer messages, and
//! reconcile read confirmations.

use chatlink::reconcile::DeliveryStatus;
use chatlink::session::{SessionBinding, SessionEvent, SessionHandle};
use chatlink::transport::ChannelState;
use chatlink::transport::loopback::{LoopbackConnector, ServerHandle};
use chatlink_proto::event::{ServerEvent, ServerMessage};
use chatlink_proto::frame::ClientFrame;
use chatlink_proto::id::{ConversationId, MessageId, UserId};
use tokio::sync::mpsc;

const CONV: ConversationId = ConversationId::new(1);
const OTHER_CONV: ConversationId = ConversationId::new(2);
const ME: UserId = UserId::new(10);
const PEER: UserId = UserId::new(20);

fn stored(id: i64, sender: UserId, content: &str, is_read: bool) -> ServerMessage {
    ServerMessage {
        id: Some(MessageId::new(id)),
        sender_id: sender,
        content: content.into(),
        timestamp: "2026-08-29T12:00:00Z".into(),
        is_read,
        file_url: None,
    }
}

async fn wait_for_open(
    events: &mut mpsc::Receiver<SessionEvent>,
    handles: &mut mpsc::UnboundedReceiver<ServerHandle>,
) -> ServerHandle {
    loop {
        match events.recv().await {
            Some(SessionEvent::StateChanged(ChannelState::Open)) => {
                let mut server = handles.recv().await.expect("no server handle");
                // Every open starts with the advisory read receipt.
                assert!(matches!(
                    server.next_frame().await,
                    Some(ClientFrame::ReadMessages { .. })
                ));
                return server;
            }
            Some(_) => {}
            None => panic!("events closed before open"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn full_send_confirm_cycle() {
    let (connector, mut handles) = LoopbackConnector::new();
    let (handle, mut events) = SessionHandle::bind(connector, SessionBinding::new(CONV, ME));
    let mut server = wait_for_open(&mut events, &mut handles).await;

    // Send two messages; both pending until the server echoes them.
    let first = handle.send_message("first").await.unwrap();
    let second = handle.send_message("second").await.unwrap();
    assert_eq!(handle.status_of(first), Some(DeliveryStatus::Pending));
    assert_eq!(handle.status_of(second), Some(DeliveryStatus::Pending));

    // Both frames arrive in order.
    for expected in ["first", "second"] {
        match server.next_frame().await {
            Some(ClientFrame::ChatMessage {
                conversation_id,
                content,
            }) => {
                assert_eq!(conversation_id, CONV);
                assert_eq!(content, expected);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    // Echoes confirm in order.
    server.push(ServerEvent::ChatMessage {
        conversation_id: CONV,
        message: stored(1, ME, "first", false),
    });
    server.push(ServerEvent::ChatMessage {
        conversation_id: CONV,
        message: stored(2, ME, "second", false),
    });

    assert!(matches!(
        events.recv().await,
        Some(SessionEvent::MessageConfirmed { tag }) if tag == first
    ));
    assert!(matches!(
        events.recv().await,
        Some(SessionEvent::MessageConfirmed { tag }) if tag == second
    ));
    assert_eq!(handle.status_of(first), Some(DeliveryStatus::Sent));
    assert_eq!(handle.status_of(second), Some(DeliveryStatus::Sent));
}

#[tokio::test(start_paused = true)]
async fn peer_messages_are_surfaced_and_logged() {
    let (connector, mut handles) = LoopbackConnector::new();
    let (handle, mut events) = SessionHandle::bind(connector, SessionBinding::new(CONV, ME));
    let server = wait_for_open(&mut events, &mut handles).await;

    server.push(ServerEvent::ChatMessage {
        conversation_id: CONV,
        message: stored(5, PEER, "hi there", false),
    });

    match events.recv().await {
        Some(SessionEvent::MessageReceived { message }) => {
            assert_eq!(message.sender_id, PEER);
            assert_eq!(message.content, "hi there");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let records = handle.messages();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, DeliveryStatus::Sent);
}

#[tokio::test(start_paused = true)]
async fn read_confirmation_advances_sent_messages() {
    let (connector, mut handles) = LoopbackConnector::new();
    let (handle, mut events) = SessionHandle::bind(connector, SessionBinding::new(CONV, ME));
    let mut server = wait_for_open(&mut events, &mut handles).await;

    let tag = handle.send_message("read me").await.unwrap();
    let _ = server.next_frame().await;
    server.push(ServerEvent::ChatMessage {
        conversation_id: CONV,
        message: stored(1, ME, "read me", false),
    });
    assert!(matches!(
        events.recv().await,
        Some(SessionEvent::MessageConfirmed { .. })
    ));

    server.push(ServerEvent::MessagesRead {
        conversation_id: CONV,
    });
    assert!(matches!(
        events.recv().await,
        Some(SessionEvent::MessagesRead)
    ));
    assert_eq!(handle.status_of(tag), Some(DeliveryStatus::Read));
}

#[tokio::test(start_paused = true)]
async fn mark_read_sends_receipt_frame() {
    let (connector, mut handles) = LoopbackConnector::new();
    let (handle, mut events) = SessionHandle::bind(connector, SessionBinding::new(CONV, ME));
    let mut server = wait_for_open(&mut events, &mut handles).await;

    handle.mark_read().await.unwrap();

    assert_eq!(
        server.next_frame().await,
        Some(ClientFrame::ReadMessages {
            conversation_id: CONV
        })
    );
}

#[tokio::test(start_paused = true)]
async fn duplicate_echo_is_not_surfaced_twice() {
    let (connector, mut handles) = LoopbackConnector::new();
    let (handle, mut events) = SessionHandle::bind(connector, SessionBinding::new(CONV, ME));
    let server = wait_for_open(&mut events, &mut handles).await;

    server.push(ServerEvent::ChatMessage {
        conversation_id: CONV,
        message: stored(7, PEER, "once", false),
    });
    assert!(matches!(
        events.recv().await,
        Some(SessionEvent::MessageReceived { .. })
    ));

    // Same id again, now flagged read: no second MessageReceived, only
    // the log status moves.
    server.push(ServerEvent::ChatMessage {
        conversation_id: CONV,
        message: stored(7, PEER, "once", true),
    });
    server.push(ServerEvent::MessagesRead {
        conversation_id: CONV,
    });
    assert!(matches!(
        events.recv().await,
        Some(SessionEvent::MessagesRead)
    ));
    assert_eq!(handle.messages().len(), 1);
    assert_eq!(handle.messages()[0].status, DeliveryStatus::Read);
}

#[tokio::test(start_paused = true)]
async fn notifications_for_other_conversations_pass_through() {
    let (connector, mut handles) = LoopbackConnector::new();
    let (handle, mut events) = SessionHandle::bind(connector, SessionBinding::new(CONV, ME));
    let server = wait_for_open(&mut events, &mut handles).await;

    server.push(ServerEvent::NewMessageNotification {
        conversation_id: OTHER_CONV,
        message: stored(9, PEER, "elsewhere", false),
    });

    match events.recv().await {
        Some(SessionEvent::Notification {
            conversation_id, ..
        }) => assert_eq!(conversation_id, OTHER_CONV),
        other => panic!("unexpected event: {other:?}"),
    }
    // The bound conversation's log is untouched.
    assert!(handle.messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn chat_event_for_other_conversation_is_ignored() {
    let (connector, mut handles) = LoopbackConnector::new();
    let (handle, mut events) = SessionHandle::bind(connector, SessionBinding::new(CONV, ME));
    let server = wait_for_open(&mut events, &mut handles).await;

    server.push(ServerEvent::ChatMessage {
        conversation_id: OTHER_CONV,
        message: stored(3, PEER, "wrong room", false),
    });
    // Follow with one for the bound conversation to prove ordering.
    server.push(ServerEvent::ChatMessage {
        conversation_id: CONV,
        message: stored(4, PEER, "right room", false),
    });

    match events.recv().await {
        Some(SessionEvent::MessageReceived { message }) => {
            assert_eq!(message.content, "right room");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(handle.messages().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rebind_tears_down_and_reopens() {
    let (connector, mut handles) = LoopbackConnector::new();
    let (handle, mut events) =
        SessionHandle::bind(connector.clone(), SessionBinding::new(CONV, ME));
    let _server = wait_for_open(&mut events, &mut handles).await;

    let (handle, mut events) = handle.rebind(connector, SessionBinding::new(OTHER_CONV, ME));
    let mut server = wait_for_open(&mut events, &mut handles).await;

    handle.send_message("new room").await.unwrap();
    match server.next_frame().await {
        Some(ClientFrame::ChatMessage {
            conversation_id, ..
        }) => assert_eq!(conversation_id, OTHER_CONV),
        other => panic!("unexpected frame: {other:?}"),
    }
    // The new session starts with a fresh log.
    assert_eq!(handle.messages().len(), 1);
}
