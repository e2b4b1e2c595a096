// Test-specific lint overrides: property tests use unwrap/expect freely.
#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Property-based tests for the wire protocol.
//!
//! Uses proptest to verify:
//! 1. Every outbound frame encodes with a `type` tag and its
//!    conversation id.
//! 2. Malformed wire payloads never panic the decoder.
//! 3. Unknown `type` tags are decode errors, not silent skips.
//! 4. The close-code policy accepts exactly 1000 and 1001 as clean.

use proptest::prelude::*;

use chatlink_proto::close;
use chatlink_proto::codec;
use chatlink_proto::event::ServerEvent;
use chatlink_proto::frame::ClientFrame;
use chatlink_proto::id::ConversationId;

/// Strategy over all outbound frame shapes.
fn arb_frame() -> impl Strategy<Value = ClientFrame> {
    let conv = any::<i64>().prop_map(ConversationId::new);
    prop_oneof![
        (conv.clone(), "\\PC{0,128}").prop_map(|(conversation_id, content)| {
            ClientFrame::ChatMessage {
                conversation_id,
                content,
            }
        }),
        (conv.clone(), any::<bool>()).prop_map(|(conversation_id, is_typing)| {
            ClientFrame::Typing {
                conversation_id,
                is_typing,
            }
        }),
        conv.prop_map(|conversation_id| ClientFrame::ReadMessages { conversation_id }),
    ]
}

proptest! {
    #[test]
    fn every_frame_encodes_with_a_type_tag(frame in arb_frame()) {
        let text = codec::encode(&frame).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        prop_assert!(value.get("type").and_then(serde_json::Value::as_str).is_some());
        prop_assert_eq!(
            value.get("conversation_id").and_then(serde_json::Value::as_i64),
            Some(frame.conversation_id().get())
        );
    }

    #[test]
    fn random_text_never_panics_the_decoder(payload in "\\PC{0,256}") {
        let _ = codec::decode::<ServerEvent>(&payload);
    }

    #[test]
    fn unknown_type_tags_are_decode_errors(tag in "[a-z_]{1,24}") {
        prop_assume!(!matches!(
            tag.as_str(),
            "chat_message"
                | "typing_indicator"
                | "messages_read"
                | "user_status"
                | "new_message_notification"
        ));
        let payload = format!(r#"{{"type":"{tag}"}}"#);
        prop_assert!(codec::decode::<ServerEvent>(&payload).is_err());
    }

    #[test]
    fn only_normal_and_going_away_are_clean(code in any::<u16>()) {
        prop_assert_eq!(close::is_clean(code), code == 1000 || code == 1001);
    }
}
