//! Property-based tests for the wire codec.
//!
//! Arbitrary server input must never panic the decoder, and every envelope
//! the client builds must encode to an object the server can route.

use chrono::{TimeZone, Utc};
use lawbuddy_proto::{Envelope, EnvelopeId, MessageRole, Outbound, TypingMetadata, decode, encode};
use proptest::prelude::*;
use serde_json::Value;

fn outbound_strategy() -> impl Strategy<Value = Outbound> {
    let room = "[a-z0-9-]{1,12}";
    prop_oneof![
        (room, any::<String>()).prop_map(|(chat_session_id, content)| Outbound::SendMessage {
            chat_session_id,
            content,
            role: MessageRole::User,
        }),
        (room, "[0-9]{1,6}").prop_map(|(chat_session_id, message_id)| {
            Outbound::RegenerateMessage { chat_session_id, message_id }
        }),
        (proptest::option::of(room), "[a-z0-9]{1,8}").prop_map(|(chat_session_id, stream_id)| {
            Outbound::CancelGeneration { chat_session_id, stream_id, message_id: None }
        }),
        room.prop_map(|chat_session_id| Outbound::JoinChat { chat_session_id }),
        room.prop_map(|chat_session_id| Outbound::LeaveChat { chat_session_id }),
        (room, any::<bool>()).prop_map(|(chat_session_id, is_typing)| Outbound::Typing {
            chat_session_id,
            metadata: TypingMetadata { is_typing },
        }),
        Just(Outbound::Ping),
    ]
}

/// JSON objects with a known `type` and a random mix of fields.
fn frame_strategy() -> impl Strategy<Value = String> {
    let kind = prop_oneof![
        Just("connection_established"),
        Just("joined_chat"),
        Just("ack"),
        Just("message_sent"),
        Just("new_message"),
        Just("ai_stream_start"),
        Just("ai_response_chunk"),
        Just("ai_stream_complete"),
        Just("ai_stream_error"),
        Just("typing_indicator"),
        Just("user_left"),
        Just("error"),
    ];
    let field = prop_oneof![
        Just("stream_id"),
        Just("message_id"),
        Just("content"),
        Just("chat_id"),
        Just("user_id"),
        Just("id"),
        Just("connection_id"),
        Just("is_typing"),
    ];
    let value = prop_oneof![
        any::<String>().prop_map(Value::String),
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::Bool),
        Just(Value::Null),
    ];
    (kind, proptest::collection::vec((field, value), 0..6), any::<bool>()).prop_map(
        |(kind, fields, nest)| {
            let mut object = serde_json::Map::new();
            object.insert("type".into(), Value::from(kind));
            let mut metadata = serde_json::Map::new();
            for (name, value) in fields {
                if nest {
                    metadata.insert(name.into(), value);
                } else {
                    object.insert(name.into(), value);
                }
            }
            object.insert("metadata".into(), Value::Object(metadata));
            Value::Object(object).to_string()
        },
    )
}

proptest! {
    #[test]
    fn prop_decode_never_panics_on_text(text in any::<String>()) {
        let _ = decode(&text);
    }

    #[test]
    fn prop_decode_never_panics_on_shaped_frames(frame in frame_strategy()) {
        let _ = decode(&frame);
    }

    #[test]
    fn prop_encoded_envelope_carries_type_and_id(
        body in outbound_strategy(),
        bytes in any::<[u8; 16]>(),
    ) {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let envelope = Envelope::new(EnvelopeId::from_random(bytes), at, body.clone());
        let value: Value = serde_json::from_str(&encode(&envelope).unwrap()).unwrap();

        prop_assert_eq!(value["type"].as_str(), Some(body.kind()));
        prop_assert_eq!(value["id"].as_str(), envelope.id.as_ref().map(EnvelopeId::as_str));
        prop_assert!(value["timestamp"].is_string());
        if let Some(room) = body.room() {
            prop_assert_eq!(value["chat_session_id"].as_str(), Some(room.as_str()));
        }
    }
}
