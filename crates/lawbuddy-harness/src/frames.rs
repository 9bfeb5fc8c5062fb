//! Server frame builders.
//!
//! Each function returns the JSON text a LawBuddy server would put on the
//! socket, in the field layout the production server uses (room under
//! `metadata.chat_id` for broadcast frames, top-level ids for stream frames).

use serde_json::{Value, json};

/// `connection_established`, with the connection id under `metadata`.
pub fn connection_established(connection_id: &str, user_id: &str) -> String {
    json!({
        "type": "connection_established",
        "content": "Connected to LawBuddy",
        "metadata": { "user_id": user_id, "connection_id": connection_id },
    })
    .to_string()
}

/// `joined_chat` confirmation.
pub fn joined_chat(room_id: &str) -> String {
    json!({ "type": "joined_chat", "chat_id": room_id }).to_string()
}

/// Generic acknowledgment echoing a client envelope id.
pub fn ack(id: &str) -> String {
    json!({ "type": "ack", "id": id }).to_string()
}

/// `message_sent` without the client envelope id, as the server sends it.
pub fn message_sent(message_id: &str, room_id: &str, content: &str) -> String {
    json!({
        "type": "message_sent",
        "message_id": message_id,
        "content": content,
        "metadata": { "chat_id": room_id },
    })
    .to_string()
}

/// `message_sent` that echoes the client envelope id.
pub fn message_sent_with_id(id: &str, message_id: &str, room_id: &str) -> String {
    json!({
        "type": "message_sent",
        "id": id,
        "message_id": message_id,
        "metadata": { "chat_id": room_id },
    })
    .to_string()
}

/// `new_message` from another participant.
pub fn new_message(message_id: &str, room_id: &str, user_id: &str, content: &str) -> String {
    json!({
        "type": "new_message",
        "message_id": message_id,
        "user_id": user_id,
        "role": "user",
        "content": content,
        "metadata": { "chat_id": room_id },
    })
    .to_string()
}

/// `ai_stream_start`.
pub fn stream_start(stream_id: &str, message_id: &str, room_id: &str) -> String {
    json!({
        "type": "ai_stream_start",
        "stream_id": stream_id,
        "message_id": message_id,
        "room_id": room_id,
    })
    .to_string()
}

/// `ai_stream_chunk`.
pub fn stream_chunk(stream_id: &str, delta: &str) -> String {
    json!({ "type": "ai_stream_chunk", "stream_id": stream_id, "content": delta }).to_string()
}

/// `ai_stream_complete` carrying the authoritative content.
pub fn stream_complete(stream_id: &str, content: &str, metadata: Value) -> String {
    json!({
        "type": "ai_stream_complete",
        "stream_id": stream_id,
        "content": content,
        "metadata": { "ai_metadata": metadata },
    })
    .to_string()
}

/// `ai_stream_error`.
pub fn stream_error(stream_id: &str, error: &str) -> String {
    json!({ "type": "ai_stream_error", "stream_id": stream_id, "error": error }).to_string()
}

/// `ai_response_error` naming only the room.
pub fn room_stream_error(room_id: &str, error: &str) -> String {
    json!({ "type": "ai_response_error", "error": error, "metadata": { "chat_id": room_id } })
        .to_string()
}

/// `typing_indicator`, flag nested under `metadata`.
pub fn typing(room_id: &str, user_id: &str, is_typing: bool) -> String {
    json!({
        "type": "typing_indicator",
        "user_id": user_id,
        "metadata": { "chat_id": room_id, "is_typing": is_typing },
    })
    .to_string()
}

/// `user_joined`.
pub fn user_joined(room_id: &str, user_id: &str) -> String {
    json!({ "type": "user_joined", "user_id": user_id, "metadata": { "chat_id": room_id } })
        .to_string()
}

/// `user_left`.
pub fn user_left(room_id: &str, user_id: &str) -> String {
    json!({ "type": "user_left", "user_id": user_id, "metadata": { "chat_id": room_id } })
        .to_string()
}

/// `system_message`.
pub fn system_message(room_id: &str, content: &str) -> String {
    json!({ "type": "system_message", "content": content, "metadata": { "chat_id": room_id } })
        .to_string()
}

/// Keepalive reply.
pub fn pong() -> String {
    json!({ "type": "pong" }).to_string()
}

/// Server-reported error.
pub fn error(message: &str, code: &str) -> String {
    json!({ "type": "error", "error": message, "code": code }).to_string()
}

#[cfg(test)]
mod tests {
    use lawbuddy_proto::{Inbound, decode};

    use super::*;

    #[test]
    fn every_builder_decodes() {
        let frames = [
            connection_established("c1", "u1"),
            joined_chat("r1"),
            ack("m1"),
            message_sent("42", "r1", "hi"),
            message_sent_with_id("m1", "42", "r1"),
            new_message("43", "r1", "u2", "hello"),
            stream_start("s1", "44", "r1"),
            stream_chunk("s1", "He"),
            stream_complete("s1", "Hello", json!({ "model": "mini" })),
            stream_error("s1", "boom"),
            typing("r1", "u2", true),
            user_joined("r1", "u2"),
            user_left("r1", "u2"),
            system_message("r1", "maintenance"),
            pong(),
            error("bad", "E1"),
        ];
        for frame in frames {
            assert!(decode(&frame).is_ok(), "{frame}");
        }
    }

    #[test]
    fn message_sent_has_no_client_id() {
        let Inbound::MessageSent { ack_id, room_id, .. } =
            decode(&message_sent("42", "r1", "hi")).unwrap()
        else {
            panic!("wrong frame");
        };
        assert_eq!(ack_id, None);
        assert_eq!(room_id.as_deref(), Some("r1"));
    }
}
