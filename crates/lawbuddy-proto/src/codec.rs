//! JSON encode/decode.
//!
//! Decoding is lenient about where a field lives: the server puts some
//! fields at the top level and others under `metadata` (`chat_id`,
//! `connection_id`, `is_typing`), so lookups fall back from one to the other.
//! Scalars are accepted as strings or numbers.

use serde_json::{Map, Value};

use crate::{
    Envelope, EnvelopeId, Inbound, MessageRole,
    errors::{ProtocolError, Result},
};

/// Serialize an envelope to a JSON text frame.
pub fn encode(envelope: &Envelope) -> Result<String> {
    Ok(serde_json::to_string(envelope)?)
}

/// Decode a JSON text frame.
///
/// # Errors
///
/// - `ProtocolError::Json` if the text is not JSON
/// - `ProtocolError::NotAnObject` if the root is not an object
/// - `ProtocolError::MissingType` if `type` is absent or not a string
/// - `ProtocolError::UnknownType` for unrecognized `type` values
/// - `ProtocolError::MissingField` if a required field is absent
pub fn decode(text: &str) -> Result<Inbound> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(fields) = value else {
        return Err(ProtocolError::NotAnObject);
    };
    let frame = RawFrame::new(&fields);

    let kind = fields.get("type").and_then(Value::as_str).ok_or(ProtocolError::MissingType)?;

    let inbound = match kind {
        "connection_established" => Inbound::ConnectionEstablished {
            connection_id: frame.require("connection_established", "connection_id")?,
            user_id: frame.text("user_id"),
        },
        "joined_chat" => {
            Inbound::JoinedChat { room_id: frame.room().ok_or(missing("joined_chat", "chat_id"))? }
        },
        "ack" => Inbound::Ack { id: EnvelopeId::from(frame.require("ack", "id")?) },
        "message_sent" => Inbound::MessageSent {
            ack_id: frame.top("id").or_else(|| frame.text("client_id")).map(EnvelopeId::from),
            message_id: frame.text("message_id"),
            room_id: frame.room(),
            content: frame.text("content"),
        },
        "new_message" => Inbound::NewMessage {
            message_id: frame.text("message_id"),
            room_id: frame.room(),
            user_id: frame.text("user_id"),
            role: frame.role(),
            content: frame.require("new_message", "content")?,
        },
        "ai_stream_start" | "ai_response_started" => Inbound::StreamStart {
            stream_id: frame.stream_id("ai_stream_start")?,
            message_id: frame.require("ai_stream_start", "message_id")?,
            room_id: frame.room(),
        },
        "ai_stream_chunk" | "ai_response_chunk" => Inbound::StreamChunk {
            stream_id: frame.stream_id("ai_stream_chunk")?,
            content: frame.top("content").unwrap_or_default(),
        },
        "ai_stream_complete" | "ai_response_complete" => Inbound::StreamComplete {
            stream_id: frame.stream_id("ai_stream_complete")?,
            content: frame.top("content").ok_or(missing("ai_stream_complete", "content"))?,
            metadata: frame.completion_metadata(),
        },
        "ai_stream_error" | "ai_response_error" => Inbound::StreamError {
            stream_id: frame.any_stream_id(),
            room_id: frame.room(),
            error: frame.text("error").unwrap_or_else(|| "generation failed".to_string()),
        },
        "typing_indicator" => Inbound::TypingIndicator {
            room_id: frame.room().ok_or(missing("typing_indicator", "chat_id"))?,
            user_id: frame.require("typing_indicator", "user_id")?,
            is_typing: frame.flag("is_typing").unwrap_or(false),
        },
        "user_joined" => Inbound::UserJoined {
            room_id: frame.room().ok_or(missing("user_joined", "chat_id"))?,
            user_id: frame.require("user_joined", "user_id")?,
        },
        "user_left" => Inbound::UserLeft {
            room_id: frame.room().ok_or(missing("user_left", "chat_id"))?,
            user_id: frame.require("user_left", "user_id")?,
        },
        "system_message" => Inbound::SystemMessage {
            room_id: frame.room(),
            content: frame.require("system_message", "content")?,
        },
        "pong" => Inbound::Pong,
        "error" => Inbound::Error {
            message: frame
                .text("error")
                .or_else(|| frame.text("message"))
                .or_else(|| frame.top("content"))
                .unwrap_or_else(|| "unknown error".to_string()),
            code: frame.text("code"),
        },
        other => return Err(ProtocolError::UnknownType(other.to_string())),
    };

    Ok(inbound)
}

fn missing(frame: &'static str, field: &'static str) -> ProtocolError {
    ProtocolError::MissingField { frame, field }
}

/// Borrowed view over a decoded JSON object.
struct RawFrame<'a> {
    fields: &'a Map<String, Value>,
    metadata: Option<&'a Map<String, Value>>,
}

impl<'a> RawFrame<'a> {
    fn new(fields: &'a Map<String, Value>) -> Self {
        let metadata = fields.get("metadata").and_then(Value::as_object);
        Self { fields, metadata }
    }

    /// Top-level scalar only.
    fn top(&self, key: &str) -> Option<String> {
        self.fields.get(key).and_then(scalar)
    }

    /// Top-level scalar, falling back to `metadata`.
    fn text(&self, key: &str) -> Option<String> {
        self.top(key).or_else(|| self.metadata.and_then(|m| m.get(key)).and_then(scalar))
    }

    fn require(&self, frame: &'static str, key: &'static str) -> Result<String> {
        self.text(key).ok_or(missing(frame, key))
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.fields
            .get(key)
            .and_then(Value::as_bool)
            .or_else(|| self.metadata.and_then(|m| m.get(key)).and_then(Value::as_bool))
    }

    fn room(&self) -> Option<String> {
        ["room_id", "chat_id", "chat_session_id"].iter().find_map(|key| self.text(key))
    }

    fn role(&self) -> Option<MessageRole> {
        match self.text("role")?.as_str() {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            "system" => Some(MessageRole::System),
            _ => None,
        }
    }

    fn stream_id(&self, frame: &'static str) -> Result<String> {
        self.any_stream_id().ok_or(missing(frame, "stream_id"))
    }

    /// Stream frames from older servers carry only `message_id`.
    fn any_stream_id(&self) -> Option<String> {
        self.text("stream_id").or_else(|| self.text("streamId")).or_else(|| self.text("message_id"))
    }

    fn completion_metadata(&self) -> Option<Value> {
        let metadata = self.metadata?;
        match metadata.get("ai_metadata") {
            Some(Value::Null) | None => Some(Value::Object(metadata.clone())),
            Some(inner) => Some(inner.clone()),
        }
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
