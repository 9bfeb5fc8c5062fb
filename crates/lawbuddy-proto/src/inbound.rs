//! Server-to-client frames.

use serde_json::Value;

use crate::{EnvelopeId, MessageId, MessageRole, RoomId, StreamId, UserId};

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Socket accepted and authenticated
    ConnectionEstablished {
        /// Server-assigned connection id
        connection_id: String,
        /// Authenticated user, when reported
        user_id: Option<UserId>,
    },

    /// Server confirmed a `join_chat`
    JoinedChat {
        /// Room joined
        room_id: RoomId,
    },

    /// Generic acknowledgment of a tracked envelope
    Ack {
        /// Echoed client envelope id
        id: EnvelopeId,
    },

    /// Server persisted a `send_message`
    MessageSent {
        /// Echoed client envelope id, when the server reports it
        ack_id: Option<EnvelopeId>,
        /// Persisted message id
        message_id: Option<MessageId>,
        /// Room of the message
        room_id: Option<RoomId>,
        /// Stored content
        content: Option<String>,
    },

    /// Message from another participant
    NewMessage {
        /// Persisted message id
        message_id: Option<MessageId>,
        /// Room of the message
        room_id: Option<RoomId>,
        /// Author
        user_id: Option<UserId>,
        /// Author role
        role: Option<MessageRole>,
        /// Message text
        content: String,
    },

    /// AI generation began
    StreamStart {
        /// Stream id
        stream_id: StreamId,
        /// Message being generated
        message_id: MessageId,
        /// Room of the generation
        room_id: Option<RoomId>,
    },

    /// Incremental AI text
    StreamChunk {
        /// Stream id
        stream_id: StreamId,
        /// Text delta
        content: String,
    },

    /// AI generation finished
    StreamComplete {
        /// Stream id
        stream_id: StreamId,
        /// Authoritative final content
        content: String,
        /// Generation metadata (model, token counts, ...)
        metadata: Option<Value>,
    },

    /// AI generation failed server-side
    StreamError {
        /// Stream id; absent when the server reports the failure per room
        stream_id: Option<StreamId>,
        /// Room of the generation
        room_id: Option<RoomId>,
        /// Failure reason
        error: String,
    },

    /// Remote typing state
    TypingIndicator {
        /// Room
        room_id: RoomId,
        /// Typing user
        user_id: UserId,
        /// Typing flag
        is_typing: bool,
    },

    /// Participant joined a room
    UserJoined {
        /// Room
        room_id: RoomId,
        /// Participant
        user_id: UserId,
    },

    /// Participant left a room
    UserLeft {
        /// Room
        room_id: RoomId,
        /// Participant
        user_id: UserId,
    },

    /// Server broadcast announcement
    SystemMessage {
        /// Target room, if scoped
        room_id: Option<RoomId>,
        /// Announcement text
        content: String,
    },

    /// Keepalive reply
    Pong,

    /// Server-reported error
    Error {
        /// Error description
        message: String,
        /// Error code, if given
        code: Option<String>,
    },
}

impl Inbound {
    /// Canonical `type` string (aliases resolved).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => "connection_established",
            Self::JoinedChat { .. } => "joined_chat",
            Self::Ack { .. } => "ack",
            Self::MessageSent { .. } => "message_sent",
            Self::NewMessage { .. } => "new_message",
            Self::StreamStart { .. } => "ai_stream_start",
            Self::StreamChunk { .. } => "ai_stream_chunk",
            Self::StreamComplete { .. } => "ai_stream_complete",
            Self::StreamError { .. } => "ai_stream_error",
            Self::TypingIndicator { .. } => "typing_indicator",
            Self::UserJoined { .. } => "user_joined",
            Self::UserLeft { .. } => "user_left",
            Self::SystemMessage { .. } => "system_message",
            Self::Pong => "pong",
            Self::Error { .. } => "error",
        }
    }
}
