//! Outbound envelopes.
//!
//! An [`Envelope`] serializes to one flat JSON object:
//!
//! ```text
//! { "type": "send_message", "id": "…", "timestamp": "2024-…Z",
//!   "chat_session_id": "…", "content": "…", "role": "user" }
//! ```
//!
//! Field names follow what the server reads (`chat_session_id`,
//! `metadata.is_typing`), so the body variants carry them verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MessageId, RoomId, StreamId};

/// Client-generated envelope identifier.
///
/// Unique for the lifetime of the client. The server echoes it back in
/// acknowledgments and may use it to deduplicate resent frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvelopeId(String);

impl EnvelopeId {
    /// Build a v4 UUID identifier from 16 random bytes.
    pub fn from_random(bytes: [u8; 16]) -> Self {
        Self(uuid::Builder::from_random_bytes(bytes).into_uuid().to_string())
    }

    /// Identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EnvelopeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EnvelopeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Author role of a chat message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Human participant
    #[default]
    User,
    /// AI assistant
    Assistant,
    /// System announcement
    System,
}

/// Metadata block carried by `typing` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingMetadata {
    /// Whether the user is currently typing
    pub is_typing: bool,
}

/// Type-specific body of an outbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// Post a chat message (triggers an AI response server-side)
    SendMessage {
        /// Target room
        chat_session_id: RoomId,
        /// Message text
        content: String,
        /// Author role
        #[serde(default)]
        role: MessageRole,
    },

    /// Ask the server to regenerate an AI message
    RegenerateMessage {
        /// Room containing the message
        chat_session_id: RoomId,
        /// Message to regenerate
        message_id: MessageId,
    },

    /// Stop an in-flight AI generation
    CancelGeneration {
        /// Room of the generation, when known
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chat_session_id: Option<RoomId>,
        /// Stream to cancel
        stream_id: StreamId,
        /// Message the stream is producing, when known
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<MessageId>,
    },

    /// Subscribe to a room's traffic
    JoinChat {
        /// Room to join
        chat_session_id: RoomId,
    },

    /// Unsubscribe from a room's traffic
    LeaveChat {
        /// Room to leave
        chat_session_id: RoomId,
    },

    /// Local typing state change
    Typing {
        /// Room being typed in
        chat_session_id: RoomId,
        /// Typing flag
        metadata: TypingMetadata,
    },

    /// Keepalive
    Ping,
}

impl Outbound {
    /// Wire `type` string of this body.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "send_message",
            Self::RegenerateMessage { .. } => "regenerate_message",
            Self::CancelGeneration { .. } => "cancel_generation",
            Self::JoinChat { .. } => "join_chat",
            Self::LeaveChat { .. } => "leave_chat",
            Self::Typing { .. } => "typing",
            Self::Ping => "ping",
        }
    }

    /// Room this frame targets, if any.
    #[must_use]
    pub fn room(&self) -> Option<&RoomId> {
        match self {
            Self::SendMessage { chat_session_id, .. }
            | Self::RegenerateMessage { chat_session_id, .. }
            | Self::JoinChat { chat_session_id }
            | Self::LeaveChat { chat_session_id }
            | Self::Typing { chat_session_id, .. } => Some(chat_session_id),
            Self::CancelGeneration { chat_session_id, .. } => chat_session_id.as_ref(),
            Self::Ping => None,
        }
    }
}

/// Complete outbound frame. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Client-generated id; absent for fire-and-forget frames such as `ping`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EnvelopeId>,
    /// Creation time (RFC 3339)
    pub timestamp: DateTime<Utc>,
    /// Type tag and type-specific fields
    #[serde(flatten)]
    pub body: Outbound,
}

impl Envelope {
    /// Envelope with an id, for frames that are tracked.
    pub fn new(id: EnvelopeId, timestamp: DateTime<Utc>, body: Outbound) -> Self {
        Self { id: Some(id), timestamp, body }
    }

    /// Envelope without an id.
    pub fn untracked(timestamp: DateTime<Utc>, body: Outbound) -> Self {
        Self { id: None, timestamp, body }
    }

    /// Wire `type` string.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }
}
