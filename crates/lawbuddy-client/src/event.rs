//! Client events, actions, and notifications.

use std::time::Duration;

use chrono::{DateTime, Utc};
use lawbuddy_core::{
    ClientError, ConnectionState, PresenceStatus, QueuedMessage, Routable, StreamEvent,
    StreamEventKind, Topic,
};
use lawbuddy_proto::{CloseInfo, EnvelopeId, MessageId, MessageRole, RoomId, StreamId, UserId};
use serde_json::Value;
use url::Url;

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Reporting transport open/close and received text frames
/// - Driving time forward via ticks
/// - Forwarding application intents (join, typing, cancel, ...)
///
/// Sending chat messages goes through [`crate::Client::send_message`] instead,
/// since it returns a receipt.
#[derive(Debug, Clone)]
pub enum ClientEvent<I = std::time::Instant> {
    /// Application wants to connect.
    Connect,

    /// Application wants to disconnect. Suppresses auto-reconnect.
    Disconnect,

    /// Manual retry after `Error`, or to cycle a live connection.
    Reconnect,

    /// The transport requested by `ClientAction::Open` is open.
    TransportOpened,

    /// The transport closed or failed to open.
    TransportClosed(CloseInfo),

    /// Text frame received from the server.
    FrameReceived(String),

    /// Messages handed to the transport that were not written.
    TransmitFailed(Vec<QueuedMessage>),

    /// Time tick for timer processing.
    Tick {
        /// Current time from the environment.
        now: I,
    },

    /// Subscribe to a room. Remembered and replayed on every connect.
    JoinRoom {
        /// Room to join.
        room_id: RoomId,
    },

    /// Unsubscribe from a room.
    LeaveRoom {
        /// Room to leave.
        room_id: RoomId,
    },

    /// Local typing activity.
    SetTyping {
        /// Room being typed in.
        room_id: RoomId,
        /// `true` on each keystroke, `false` when input is cleared.
        is_typing: bool,
    },

    /// Stop an in-flight generation.
    CancelGeneration {
        /// Stream to cancel.
        stream_id: StreamId,
    },

    /// Ask the server to regenerate an AI message.
    Regenerate {
        /// Room of the message.
        room_id: RoomId,
        /// Message to regenerate.
        message_id: MessageId,
    },
}

/// Actions the client produces for the caller to execute, in order.
#[derive(Debug, Clone)]
pub enum ClientAction {
    /// Open a transport to this URL (token included).
    Open {
        /// Connect URL.
        url: Url,
    },

    /// Close the current transport.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },

    /// Encode and write this envelope.
    Transmit(QueuedMessage),

    /// Deliver to subscribers.
    Notify(Notification),
}

/// Options for [`crate::Client::send_message`].
#[derive(Debug, Clone, Copy)]
pub struct SendOptions {
    /// Track an acknowledgment; a timeout is reported if none arrives.
    pub expect_ack: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self { expect_ack: true }
    }
}

/// Immediate result of a send. Never blocks on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendReceipt {
    /// Handed to the transport now. A write that fails afterwards is
    /// reported with [`Notification::Queued`] for the same id.
    Sent {
        /// Envelope id.
        id: EnvelopeId,
    },
    /// Queued behind the offline backlog; sent in order with it.
    Queued {
        /// Envelope id.
        id: EnvelopeId,
        /// Queue depth including this message.
        depth: usize,
    },
}

impl SendReceipt {
    /// Envelope id of the sent or queued message.
    pub fn id(&self) -> &EnvelopeId {
        match self {
            Self::Sent { id } | Self::Queued { id, .. } => id,
        }
    }
}

/// What subscribers receive.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Connection state changed.
    ConnectionChanged {
        /// New state.
        state: ConnectionState,
    },

    /// Server accepted the connection.
    Connected {
        /// Server-assigned connection id.
        connection_id: String,
        /// Authenticated user.
        user_id: Option<UserId>,
    },

    /// Message queued, either while offline or after a failed write.
    Queued {
        /// Envelope id.
        id: EnvelopeId,
        /// Queue depth.
        depth: usize,
    },

    /// Message evicted from a full offline queue.
    Dropped {
        /// Evicted envelope id.
        id: EnvelopeId,
    },

    /// Acknowledgment received.
    Delivered {
        /// Envelope id.
        id: EnvelopeId,
        /// Transmit-to-ack latency.
        round_trip: Duration,
    },

    /// No acknowledgment within the timeout. Retry with
    /// [`crate::Client::retry`].
    DeliveryTimeout {
        /// Envelope id.
        id: EnvelopeId,
    },

    /// Message from another participant or the assistant.
    NewMessage {
        /// Persisted id.
        message_id: Option<MessageId>,
        /// Room.
        room_id: Option<RoomId>,
        /// Author.
        user_id: Option<UserId>,
        /// Author role.
        role: Option<MessageRole>,
        /// Text.
        content: String,
    },

    /// Server persisted one of our messages.
    MessageSent {
        /// Our envelope id, when matched.
        id: Option<EnvelopeId>,
        /// Persisted id.
        message_id: Option<MessageId>,
        /// Room.
        room_id: Option<RoomId>,
    },

    /// Generation started.
    StreamStarted {
        /// Stream id.
        stream_id: StreamId,
        /// Message being generated.
        message_id: MessageId,
        /// Room.
        room_id: Option<RoomId>,
    },

    /// Generation produced text.
    StreamChunk {
        /// Stream id.
        stream_id: StreamId,
        /// New text.
        delta: String,
        /// Text so far, for optimistic rendering.
        buffered: String,
    },

    /// Generation finished.
    StreamCompleted {
        /// Stream id.
        stream_id: StreamId,
        /// Message generated.
        message_id: MessageId,
        /// Room.
        room_id: Option<RoomId>,
        /// Authoritative final content.
        content: String,
        /// Completion metadata.
        metadata: Option<Value>,
    },

    /// Generation failed or the connection dropped mid-stream.
    StreamFailed {
        /// Stream id.
        stream_id: StreamId,
        /// Message that was being generated.
        message_id: MessageId,
        /// Reason.
        reason: String,
    },

    /// Generation cancelled.
    StreamCancelled {
        /// Stream id.
        stream_id: StreamId,
        /// Message that was being generated.
        message_id: MessageId,
    },

    /// Remote typing state changed (including synthesized stops).
    Typing {
        /// Room.
        room_id: RoomId,
        /// Participant.
        user_id: UserId,
        /// Typing flag.
        is_typing: bool,
    },

    /// Participant came online or went offline.
    PresenceChanged {
        /// Room.
        room_id: RoomId,
        /// Participant.
        user_id: UserId,
        /// Status.
        status: PresenceStatus,
    },

    /// Server confirmed a join.
    RoomJoined {
        /// Room.
        room_id: RoomId,
    },

    /// Left a room.
    RoomLeft {
        /// Room.
        room_id: RoomId,
    },

    /// Server announcement.
    SystemMessage {
        /// Room, if scoped.
        room_id: Option<RoomId>,
        /// Text.
        content: String,
    },

    /// Heartbeat reply.
    Pong {
        /// Ping round trip, if a ping was outstanding.
        round_trip: Option<Duration>,
    },

    /// Connection-level, protocol, or server error.
    Error(ClientError),
}

impl Notification {
    /// Map a stream transition onto its notification.
    pub fn from_stream(event: StreamEvent) -> Self {
        let StreamEvent { stream_id, message_id, room_id, kind } = event;
        match kind {
            StreamEventKind::Started => Self::StreamStarted { stream_id, message_id, room_id },
            StreamEventKind::Chunk { delta, buffered } => {
                Self::StreamChunk { stream_id, delta, buffered }
            },
            StreamEventKind::Completed { content, metadata } => {
                Self::StreamCompleted { stream_id, message_id, room_id, content, metadata }
            },
            StreamEventKind::Failed { reason } => {
                Self::StreamFailed { stream_id, message_id, reason }
            },
            StreamEventKind::Cancelled => Self::StreamCancelled { stream_id, message_id },
        }
    }
}

impl Routable for Notification {
    fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionChanged { .. } => "connection_state",
            Self::Connected { .. } => "connection_established",
            Self::Queued { .. } => "queued",
            Self::Dropped { .. } => "dropped",
            Self::Delivered { .. } => "delivered",
            Self::DeliveryTimeout { .. } => "delivery_timeout",
            Self::NewMessage { .. } => "new_message",
            Self::MessageSent { .. } => "message_sent",
            Self::StreamStarted { .. } => "ai_stream_start",
            Self::StreamChunk { .. } => "ai_stream_chunk",
            Self::StreamCompleted { .. } => "ai_stream_complete",
            Self::StreamFailed { .. } => "ai_stream_error",
            Self::StreamCancelled { .. } => "ai_stream_cancelled",
            Self::Typing { .. } => "typing_indicator",
            Self::PresenceChanged { .. } => "presence",
            Self::RoomJoined { .. } => "joined_chat",
            Self::RoomLeft { .. } => "left_chat",
            Self::SystemMessage { .. } => "system_message",
            Self::Pong { .. } => "pong",
            Self::Error(_) => "error",
        }
    }

    fn channel(&self) -> Option<Topic> {
        match self {
            Self::ConnectionChanged { .. } | Self::Connected { .. } => Some(Topic::Connection),
            Self::Error(_) | Self::DeliveryTimeout { .. } => Some(Topic::Error),
            _ => None,
        }
    }
}

/// Read-only diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSnapshot {
    /// Connection state.
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful open.
    pub attempts: u32,
    /// Server-assigned connection id.
    pub connection_id: Option<String>,
    /// Wall-clock time of the last successful open.
    pub last_connected: Option<DateTime<Utc>>,
    /// Messages waiting for a connection.
    pub queue_depth: usize,
    /// Messages awaiting acknowledgment.
    pub pending_acks: usize,
    /// Messages that timed out and can be retried.
    pub failed_messages: usize,
    /// Open AI streams.
    pub open_streams: usize,
    /// Mean ack round trip over recent messages.
    pub average_round_trip: Option<Duration>,
    /// Last ping round trip.
    pub ping_round_trip: Option<Duration>,
    /// Rooms replayed on connect.
    pub joined_rooms: Vec<RoomId>,
    /// Most recent errors, oldest first.
    pub recent_errors: Vec<ClientError>,
}
