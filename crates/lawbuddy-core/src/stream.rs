//! AI response stream assembly.
//!
//! Tracks one session per in-flight generation. The locally buffered text is
//! for optimistic rendering only: on completion the server's content replaces
//! it. Events for unknown or already-closed streams are no-ops, which makes
//! late and duplicate frames harmless and lets `cancel` race `complete`.

use std::{
    collections::{HashMap, VecDeque},
    ops::Sub,
    time::Duration,
};

use lawbuddy_proto::{MessageId, RoomId, StreamId};
use serde_json::Value;
use tracing::debug;

/// Closed sessions retained for diagnostics.
pub const HISTORY_LIMIT: usize = 32;

/// Failure reason applied to open streams when the connection drops.
pub const CONNECTION_LOST: &str = "connection lost";

/// Failure reason for a session replaced by a newer start for its message.
pub const SUPERSEDED: &str = "superseded";

/// Lifecycle of a stream session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    /// Started, no chunk yet
    Pending,
    /// At least one chunk received
    Streaming,
    /// Server completed the generation
    Complete,
    /// Generation failed or the connection dropped
    Failed(String),
    /// Cancelled locally or by the server
    Cancelled,
}

impl StreamStatus {
    /// Whether further chunks are accepted.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Streaming)
    }
}

/// One received chunk, for latency diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLogEntry<I> {
    /// Arrival time
    pub at: I,
    /// Chunk length in bytes
    pub len: usize,
}

/// State of one generation.
#[derive(Debug, Clone)]
pub struct StreamSession<I> {
    /// Stream id
    pub stream_id: StreamId,
    /// Message being generated
    pub message_id: MessageId,
    /// Room of the generation
    pub room_id: Option<RoomId>,
    /// Concatenated chunks
    pub buffered_content: String,
    /// Current status
    pub status: StreamStatus,
    /// Chunk arrival log
    pub chunk_log: Vec<ChunkLogEntry<I>>,
    /// When `start` arrived
    pub started_at: I,
    /// Server's final content once complete
    pub final_content: Option<String>,
    /// Completion metadata (model, token counts)
    pub metadata: Option<Value>,
}

impl<I> StreamSession<I>
where
    I: Copy + Sub<Output = Duration>,
{
    /// Time from start to the first chunk.
    pub fn first_chunk_latency(&self) -> Option<Duration> {
        self.chunk_log.first().map(|entry| entry.at - self.started_at)
    }

    /// Content to display: final content once complete, buffer otherwise.
    pub fn content(&self) -> &str {
        self.final_content.as_deref().unwrap_or(&self.buffered_content)
    }
}

/// What happened to a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEventKind {
    /// Session opened
    Started,
    /// Text appended
    Chunk {
        /// New text
        delta: String,
        /// Full buffer after appending
        buffered: String,
    },
    /// Server finished; `content` is authoritative
    Completed {
        /// Final content
        content: String,
        /// Completion metadata
        metadata: Option<Value>,
    },
    /// Session failed
    Failed {
        /// Failure reason
        reason: String,
    },
    /// Session cancelled
    Cancelled,
}

/// Stream transition reported to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    /// Stream id
    pub stream_id: StreamId,
    /// Message being generated
    pub message_id: MessageId,
    /// Room of the generation
    pub room_id: Option<RoomId>,
    /// Transition
    pub kind: StreamEventKind,
}

/// Open sessions keyed by stream id, plus bounded history.
#[derive(Debug, Clone)]
pub struct StreamAssembler<I> {
    open: HashMap<StreamId, StreamSession<I>>,
    history: VecDeque<StreamSession<I>>,
}

impl<I> Default for StreamAssembler<I> {
    fn default() -> Self {
        Self { open: HashMap::new(), history: VecDeque::with_capacity(HISTORY_LIMIT) }
    }
}

impl<I> StreamAssembler<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session.
    ///
    /// A duplicate start for an open or recently closed stream id is a no-op.
    /// An open session for the same message is closed as superseded first.
    pub fn start(
        &mut self,
        stream_id: StreamId,
        message_id: MessageId,
        room_id: Option<RoomId>,
        now: I,
    ) -> Vec<StreamEvent> {
        if self.open.contains_key(&stream_id) || self.in_history(&stream_id) {
            debug!(stream_id = %stream_id, "duplicate stream start ignored");
            return Vec::new();
        }

        let mut events = Vec::new();
        let previous = self
            .open
            .values()
            .find(|session| session.message_id == message_id)
            .map(|session| session.stream_id.clone());
        if let Some(previous) = previous
            && let Some(event) = self.close(&previous, StreamStatus::Failed(SUPERSEDED.into()))
        {
            events.push(event);
        }

        let session = StreamSession {
            stream_id: stream_id.clone(),
            message_id: message_id.clone(),
            room_id: room_id.clone(),
            buffered_content: String::new(),
            status: StreamStatus::Pending,
            chunk_log: Vec::new(),
            started_at: now,
            final_content: None,
            metadata: None,
        };
        self.open.insert(stream_id.clone(), session);

        events.push(StreamEvent { stream_id, message_id, room_id, kind: StreamEventKind::Started });
        events
    }

    /// Append a chunk. `Pending` becomes `Streaming`.
    pub fn chunk(&mut self, stream_id: &str, text: &str, now: I) -> Option<StreamEvent> {
        let Some(session) = self.open.get_mut(stream_id) else {
            debug!(stream_id, "chunk for unknown or closed stream ignored");
            return None;
        };

        session.buffered_content.push_str(text);
        session.chunk_log.push(ChunkLogEntry { at: now, len: text.len() });
        session.status = StreamStatus::Streaming;

        Some(StreamEvent {
            stream_id: session.stream_id.clone(),
            message_id: session.message_id.clone(),
            room_id: session.room_id.clone(),
            kind: StreamEventKind::Chunk {
                delta: text.to_string(),
                buffered: session.buffered_content.clone(),
            },
        })
    }

    /// Complete with the server's final content.
    pub fn complete(
        &mut self,
        stream_id: &str,
        final_content: String,
        metadata: Option<Value>,
    ) -> Option<StreamEvent> {
        let Some(session) = self.open.get_mut(stream_id) else {
            debug!(stream_id, "completion for unknown or closed stream ignored");
            return None;
        };

        session.final_content = Some(final_content);
        session.metadata = metadata;
        self.close(stream_id, StreamStatus::Complete)
    }

    /// Fail with a server-reported reason.
    pub fn error(&mut self, stream_id: &str, reason: &str) -> Option<StreamEvent> {
        if !self.open.contains_key(stream_id) {
            debug!(stream_id, reason, "error for unknown or closed stream ignored");
            return None;
        }
        self.close(stream_id, StreamStatus::Failed(reason.to_string()))
    }

    /// Cancel an open stream.
    pub fn cancel(&mut self, stream_id: &str) -> Option<StreamEvent> {
        if !self.open.contains_key(stream_id) {
            debug!(stream_id, "cancel for unknown or closed stream ignored");
            return None;
        }
        self.close(stream_id, StreamStatus::Cancelled)
    }

    /// Fail every open session, oldest first.
    pub fn abort_all(&mut self, reason: &str) -> Vec<StreamEvent> {
        self.fail_where(reason, |_| true)
    }

    /// Fail every open session in `room_id`, oldest first. With no room,
    /// every open session fails.
    pub fn error_room(&mut self, room_id: Option<&str>, reason: &str) -> Vec<StreamEvent> {
        let events = self.fail_where(reason, |session| {
            room_id.is_none_or(|room| session.room_id.as_deref() == Some(room))
        });
        if events.is_empty() {
            debug!(room_id = ?room_id, reason, "room error with no open stream ignored");
        }
        events
    }

    fn fail_where(
        &mut self,
        reason: &str,
        matches: impl Fn(&StreamSession<I>) -> bool,
    ) -> Vec<StreamEvent> {
        let mut ids: Vec<_> = self
            .open
            .values()
            .filter(|s| matches(s))
            .map(|s| (s.started_at, s.stream_id.clone()))
            .collect();
        ids.sort();

        ids.into_iter()
            .filter_map(|(_, id)| self.close(&id, StreamStatus::Failed(reason.to_string())))
            .collect()
    }

    /// Open or recently closed session.
    pub fn session(&self, stream_id: &str) -> Option<&StreamSession<I>> {
        self.open
            .get(stream_id)
            .or_else(|| self.history.iter().rev().find(|s| s.stream_id == stream_id))
    }

    /// Number of open sessions.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Open sessions, unordered.
    pub fn open_sessions(&self) -> impl Iterator<Item = &StreamSession<I>> {
        self.open.values()
    }

    /// Closed sessions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &StreamSession<I>> {
        self.history.iter()
    }

    fn in_history(&self, stream_id: &str) -> bool {
        self.history.iter().any(|s| s.stream_id == stream_id)
    }

    fn close(&mut self, stream_id: &str, status: StreamStatus) -> Option<StreamEvent> {
        let mut session = self.open.remove(stream_id)?;
        session.status = status.clone();

        let kind = match status {
            StreamStatus::Complete => StreamEventKind::Completed {
                content: session.content().to_string(),
                metadata: session.metadata.clone(),
            },
            StreamStatus::Failed(reason) => StreamEventKind::Failed { reason },
            StreamStatus::Cancelled => StreamEventKind::Cancelled,
            StreamStatus::Pending | StreamStatus::Streaming => return None,
        };

        let event = StreamEvent {
            stream_id: session.stream_id.clone(),
            message_id: session.message_id.clone(),
            room_id: session.room_id.clone(),
            kind,
        };

        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(session);

        Some(event)
    }
}
