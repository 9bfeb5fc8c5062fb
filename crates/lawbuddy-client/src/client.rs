//! Client state machine.
//!
//! The `Client` composes the connection, delivery, stream, and presence state
//! machines into the single state owned by one session. It performs no I/O:
//! the driver feeds it [`ClientEvent`]s and executes the returned
//! [`ClientAction`]s in order.

use std::collections::{BTreeSet, VecDeque};

use lawbuddy_core::{
    ClientError, Connection, ConnectionAction, ConnectionState, DeliveryTracker, Environment,
    LocalTyping, PresenceTracker, PresenceUpdate, QueuedMessage, SendOutcome, StreamAssembler,
    StreamSession, stream::CONNECTION_LOST,
};
use lawbuddy_proto::{
    CLOSE_AUTH_FAILED, CLOSE_NORMAL, CloseInfo, Envelope, EnvelopeId, Inbound, MessageId,
    MessageRole, Outbound, RoomId, StreamId, TypingMetadata,
};
use tracing::{debug, info, warn};

use crate::{
    collaborators::{CredentialProvider, ErrorSink, TracingErrorSink},
    config::ClientConfig,
    event::{ClientAction, ClientEvent, HealthSnapshot, Notification, SendOptions, SendReceipt},
};

/// Reason sent with a client-initiated close.
const CLIENT_CLOSE_REASON: &str = "client closed";

/// Close reason used when no credential is available at connect time.
const NO_CREDENTIAL_REASON: &str = "no credential available";

/// Client for one LawBuddy session.
pub struct Client<E: Environment> {
    /// Environment for time and randomness
    env: E,
    config: ClientConfig,
    credentials: Box<dyn CredentialProvider>,
    sink: Box<dyn ErrorSink>,

    connection: Connection<E::Instant>,
    delivery: DeliveryTracker<E::Instant>,
    streams: StreamAssembler<E::Instant>,
    presence: PresenceTracker<E::Instant>,
    local_typing: LocalTyping<E::Instant>,

    /// Rooms replayed with `join_chat` on every connect
    rooms: BTreeSet<RoomId>,

    /// Transmitted `send_message` envelopes awaiting acknowledgment, oldest
    /// first. Used to match `message_sent`, which does not echo our id.
    in_flight: VecDeque<QueuedMessage>,

    /// Messages that timed out, available for [`Client::retry`]
    failed: VecDeque<QueuedMessage>,

    /// Most recent errors, oldest first
    recent_errors: VecDeque<ClientError>,
}

impl<E: Environment> Client<E> {
    /// Create a disconnected client.
    pub fn new(
        env: E,
        config: ClientConfig,
        credentials: impl CredentialProvider + 'static,
    ) -> Self {
        let mut presence = PresenceTracker::new(config.presence.clone());
        let mut rooms = BTreeSet::new();
        if let Some(room) = &config.initial_room {
            presence.join_room(room.clone());
            rooms.insert(room.clone());
        }

        Self {
            env,
            connection: Connection::new(config.connection.clone()),
            delivery: DeliveryTracker::new(config.delivery.clone()),
            streams: StreamAssembler::new(),
            presence,
            local_typing: LocalTyping::new(config.presence.clone()),
            config,
            credentials: Box::new(credentials),
            sink: Box::new(TracingErrorSink),
            rooms,
            in_flight: VecDeque::new(),
            failed: VecDeque::new(),
            recent_errors: VecDeque::new(),
        }
    }

    /// Replace the default [`TracingErrorSink`].
    #[must_use]
    pub fn with_error_sink(mut self, sink: impl ErrorSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Environment in use.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Rooms replayed on connect, sorted.
    pub fn rooms(&self) -> impl Iterator<Item = &RoomId> {
        self.rooms.iter()
    }

    /// Remote presence and typing state.
    pub fn presence(&self) -> &PresenceTracker<E::Instant> {
        &self.presence
    }

    /// Open or recently closed stream session.
    pub fn stream(&self, stream_id: &str) -> Option<&StreamSession<E::Instant>> {
        self.streams.session(stream_id)
    }

    /// Ids of open streams, sorted.
    pub fn open_streams(&self) -> Vec<StreamId> {
        let mut ids: Vec<_> = self.streams.open_sessions().map(|s| s.stream_id.clone()).collect();
        ids.sort();
        ids
    }

    /// Messages that timed out without acknowledgment, oldest first.
    pub fn failed_messages(&self) -> impl Iterator<Item = &QueuedMessage> {
        self.failed.iter()
    }

    /// Read-only diagnostics.
    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            state: self.connection.state(),
            attempts: self.connection.attempts(),
            connection_id: self.connection.connection_id().map(str::to_string),
            last_connected: self.connection.last_connected(),
            queue_depth: self.delivery.queue_depth(),
            pending_acks: self.delivery.pending_count(),
            failed_messages: self.failed.len(),
            open_streams: self.streams.open_count(),
            average_round_trip: self.delivery.average_round_trip(),
            ping_round_trip: self.connection.last_round_trip(),
            joined_rooms: self.rooms.iter().cloned().collect(),
            recent_errors: self.recent_errors.iter().cloned().collect(),
        }
    }

    /// Process an event and return resulting actions.
    ///
    /// Never fails: errors surface as [`Notification::Error`].
    pub fn handle(&mut self, event: ClientEvent<E::Instant>) -> Vec<ClientAction> {
        match event {
            ClientEvent::Connect => {
                let now = self.env.now();
                let actions = self.connection.connect(now);
                self.apply_connection(actions, now)
            },
            ClientEvent::Disconnect => {
                let now = self.env.now();
                let actions = self.connection.disconnect();
                self.apply_connection(actions, now)
            },
            ClientEvent::Reconnect => {
                let now = self.env.now();
                let actions = self.connection.reconnect(now);
                self.apply_connection(actions, now)
            },
            ClientEvent::TransportOpened => {
                let now = self.env.now();
                let actions = self.connection.transport_opened(now, self.env.wall_clock());
                self.apply_connection(actions, now)
            },
            ClientEvent::TransportClosed(close) => {
                let now = self.env.now();
                let actions = self.connection.transport_closed(&close, &self.env, now);
                self.apply_connection(actions, now)
            },
            ClientEvent::FrameReceived(text) => self.handle_frame(&text),
            ClientEvent::TransmitFailed(unsent) => self.handle_transmit_failed(unsent),
            ClientEvent::Tick { now } => self.handle_tick(now),
            ClientEvent::JoinRoom { room_id } => self.handle_join_room(room_id),
            ClientEvent::LeaveRoom { room_id } => self.handle_leave_room(room_id),
            ClientEvent::SetTyping { room_id, is_typing } => {
                self.handle_set_typing(&room_id, is_typing)
            },
            ClientEvent::CancelGeneration { stream_id } => self.handle_cancel(&stream_id),
            ClientEvent::Regenerate { room_id, message_id } => {
                self.handle_regenerate(room_id, message_id)
            },
        }
    }

    /// Send a chat message. Never blocks: the receipt reports whether it was
    /// handed to the transport or queued for the next connection.
    ///
    /// Sending also ends local typing in `room_id`.
    pub fn send_message(
        &mut self,
        room_id: impl Into<RoomId>,
        content: impl Into<String>,
        options: SendOptions,
    ) -> (SendReceipt, Vec<ClientAction>) {
        let room_id = room_id.into();
        let mut actions = Vec::new();

        if self.local_typing.stop(&room_id).is_some() {
            actions.extend(self.typing_frame(&room_id, false));
        }

        let envelope = Envelope::new(self.next_id(), self.env.wall_clock(), Outbound::SendMessage {
            chat_session_id: room_id,
            content: content.into(),
            role: MessageRole::User,
        });
        let message = QueuedMessage { envelope, expect_ack: options.expect_ack };

        let (receipt, routed) = self.route(message, self.env.now());
        actions.extend(routed);
        (receipt, actions)
    }

    /// Resend a message that timed out, keeping its envelope id so the
    /// server can deduplicate it.
    ///
    /// Returns `None` if `id` is not a failed message.
    pub fn retry(&mut self, id: &EnvelopeId) -> Option<(SendReceipt, Vec<ClientAction>)> {
        let index = self.failed.iter().position(|m| m.id() == Some(id))?;
        let message = self.failed.remove(index)?;
        debug!(id = %id, "retrying message");
        Some(self.route(message, self.env.now()))
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<ClientAction> {
        let connection_actions = self.connection.tick(&self.env, now);
        let mut actions = self.apply_connection(connection_actions, now);

        for id in self.delivery.expire(now) {
            if let Some(index) = self.in_flight.iter().position(|m| m.id() == Some(&id))
                && let Some(message) = self.in_flight.remove(index)
            {
                self.push_failed(message);
            }
            warn!(id = %id, "no acknowledgment within timeout");
            self.record_error(ClientError::DeliveryTimeout { id: id.clone() });
            actions.push(ClientAction::Notify(Notification::DeliveryTimeout { id }));
        }

        for update in self.presence.sweep(now) {
            actions.push(ClientAction::Notify(presence_notification(update)));
        }

        for room_id in self.local_typing.tick(now) {
            actions.extend(self.typing_frame(&room_id, false));
        }

        // Backlog left over from a failed write while connected
        if self.connection.is_connected() && self.delivery.queue_depth() > 0 {
            actions.extend(self.flush_backlog(now));
        }

        actions
    }

    /// Convert connection actions into client actions.
    fn apply_connection(
        &mut self,
        connection_actions: Vec<ConnectionAction>,
        now: E::Instant,
    ) -> Vec<ClientAction> {
        let mut actions = Vec::new();

        for action in connection_actions {
            match action {
                ConnectionAction::Open { attempt } => match self.credentials.bearer_token() {
                    Some(token) => {
                        info!(attempt, url = %self.config.server_url, "opening transport");
                        actions.push(ClientAction::Open { url: self.config.connect_url(&token) });
                    },
                    None => {
                        let close = CloseInfo::new(CLOSE_AUTH_FAILED, NO_CREDENTIAL_REASON);
                        let followup = self.connection.transport_closed(&close, &self.env, now);
                        actions.extend(self.apply_connection(followup, now));
                    },
                },
                ConnectionAction::Close => actions.push(ClientAction::Close {
                    code: CLOSE_NORMAL,
                    reason: CLIENT_CLOSE_REASON.to_string(),
                }),
                ConnectionAction::SendPing => {
                    let envelope = Envelope::untracked(self.env.wall_clock(), Outbound::Ping);
                    let ping = QueuedMessage { envelope, expect_ack: false };
                    actions.push(ClientAction::Transmit(ping));
                },
                ConnectionAction::FlushQueue => actions.extend(self.flush(now)),
                ConnectionAction::AbortStreams => {
                    self.local_typing.clear();
                    for event in self.streams.abort_all(CONNECTION_LOST) {
                        actions.push(ClientAction::Notify(Notification::from_stream(event)));
                    }
                },
                ConnectionAction::StateChanged(state) => {
                    let attempts = self.connection.attempts();
                    info!(state = %state, attempts, "connection state changed");
                    actions.push(ClientAction::Notify(Notification::ConnectionChanged { state }));
                },
                ConnectionAction::Error(err) => {
                    self.record_error(err.clone());
                    actions.push(ClientAction::Notify(Notification::Error(err)));
                },
            }
        }

        actions
    }

    /// Rejoin every room, then replay the offline backlog in FIFO order.
    fn flush(&mut self, now: E::Instant) -> Vec<ClientAction> {
        let timestamp = self.env.wall_clock();
        let mut actions: Vec<_> = self
            .rooms
            .iter()
            .map(|room| {
                let body = Outbound::JoinChat { chat_session_id: room.clone() };
                ClientAction::Transmit(QueuedMessage {
                    envelope: Envelope::untracked(timestamp, body),
                    expect_ack: false,
                })
            })
            .collect();

        actions.extend(self.flush_backlog(now));
        actions
    }

    /// Transmit the whole queue in FIFO order.
    fn flush_backlog(&mut self, now: E::Instant) -> Vec<ClientAction> {
        let backlog = self.delivery.take_flush(now);
        if !backlog.is_empty() {
            info!(count = backlog.len(), "flushing offline queue");
        }
        backlog
            .into_iter()
            .map(|message| {
                self.track_in_flight(&message);
                ClientAction::Transmit(message)
            })
            .collect()
    }

    /// Hand a message to the delivery tracker.
    fn route(
        &mut self,
        message: QueuedMessage,
        now: E::Instant,
    ) -> (SendReceipt, Vec<ClientAction>) {
        let id = message.id().cloned().unwrap_or_else(|| self.next_id());

        match self.delivery.send(message, self.connection.is_connected(), now) {
            SendOutcome::Transmit(message) => {
                self.track_in_flight(&message);
                (SendReceipt::Sent { id }, vec![ClientAction::Transmit(message)])
            },
            SendOutcome::Queued { dropped } => {
                let depth = self.delivery.queue_depth();
                debug!(id = %id, depth, "message queued");

                let mut actions = Vec::new();
                if let Some(dropped_id) = dropped.as_ref().and_then(QueuedMessage::id) {
                    warn!(id = %dropped_id, "offline queue full, dropped oldest message");
                    let id = dropped_id.clone();
                    actions.push(ClientAction::Notify(Notification::Dropped { id }));
                }
                actions.push(ClientAction::Notify(Notification::Queued { id: id.clone(), depth }));

                // Connected with a backlog: send it now, this message last
                if self.connection.is_connected() {
                    actions.extend(self.flush_backlog(now));
                }
                (SendReceipt::Queued { id, depth }, actions)
            },
        }
    }

    fn track_in_flight(&mut self, message: &QueuedMessage) {
        if message.expect_ack && matches!(message.envelope.body, Outbound::SendMessage { .. }) {
            self.in_flight.push_back(message.clone());
        }
    }

    fn push_failed(&mut self, message: QueuedMessage) {
        self.failed.push_back(message);
        if self.failed.len() > self.config.delivery.queue_capacity {
            self.failed.pop_front();
        }
    }

    fn record_error(&mut self, err: ClientError) {
        self.sink.report(&err);
        self.recent_errors.push_back(err);
        while self.recent_errors.len() > self.config.recent_error_limit {
            self.recent_errors.pop_front();
        }
    }

    fn handle_transmit_failed(&mut self, unsent: Vec<QueuedMessage>) -> Vec<ClientAction> {
        // Untracked frames (ping, typing, join) are regenerated as needed.
        let tracked: Vec<_> = unsent.into_iter().filter(|m| m.id().is_some()).collect();
        if tracked.is_empty() {
            return Vec::new();
        }

        debug!(count = tracked.len(), "requeueing unsent messages");
        for message in &tracked {
            self.in_flight.retain(|m| m.id() != message.id());
        }
        let requeued: Vec<EnvelopeId> =
            tracked.iter().filter_map(QueuedMessage::id).cloned().collect();

        let dropped: Vec<EnvelopeId> = self
            .delivery
            .requeue_front(tracked)
            .iter()
            .filter_map(QueuedMessage::id)
            .cloned()
            .collect();

        let mut actions: Vec<_> = dropped
            .iter()
            .map(|id| {
                warn!(id = %id, "offline queue full, dropped oldest message");
                ClientAction::Notify(Notification::Dropped { id: id.clone() })
            })
            .collect();

        // Resent by the next flush: on reconnect, or the next tick if still
        // connected
        let depth = self.delivery.queue_depth();
        actions.extend(
            requeued
                .into_iter()
                .filter(|id| !dropped.contains(id))
                .map(|id| ClientAction::Notify(Notification::Queued { id, depth })),
        );
        actions
    }

    fn handle_join_room(&mut self, room_id: RoomId) -> Vec<ClientAction> {
        if !self.rooms.insert(room_id.clone()) {
            return Vec::new();
        }
        self.presence.join_room(room_id.clone());
        self.untracked_frame(Outbound::JoinChat { chat_session_id: room_id }).into_iter().collect()
    }

    fn handle_leave_room(&mut self, room_id: RoomId) -> Vec<ClientAction> {
        if !self.rooms.remove(&room_id) {
            return Vec::new();
        }
        self.presence.leave_room(&room_id);
        self.local_typing.stop(&room_id);

        let mut actions: Vec<_> = self
            .untracked_frame(Outbound::LeaveChat { chat_session_id: room_id.clone() })
            .into_iter()
            .collect();
        actions.push(ClientAction::Notify(Notification::RoomLeft { room_id }));
        actions
    }

    fn handle_set_typing(&mut self, room_id: &str, is_typing: bool) -> Vec<ClientAction> {
        let signal = if is_typing {
            self.local_typing.input(room_id, self.env.now())
        } else {
            self.local_typing.stop(room_id)
        };

        match signal {
            Some(is_typing) => self.typing_frame(room_id, is_typing).into_iter().collect(),
            None => Vec::new(),
        }
    }

    fn handle_cancel(&mut self, stream_id: &str) -> Vec<ClientAction> {
        let Some(session) = self.streams.session(stream_id).filter(|s| s.status.is_open()) else {
            debug!(stream_id, "cancel for unknown or closed stream ignored");
            return Vec::new();
        };

        let body = Outbound::CancelGeneration {
            chat_session_id: session.room_id.clone(),
            stream_id: stream_id.to_string(),
            message_id: Some(session.message_id.clone()),
        };

        let mut actions = Vec::new();
        if self.connection.is_connected() {
            let envelope = Envelope::new(self.next_id(), self.env.wall_clock(), body);
            actions.push(ClientAction::Transmit(QueuedMessage { envelope, expect_ack: false }));
        }
        if let Some(event) = self.streams.cancel(stream_id) {
            actions.push(ClientAction::Notify(Notification::from_stream(event)));
        }
        actions
    }

    fn handle_regenerate(&mut self, room_id: RoomId, message_id: MessageId) -> Vec<ClientAction> {
        let body = Outbound::RegenerateMessage { chat_session_id: room_id, message_id };
        let envelope = Envelope::new(self.next_id(), self.env.wall_clock(), body);
        let message = QueuedMessage { envelope, expect_ack: false };
        let (_, actions) = self.route(message, self.env.now());
        actions
    }

    fn handle_frame(&mut self, text: &str) -> Vec<ClientAction> {
        match lawbuddy_proto::decode(text) {
            Ok(inbound) => self.handle_inbound(inbound),
            Err(err) => {
                warn!(error = %err, len = text.len(), "dropping malformed frame");
                let err = ClientError::from(err);
                self.record_error(err.clone());
                vec![ClientAction::Notify(Notification::Error(err))]
            },
        }
    }

    fn handle_inbound(&mut self, inbound: Inbound) -> Vec<ClientAction> {
        let now = self.env.now();

        let notifications = match inbound {
            Inbound::ConnectionEstablished { connection_id, user_id } => {
                info!(connection_id = %connection_id, "connection established");
                self.connection.set_connection_id(connection_id.clone());
                if let Some(user) = &user_id {
                    self.presence.set_self(user.clone());
                }
                vec![Notification::Connected { connection_id, user_id }]
            },

            Inbound::JoinedChat { room_id } => {
                self.rooms.insert(room_id.clone());
                self.presence.join_room(room_id.clone());
                vec![Notification::RoomJoined { room_id }]
            },

            Inbound::Ack { id } => self.acknowledge(&id, now).into_iter().collect(),

            Inbound::MessageSent { ack_id, message_id, room_id, content } => {
                let id = ack_id
                    .or_else(|| self.match_in_flight(room_id.as_deref(), content.as_deref()));
                let mut notifications: Vec<_> =
                    id.as_ref().and_then(|id| self.acknowledge(id, now)).into_iter().collect();
                notifications.push(Notification::MessageSent { id, message_id, room_id });
                notifications
            },

            Inbound::NewMessage { message_id, room_id, user_id, role, content } => {
                let mut notifications = Vec::new();
                // A posted message ends the author's typing indicator
                if let (Some(room), Some(user)) = (&room_id, &user_id)
                    && let Some(update) = self.presence.remote_typing(room, user, false, now)
                {
                    notifications.push(presence_notification(update));
                }
                notifications.push(Notification::NewMessage {
                    message_id,
                    room_id,
                    user_id,
                    role,
                    content,
                });
                notifications
            },

            Inbound::StreamStart { stream_id, message_id, room_id } => self
                .streams
                .start(stream_id, message_id, room_id, now)
                .into_iter()
                .map(Notification::from_stream)
                .collect(),

            Inbound::StreamChunk { stream_id, content } => self
                .streams
                .chunk(&stream_id, &content, now)
                .map(Notification::from_stream)
                .into_iter()
                .collect(),

            Inbound::StreamComplete { stream_id, content, metadata } => self
                .streams
                .complete(&stream_id, content, metadata)
                .map(Notification::from_stream)
                .into_iter()
                .collect(),

            Inbound::StreamError { stream_id, room_id, error } => {
                let events: Vec<_> = match &stream_id {
                    Some(stream_id) => self.streams.error(stream_id, &error).into_iter().collect(),
                    None => self.streams.error_room(room_id.as_deref(), &error),
                };
                for event in &events {
                    let stream_id = event.stream_id.clone();
                    self.record_error(ClientError::Stream { stream_id, reason: error.clone() });
                }
                events.into_iter().map(Notification::from_stream).collect()
            },

            Inbound::TypingIndicator { room_id, user_id, is_typing } => self
                .presence
                .remote_typing(&room_id, &user_id, is_typing, now)
                .map(presence_notification)
                .into_iter()
                .collect(),

            Inbound::UserJoined { room_id, user_id } => self
                .presence
                .join(&room_id, &user_id, now)
                .into_iter()
                .map(presence_notification)
                .collect(),

            Inbound::UserLeft { room_id, user_id } => self
                .presence
                .leave(&room_id, &user_id, now)
                .into_iter()
                .map(presence_notification)
                .collect(),

            Inbound::SystemMessage { room_id, content } => {
                vec![Notification::SystemMessage { room_id, content }]
            },

            Inbound::Pong => {
                let round_trip = self.connection.pong_received(now);
                vec![Notification::Pong { round_trip }]
            },

            Inbound::Error { message, code } => {
                warn!(message = %message, code = ?code, "server reported error");
                let err = ClientError::Server { message, code };
                self.record_error(err.clone());
                vec![Notification::Error(err)]
            },
        };

        notifications.into_iter().map(ClientAction::Notify).collect()
    }

    fn acknowledge(&mut self, id: &EnvelopeId, now: E::Instant) -> Option<Notification> {
        self.in_flight.retain(|m| m.id() != Some(id));
        match self.delivery.acknowledge(id, now) {
            Some(delivered) => {
                Some(Notification::Delivered { id: delivered.id, round_trip: delivered.round_trip })
            },
            None => {
                debug!(id = %id, "ack for unknown or expired envelope ignored");
                None
            },
        }
    }

    /// Oldest in-flight message in `room_id` with the same content, falling
    /// back to the oldest in-flight message in that room.
    fn match_in_flight(&self, room_id: Option<&str>, content: Option<&str>) -> Option<EnvelopeId> {
        let in_room = |m: &&QueuedMessage| {
            room_id.is_none_or(|room| m.envelope.body.room().is_some_and(|r| r == room))
        };
        let same_content = |m: &&QueuedMessage| match (&m.envelope.body, content) {
            (Outbound::SendMessage { content: sent, .. }, Some(content)) => sent == content,
            _ => false,
        };

        if let Some(exact) = self.in_flight.iter().filter(in_room).find(same_content) {
            return exact.id().cloned();
        }

        let oldest = self.in_flight.iter().find(in_room).and_then(QueuedMessage::id).cloned();
        if let Some(id) = &oldest {
            let candidates = self.in_flight.iter().filter(in_room).count();
            debug!(id = %id, candidates, "message_sent matched oldest in-flight message");
        }
        oldest
    }

    fn typing_frame(&self, room_id: &str, is_typing: bool) -> Option<ClientAction> {
        self.untracked_frame(Outbound::Typing {
            chat_session_id: room_id.to_string(),
            metadata: TypingMetadata { is_typing },
        })
    }

    /// Fire-and-forget frame, only while connected. Never queued.
    fn untracked_frame(&self, body: Outbound) -> Option<ClientAction> {
        self.connection.is_connected().then(|| {
            ClientAction::Transmit(QueuedMessage {
                envelope: Envelope::untracked(self.env.wall_clock(), body),
                expect_ack: false,
            })
        })
    }

    fn next_id(&self) -> EnvelopeId {
        EnvelopeId::from_random(self.env.random_u128().to_be_bytes())
    }
}

impl<E: Environment> std::fmt::Debug for Client<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.connection.state())
            .field("rooms", &self.rooms)
            .field("queue_depth", &self.delivery.queue_depth())
            .field("in_flight", &self.in_flight.len())
            .field("open_streams", &self.streams.open_count())
            .finish_non_exhaustive()
    }
}

fn presence_notification(update: PresenceUpdate) -> Notification {
    match update {
        PresenceUpdate::Typing { room_id, user_id, is_typing } => {
            Notification::Typing { room_id, user_id, is_typing }
        },
        PresenceUpdate::Presence { room_id, user_id, status } => {
            Notification::PresenceChanged { room_id, user_id, status }
        },
    }
}
