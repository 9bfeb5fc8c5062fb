//! Single-owner session actor.
//!
//! One [`SessionActor`] task owns the [`Client`], the [`EventDispatcher`],
//! and the current transport. Everything else talks to it through a
//! cloneable [`SessionHandle`], so session state is only ever touched from
//! one place.
//!
//! The actor selects over three sources:
//! - handle commands
//! - transport events, tagged with the connection generation that produced
//!   them so events from a replaced socket are dropped
//! - a `tokio::time::interval` that feeds `Tick` into the client

use std::{collections::VecDeque, sync::Arc, time::Duration};

use lawbuddy_core::{
    Environment, EventDispatcher, HandlerResult, QueuedMessage, Routable, SubscriptionId, Topic,
};
use lawbuddy_proto::{CloseInfo, EnvelopeId, MessageId, RoomId, StreamId};
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot},
    task::AbortHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    client::Client,
    event::{ClientAction, ClientEvent, HealthSnapshot, Notification, SendOptions, SendReceipt},
    transport::{ConnectedTransport, Connector, Outgoing, TransportError, TransportEvent},
};

/// Capacity of the command channel.
const COMMAND_CAPACITY: usize = 64;

type BoxedHandler = Box<dyn FnMut(&Notification) -> HandlerResult + Send>;

/// The session actor has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("session closed")]
pub struct SessionClosed;

enum Command {
    Event(LocalEvent),
    Send {
        room_id: RoomId,
        content: String,
        options: SendOptions,
        reply: oneshot::Sender<SendReceipt>,
    },
    Retry {
        id: EnvelopeId,
        reply: oneshot::Sender<Option<SendReceipt>>,
    },
    Subscribe {
        topic: Topic,
        handler: BoxedHandler,
        reply: oneshot::Sender<SubscriptionId>,
    },
    Unsubscribe {
        id: SubscriptionId,
        reply: oneshot::Sender<bool>,
    },
    Health {
        reply: oneshot::Sender<HealthSnapshot>,
    },
    Dispose {
        reply: oneshot::Sender<()>,
    },
}

/// Handle-originated client events. `Tick` and transport events only come
/// from inside the actor.
#[derive(Debug)]
enum LocalEvent {
    Connect,
    Disconnect,
    Reconnect,
    JoinRoom(RoomId),
    LeaveRoom(RoomId),
    SetTyping { room_id: RoomId, is_typing: bool },
    CancelGeneration(StreamId),
    Regenerate { room_id: RoomId, message_id: MessageId },
}

impl LocalEvent {
    fn into_client_event<I>(self) -> ClientEvent<I> {
        match self {
            Self::Connect => ClientEvent::Connect,
            Self::Disconnect => ClientEvent::Disconnect,
            Self::Reconnect => ClientEvent::Reconnect,
            Self::JoinRoom(room_id) => ClientEvent::JoinRoom { room_id },
            Self::LeaveRoom(room_id) => ClientEvent::LeaveRoom { room_id },
            Self::SetTyping { room_id, is_typing } => ClientEvent::SetTyping { room_id, is_typing },
            Self::CancelGeneration(stream_id) => ClientEvent::CancelGeneration { stream_id },
            Self::Regenerate { room_id, message_id } => {
                ClientEvent::Regenerate { room_id, message_id }
            },
        }
    }
}

/// Event from a connect task or socket reader.
enum Internal {
    Opened(ConnectedTransport),
    Failed(TransportError),
    Event(TransportEvent),
}

/// Transport of the current generation.
struct Live {
    to_server: mpsc::Sender<Outgoing>,
    reader: AbortHandle,
    socket: Option<AbortHandle>,
}

impl Live {
    fn stop(&self) {
        self.reader.abort();
        if let Some(socket) = &self.socket {
            socket.abort();
        }
    }
}

/// Cloneable handle to a running [`SessionActor`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Event(event) => f.debug_tuple("Event").field(event).finish(),
            Self::Send { room_id, .. } => f.debug_struct("Send").field("room_id", room_id).finish(),
            Self::Retry { id, .. } => f.debug_struct("Retry").field("id", id).finish(),
            Self::Subscribe { topic, .. } => {
                f.debug_struct("Subscribe").field("topic", topic).finish()
            },
            Self::Unsubscribe { id, .. } => f.debug_struct("Unsubscribe").field("id", id).finish(),
            Self::Health { .. } => f.write_str("Health"),
            Self::Dispose { .. } => f.write_str("Dispose"),
        }
    }
}

impl SessionHandle {
    /// Start connecting. No-op if already connecting or connected.
    pub async fn connect(&self) -> Result<(), SessionClosed> {
        self.event(LocalEvent::Connect).await
    }

    /// Disconnect and suppress auto-reconnect.
    pub async fn disconnect(&self) -> Result<(), SessionClosed> {
        self.event(LocalEvent::Disconnect).await
    }

    /// Manual retry after `Error`, or cycle a live connection.
    pub async fn reconnect(&self) -> Result<(), SessionClosed> {
        self.event(LocalEvent::Reconnect).await
    }

    /// Join a room; replayed on every connect.
    pub async fn join_room(&self, room_id: impl Into<RoomId>) -> Result<(), SessionClosed> {
        self.event(LocalEvent::JoinRoom(room_id.into())).await
    }

    /// Leave a room.
    pub async fn leave_room(&self, room_id: impl Into<RoomId>) -> Result<(), SessionClosed> {
        self.event(LocalEvent::LeaveRoom(room_id.into())).await
    }

    /// Report local typing activity.
    pub async fn set_typing(
        &self,
        room_id: impl Into<RoomId>,
        is_typing: bool,
    ) -> Result<(), SessionClosed> {
        self.event(LocalEvent::SetTyping { room_id: room_id.into(), is_typing }).await
    }

    /// Stop an in-flight generation.
    pub async fn cancel_generation(
        &self,
        stream_id: impl Into<StreamId>,
    ) -> Result<(), SessionClosed> {
        self.event(LocalEvent::CancelGeneration(stream_id.into())).await
    }

    /// Ask the server to regenerate an AI message.
    pub async fn regenerate(
        &self,
        room_id: impl Into<RoomId>,
        message_id: impl Into<MessageId>,
    ) -> Result<(), SessionClosed> {
        let event =
            LocalEvent::Regenerate { room_id: room_id.into(), message_id: message_id.into() };
        self.event(event).await
    }

    /// Send a chat message. Resolves as soon as the message is handed to
    /// the transport or queued.
    pub async fn send(
        &self,
        room_id: impl Into<RoomId>,
        content: impl Into<String>,
        options: SendOptions,
    ) -> Result<SendReceipt, SessionClosed> {
        let (reply, rx) = oneshot::channel();
        let room_id = room_id.into();
        self.request(Command::Send { room_id, content: content.into(), options, reply }, rx).await
    }

    /// Resend a timed-out message. `None` if `id` is not a failed message.
    pub async fn retry(&self, id: EnvelopeId) -> Result<Option<SendReceipt>, SessionClosed> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Retry { id, reply }, rx).await
    }

    /// Register a handler. It runs on the actor task and must not block.
    pub async fn subscribe<F>(
        &self,
        topic: Topic,
        handler: F,
    ) -> Result<SubscriptionId, SessionClosed>
    where
        F: FnMut(&Notification) -> HandlerResult + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Subscribe { topic, handler: Box::new(handler), reply }, rx).await
    }

    /// Remove a handler. Returns false if it was already removed.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<bool, SessionClosed> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Unsubscribe { id, reply }, rx).await
    }

    /// Diagnostics snapshot.
    pub async fn health(&self) -> Result<HealthSnapshot, SessionClosed> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Health { reply }, rx).await
    }

    /// Close the socket, cancel every timer, and stop the actor.
    ///
    /// Idempotent: disposing a stopped session succeeds.
    pub async fn dispose(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Dispose { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    async fn event(&self, event: LocalEvent) -> Result<(), SessionClosed> {
        self.commands.send(Command::Event(event)).await.map_err(|_| SessionClosed)
    }

    async fn request<T>(
        &self,
        command: Command,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, SessionClosed> {
        self.commands.send(command).await.map_err(|_| SessionClosed)?;
        rx.await.map_err(|_| SessionClosed)
    }
}

/// Owns one [`Client`] and drives it against a [`Connector`].
pub struct SessionActor<E: Environment, C: Connector> {
    client: Client<E>,
    dispatcher: EventDispatcher<Notification>,
    connector: Arc<C>,
    commands: mpsc::Receiver<Command>,
    internal_tx: mpsc::UnboundedSender<(u64, Internal)>,
    internal_rx: mpsc::UnboundedReceiver<(u64, Internal)>,
    /// Incremented for every connect attempt and every client close
    generation: u64,
    pending_open: Option<AbortHandle>,
    live: Option<Live>,
    tick_interval: Duration,
}

impl<E: Environment, C: Connector> SessionActor<E, C> {
    /// Create an actor and its handle. Run it with [`Self::run`].
    pub fn new(client: Client<E>, connector: C) -> (Self, SessionHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let tick_interval = client.config().tick_interval;

        let actor = Self {
            client,
            dispatcher: EventDispatcher::new(),
            connector: Arc::new(connector),
            commands,
            internal_tx,
            internal_rx,
            generation: 0,
            pending_open: None,
            live: None,
            tick_interval,
        };
        (actor, SessionHandle { commands: commands_tx })
    }

    /// Spawn the actor on the current tokio runtime.
    pub fn spawn(client: Client<E>, connector: C) -> SessionHandle {
        let (actor, handle) = Self::new(client, connector);
        tokio::spawn(actor.run());
        handle
    }

    /// Run until disposed or every handle is dropped.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Dispose { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    },
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.shutdown().await;
                        break;
                    },
                },
                Some((generation, internal)) = self.internal_rx.recv() => {
                    self.handle_internal(generation, internal).await;
                },
                _ = ticker.tick() => {
                    let now = self.client.env().now();
                    let actions = self.client.handle(ClientEvent::Tick { now });
                    self.execute(actions).await;
                },
            }
        }

        info!("session actor stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Event(event) => {
                let actions = self.client.handle(event.into_client_event());
                self.execute(actions).await;
            },
            Command::Send { room_id, content, options, reply } => {
                let (receipt, actions) = self.client.send_message(room_id, content, options);
                let _ = reply.send(receipt);
                self.execute(actions).await;
            },
            Command::Retry { id, reply } => match self.client.retry(&id) {
                Some((receipt, actions)) => {
                    let _ = reply.send(Some(receipt));
                    self.execute(actions).await;
                },
                None => {
                    let _ = reply.send(None);
                },
            },
            Command::Subscribe { topic, handler, reply } => {
                let _ = reply.send(self.dispatcher.subscribe(topic, handler));
            },
            Command::Unsubscribe { id, reply } => {
                let _ = reply.send(self.dispatcher.unsubscribe(id));
            },
            Command::Health { reply } => {
                let _ = reply.send(self.client.health());
            },
            // Handled by the run loop
            Command::Dispose { reply } => {
                let _ = reply.send(());
            },
        }
    }

    async fn handle_internal(&mut self, generation: u64, internal: Internal) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "dropping stale transport event");
            if let Internal::Opened(transport) = internal {
                transport.stop();
            }
            return;
        }

        let event = match internal {
            Internal::Opened(transport) => {
                self.pending_open = None;
                self.attach(transport);
                ClientEvent::TransportOpened
            },
            Internal::Failed(err) => {
                self.pending_open = None;
                warn!(error = %err, "transport failed to open");
                ClientEvent::TransportClosed(err.close_info())
            },
            Internal::Event(TransportEvent::Frame(text)) => ClientEvent::FrameReceived(text),
            Internal::Event(TransportEvent::Closed(close)) => {
                if let Some(live) = self.live.take() {
                    live.stop();
                }
                info!(close = %close, "transport closed");
                ClientEvent::TransportClosed(close)
            },
        };

        let actions = self.client.handle(event);
        self.execute(actions).await;
    }

    /// Execute client actions in order. Writes wait for room in the outbound
    /// channel. On the first failed write every remaining transmit is handed
    /// back to the client and the rest of the actions still run.
    async fn execute(&mut self, actions: Vec<ClientAction>) {
        let mut queue = VecDeque::from(actions);

        while let Some(action) = queue.pop_front() {
            match action {
                ClientAction::Open { url } => self.open(url),
                ClientAction::Close { code, reason } => self.close(code, reason),
                ClientAction::Transmit(message) => {
                    if let Err(message) = self.transmit(message).await {
                        // Stop this flush; unwritten messages go back in order
                        let (unsent, rest) = split_unsent(message, queue);
                        queue = rest;
                        queue.extend(self.client.handle(ClientEvent::TransmitFailed(unsent)));
                    }
                },
                ClientAction::Notify(notification) => {
                    let report = self.dispatcher.dispatch(&notification);
                    if report.failed > 0 {
                        let event = notification.kind();
                        debug!(event, failed = report.failed, "notification handlers failed");
                    }
                },
            }
        }
    }

    fn open(&mut self, url: Url) {
        self.drop_transport();
        self.generation += 1;

        let generation = self.generation;
        let connector = Arc::clone(&self.connector);
        let tx = self.internal_tx.clone();
        let task = tokio::spawn(async move {
            let internal = match connector.connect(url).await {
                Ok(transport) => Internal::Opened(transport),
                Err(err) => Internal::Failed(err),
            };
            let _ = tx.send((generation, internal));
        });
        self.pending_open = Some(task.abort_handle());
    }

    fn attach(&mut self, transport: ConnectedTransport) {
        let (to_server, mut from_server, socket) = transport.into_parts();
        let generation = self.generation;
        let tx = self.internal_tx.clone();

        let reader = tokio::spawn(async move {
            while let Some(event) = from_server.recv().await {
                let closed = matches!(event, TransportEvent::Closed(_));
                if tx.send((generation, Internal::Event(event))).is_err() || closed {
                    return;
                }
            }
            let close = CloseInfo::abnormal("transport ended without close");
            let _ = tx.send((generation, Internal::Event(TransportEvent::Closed(close))));
        });

        self.live = Some(Live { to_server, reader: reader.abort_handle(), socket });
    }

    /// Write one envelope, waiting while the socket applies backpressure.
    /// Returns the message if the socket is gone.
    async fn transmit(&mut self, message: QueuedMessage) -> Result<(), QueuedMessage> {
        let Some(to_server) = self.live.as_ref().map(|live| live.to_server.clone()) else {
            return Err(message);
        };

        let text = match lawbuddy_proto::encode(&message.envelope) {
            Ok(text) => text,
            Err(err) => {
                let kind = message.envelope.kind();
                warn!(error = %err, kind, "dropping unencodable envelope");
                return Ok(());
            },
        };

        match to_server.send(Outgoing::Text(text)).await {
            Ok(()) => Ok(()),
            Err(err) => {
                debug!(error = %err, kind = message.envelope.kind(), "transmit failed");
                Err(message)
            },
        }
    }

    /// Client-initiated close. The socket's own close event becomes stale.
    fn close(&mut self, code: u16, reason: String) {
        if let Some(live) = self.live.take() {
            let _ = live.to_server.try_send(Outgoing::Close { code, reason });
            live.reader.abort();
        }
        if let Some(pending) = self.pending_open.take() {
            pending.abort();
        }
        self.generation += 1;
    }

    fn drop_transport(&mut self) {
        if let Some(live) = self.live.take() {
            live.stop();
        }
        if let Some(pending) = self.pending_open.take() {
            pending.abort();
        }
    }

    async fn shutdown(&mut self) {
        let actions = self.client.handle(ClientEvent::Disconnect);
        self.execute(actions).await;
        self.drop_transport();
    }
}

/// Separate the failed message and every queued transmit from the other
/// pending actions, preserving order in both.
fn split_unsent(
    failed: QueuedMessage,
    pending: VecDeque<ClientAction>,
) -> (Vec<QueuedMessage>, VecDeque<ClientAction>) {
    let mut unsent = vec![failed];
    let mut rest = VecDeque::new();
    for action in pending {
        match action {
            ClientAction::Transmit(message) => unsent.push(message),
            other => rest.push_back(other),
        }
    }
    (unsent, rest)
}
