//! Synchronous simulation driver.
//!
//! `SimDriver` executes [`ClientAction`]s the same way the
//! [`lawbuddy_client::SessionActor`] does, but against a scripted socket and a
//! virtual clock: tests decide when an open succeeds, which frames the server
//! sends, and when the socket drops. Everything the client writes is recorded
//! as JSON for assertions.

use std::{collections::VecDeque, time::Duration};

use lawbuddy_client::{
    Client, ClientAction, ClientConfig, ClientEvent, CloseInfo, ConnectionState, Environment,
    Notification, QueuedMessage, SendOptions, SendReceipt, StaticCredential,
};
use serde_json::Value;
use url::Url;

use crate::{
    frames,
    invariants::{InvariantRegistry, SessionSnapshot},
    sim_env::{SimEnv, SimInstant},
};

/// Token used by [`SimDriver::new`].
pub const SIM_TOKEN: &str = "sim-token";

/// Scripted socket state.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Socket {
    Closed,
    Opening(Url),
    Open,
}

/// Deterministic driver for one [`Client`].
pub struct SimDriver {
    client: Client<SimEnv>,
    env: SimEnv,
    socket: Socket,
    /// Writes that succeed before the socket starts refusing them
    write_budget: Option<usize>,
    opens: Vec<Url>,
    closes: Vec<(u16, String)>,
    sent: Vec<Value>,
    notifications: Vec<Notification>,
    invariants: Option<InvariantRegistry>,
}

impl SimDriver {
    /// Driver with seed 0, a static credential and `config`.
    pub fn new(config: ClientConfig) -> Self {
        let env = SimEnv::new();
        let client = Client::new(env.clone(), config, StaticCredential::new(SIM_TOKEN));
        Self::with_client(client)
    }

    /// Drive an existing client.
    pub fn with_client(client: Client<SimEnv>) -> Self {
        Self {
            env: client.env().clone(),
            client,
            socket: Socket::Closed,
            write_budget: None,
            opens: Vec::new(),
            closes: Vec::new(),
            sent: Vec::new(),
            notifications: Vec::new(),
            invariants: None,
        }
    }

    /// Check `registry` after every step.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = Some(registry);
        self
    }

    /// Client under test.
    pub fn client(&self) -> &Client<SimEnv> {
        &self.client
    }

    /// Shared virtual environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Connection state of the client.
    pub fn state(&self) -> ConnectionState {
        self.client.state()
    }

    /// Whether an open request is waiting for [`Self::accept`] or
    /// [`Self::refuse`].
    pub fn open_pending(&self) -> bool {
        matches!(self.socket, Socket::Opening(_))
    }

    /// Whether the scripted socket is open.
    pub fn socket_open(&self) -> bool {
        self.socket == Socket::Open
    }

    /// Feed one event and execute the resulting actions.
    pub fn event(&mut self, event: ClientEvent<SimInstant>) {
        let actions = self.client.handle(event);
        self.execute(actions);
    }

    /// Send a chat message with default options.
    pub fn send(&mut self, room_id: &str, content: &str) -> SendReceipt {
        self.send_with(room_id, content, SendOptions::default())
    }

    /// Send a chat message.
    pub fn send_with(&mut self, room_id: &str, content: &str, options: SendOptions) -> SendReceipt {
        let (receipt, actions) = self.client.send_message(room_id, content, options);
        self.execute(actions);
        receipt
    }

    /// Retry a timed-out message.
    pub fn retry(&mut self, receipt: &SendReceipt) -> Option<SendReceipt> {
        let (receipt, actions) = self.client.retry(receipt.id())?;
        self.execute(actions);
        Some(receipt)
    }

    /// Request a connection.
    pub fn connect(&mut self) {
        self.event(ClientEvent::Connect);
    }

    /// Complete the pending open. Returns `false` if none was pending.
    pub fn accept(&mut self) -> bool {
        if !self.open_pending() {
            return false;
        }
        self.socket = Socket::Open;
        self.event(ClientEvent::TransportOpened);
        true
    }

    /// Fail the pending open with `close`. Returns `false` if none was
    /// pending.
    pub fn refuse(&mut self, close: CloseInfo) -> bool {
        if !self.open_pending() {
            return false;
        }
        self.socket = Socket::Closed;
        self.event(ClientEvent::TransportClosed(close));
        true
    }

    /// Connect, open the socket and deliver `connection_established`.
    pub fn connect_and_open(&mut self) {
        self.connect();
        self.accept();
        self.server_frame(&frames::connection_established("conn-1", "user-self"));
    }

    /// Deliver a server frame. Frames only arrive on an open socket.
    pub fn server_frame(&mut self, text: &str) {
        if self.socket_open() {
            self.event(ClientEvent::FrameReceived(text.to_string()));
        }
    }

    /// The server closes the socket with `close`.
    pub fn server_close(&mut self, close: CloseInfo) {
        if self.socket_open() {
            self.socket = Socket::Closed;
            self.event(ClientEvent::TransportClosed(close));
        }
    }

    /// The socket drops without a close frame.
    pub fn drop_transport(&mut self) {
        self.server_close(CloseInfo::abnormal("network lost"));
    }

    /// Allow `writes` more successful writes, then refuse every write.
    /// `None` removes the limit.
    pub fn limit_writes(&mut self, writes: Option<usize>) {
        self.write_budget = writes;
    }

    /// Advance virtual time in tick-sized steps, ticking the client after
    /// each.
    pub fn advance(&mut self, duration: Duration) {
        let step = self.client.config().tick_interval;
        let mut remaining = duration;
        while !remaining.is_zero() {
            let delta = remaining.min(step);
            remaining -= delta;
            self.env.advance(delta);
            let now = self.env.now();
            self.event(ClientEvent::Tick { now });
        }
    }

    /// Advance until `done` holds or `limit` elapses. Returns whether `done`
    /// held.
    pub fn advance_until(&mut self, limit: Duration, done: impl Fn(&Self) -> bool) -> bool {
        let step = self.client.config().tick_interval;
        let mut elapsed = Duration::ZERO;
        while elapsed < limit {
            if done(self) {
                return true;
            }
            self.advance(step);
            elapsed += step;
        }
        done(self)
    }

    /// URLs of every open request so far.
    pub fn opens(&self) -> &[Url] {
        &self.opens
    }

    /// Client-initiated closes so far.
    pub fn closes(&self) -> &[(u16, String)] {
        &self.closes
    }

    /// Drain every frame written since the last call.
    pub fn take_sent(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.sent)
    }

    /// Drain written frames of one `type`, keeping the rest.
    pub fn take_sent_of(&mut self, kind: &str) -> Vec<Value> {
        let (matching, rest): (Vec<Value>, Vec<Value>) = std::mem::take(&mut self.sent)
            .into_iter()
            .partition(|frame| frame["type"] == kind);
        self.sent = rest;
        matching
    }

    /// Drain every notification since the last call.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Execute client actions in order, stopping a flush on the first
    /// refused write.
    fn execute(&mut self, actions: Vec<ClientAction>) {
        let mut queue = VecDeque::from(actions);

        while let Some(action) = queue.pop_front() {
            match action {
                ClientAction::Open { url } => {
                    self.opens.push(url.clone());
                    self.socket = Socket::Opening(url);
                },
                ClientAction::Close { code, reason } => {
                    self.closes.push((code, reason));
                    self.socket = Socket::Closed;
                },
                ClientAction::Transmit(message) => {
                    if let Err(message) = self.write(message) {
                        let mut unsent = vec![message];
                        let mut rest = VecDeque::new();
                        for action in queue {
                            match action {
                                ClientAction::Transmit(message) => unsent.push(message),
                                other => rest.push_back(other),
                            }
                        }
                        queue = rest;
                        queue.extend(self.client.handle(ClientEvent::TransmitFailed(unsent)));
                    }
                },
                ClientAction::Notify(notification) => self.notifications.push(notification),
            }
        }

        if let Some(registry) = &self.invariants {
            let snapshot = SessionSnapshot::from_client(&self.client);
            registry.assert_all(&snapshot, &format!("at {:?}", self.env.elapsed()));
        }
    }

    fn write(&mut self, message: QueuedMessage) -> Result<(), QueuedMessage> {
        if !self.socket_open() {
            return Err(message);
        }
        match &mut self.write_budget {
            Some(0) => return Err(message),
            Some(budget) => *budget -= 1,
            None => {},
        }

        let text = lawbuddy_proto::encode(&message.envelope).map_err(|_| message.clone())?;
        let value = serde_json::from_str(&text).map_err(|_| message)?;
        self.sent.push(value);
        Ok(())
    }
}

impl std::fmt::Debug for SimDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimDriver")
            .field("client", &self.client)
            .field("socket", &self.socket)
            .field("elapsed", &self.env.elapsed())
            .finish_non_exhaustive()
    }
}
