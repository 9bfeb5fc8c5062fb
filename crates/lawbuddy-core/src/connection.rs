//! Connection lifecycle state machine.
//!
//! Manages connect, reconnect backoff, heartbeats, and manual shutdown.
//! Uses the action pattern: methods take time as input and return actions for
//! the driver to execute. This keeps the state machine pure (no I/O) and makes
//! timer behavior testable without a runtime.
//!
//! # State Machine
//!
//! ```text
//!                connect()              transport opened
//! ┌──────────────┐ ───────> ┌────────────┐ ───────> ┌───────────┐
//! │ Disconnected │          │ Connecting │          │ Connected │
//! └──────────────┘ <─┐      └────────────┘ <─┐      └───────────┘
//!        ^           │         │  ^          │timer       │
//!        │ disconnect()        │  │    ┌──────────────┐   │ closed
//!        │ (any state)         │  └────│ Reconnecting │<──┤ (attempts < max)
//!        │                     │ closed└──────────────┘   │
//!        │                     ↓ (attempts ≥ max, fatal auth)
//!        │                  ┌───────┐                     │
//!        └──────────────────│ Error │<────────────────────┘
//!                           └───────┘
//! ```

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use lawbuddy_proto::CloseInfo;

use crate::{env::Environment, error::ClientError};

/// Maximum automatic reconnect attempts before entering `Error`.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Delay before the first reconnect attempt. Doubles per attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on the backoff delay, before jitter.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Upper bound (exclusive) on the random jitter added to each backoff delay.
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_secs(1);

/// Interval at which `ping` is sent while connected.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Time allowed for the transport to open.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Actions returned by the connection state machine.
///
/// The driver executes these in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a new transport
    Open {
        /// Reconnect attempt number; 0 for a manual connect
        attempt: u32,
    },

    /// Close the current transport, if any
    Close,

    /// Send a `ping` envelope
    SendPing,

    /// Transport is open: replay the offline backlog before new traffic
    FlushQueue,

    /// Fail every open stream with "connection lost"
    AbortStreams,

    /// Connection state changed
    StateChanged(ConnectionState),

    /// Connection-level error for the `error` channel
    Error(ClientError),
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No transport, no reconnect scheduled
    Disconnected,
    /// Transport open in progress
    Connecting,
    /// Transport open; traffic flows
    Connected,
    /// Waiting for the backoff timer
    Reconnecting,
    /// Retries exhausted or credential rejected; manual retry only
    Error,
}

impl ConnectionState {
    /// Lowercase name for logs and diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Automatic reconnect attempts before giving up
    pub max_reconnect_attempts: u32,
    /// First backoff delay
    pub base_delay: Duration,
    /// Backoff cap (before jitter)
    pub max_delay: Duration,
    /// Jitter upper bound (exclusive)
    pub max_jitter: Duration,
    /// Ping interval while connected
    pub heartbeat_interval: Duration,
    /// Time allowed for a transport to open
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Backoff delay before reconnect attempt `attempt` (0-based), without
/// jitter: `min(base * 2^attempt, max)`.
pub fn backoff_delay(attempt: u32, config: &ConnectionConfig) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| config.base_delay.checked_mul(factor))
        .map_or(config.max_delay, |delay| delay.min(config.max_delay))
}

/// Connection state machine
///
/// Owns connection state and reconnect bookkeeping for a single client.
///
/// This is a pure state machine - no I/O, no Environment storage.
/// Time is passed as parameters to methods that need it.
#[derive(Debug, Clone)]
pub struct Connection<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    state: ConnectionState,
    config: ConnectionConfig,
    /// Reconnect attempts since the last successful open
    attempts: u32,
    /// When the in-flight open started
    connecting_since: Option<I>,
    /// Backoff timer: (scheduled at, delay)
    reconnect_timer: Option<(I, Duration)>,
    /// Last heartbeat tick; `None` outside `Connected`
    last_heartbeat: Option<I>,
    /// Outstanding ping awaiting a pong
    ping_sent_at: Option<I>,
    last_round_trip: Option<Duration>,
    last_connected: Option<DateTime<Utc>>,
    last_error: Option<ClientError>,
    /// Server-assigned id from `connection_established`
    connection_id: Option<String>,
}

impl<I> Connection<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a new connection in [`ConnectionState::Disconnected`] state
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            config,
            attempts: 0,
            connecting_since: None,
            reconnect_timer: None,
            last_heartbeat: None,
            ping_sent_at: None,
            last_round_trip: None,
            last_connected: None,
            last_error: None,
            connection_id: None,
        }
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether application traffic can be transmitted right now.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Reconnect attempts since the last successful open.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Wall-clock time of the last successful open.
    #[must_use]
    pub fn last_connected(&self) -> Option<DateTime<Utc>> {
        self.last_connected
    }

    /// Most recent connection-level error. Cleared on successful open.
    #[must_use]
    pub fn last_error(&self) -> Option<&ClientError> {
        self.last_error.as_ref()
    }

    /// Server-assigned connection id. `None` until `connection_established`.
    #[must_use]
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Round trip of the most recent ping/pong exchange.
    #[must_use]
    pub fn last_round_trip(&self) -> Option<Duration> {
        self.last_round_trip
    }

    /// Record the server-assigned connection id.
    pub fn set_connection_id(&mut self, connection_id: String) {
        self.connection_id = Some(connection_id);
    }

    /// Start connecting (manual).
    ///
    /// No-op when already `Connecting` or `Connected`. From `Error` or
    /// `Disconnected` the attempt counter starts over.
    pub fn connect(&mut self, now: I) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => return Vec::new(),
            ConnectionState::Disconnected | ConnectionState::Error => self.attempts = 0,
            ConnectionState::Reconnecting => {},
        }

        self.reconnect_timer = None;
        self.begin_open(now, 0)
    }

    /// Transport finished opening.
    ///
    /// Ignored unless `Connecting` (a late open after `disconnect()` is
    /// stale).
    pub fn transport_opened(&mut self, now: I, wall: DateTime<Utc>) -> Vec<ConnectionAction> {
        if self.state != ConnectionState::Connecting {
            return Vec::new();
        }

        self.state = ConnectionState::Connected;
        self.attempts = 0;
        self.connecting_since = None;
        self.last_heartbeat = Some(now);
        self.ping_sent_at = None;
        self.last_connected = Some(wall);
        self.last_error = None;

        vec![ConnectionAction::FlushQueue, ConnectionAction::StateChanged(self.state)]
    }

    /// Transport closed or failed to open.
    ///
    /// Ignored unless `Connecting` or `Connected`: after a manual
    /// `disconnect()` the close is expected, and in `Reconnecting`/`Error` the
    /// transport is already gone.
    pub fn transport_closed<E>(
        &mut self,
        close: &CloseInfo,
        env: &E,
        now: I,
    ) -> Vec<ConnectionAction>
    where
        E: Environment<Instant = I>,
    {
        if !matches!(self.state, ConnectionState::Connecting | ConnectionState::Connected) {
            return Vec::new();
        }

        self.clear_transport();
        let mut actions = vec![ConnectionAction::AbortStreams];

        let error = if close.is_fatal_auth() {
            self.state = ConnectionState::Error;
            ClientError::FatalAuth(close.reason.clone())
        } else if self.attempts < self.config.max_reconnect_attempts {
            let delay = backoff_delay(self.attempts, &self.config) + self.jitter(env.random_u64());
            self.reconnect_timer = Some((now, delay));
            self.state = ConnectionState::Reconnecting;
            ClientError::TransientConnection(close.to_string())
        } else {
            self.state = ConnectionState::Error;
            ClientError::TransientConnection(format!(
                "giving up after {} attempts ({close})",
                self.attempts
            ))
        };

        self.last_error = Some(error.clone());
        actions.push(ConnectionAction::Error(error));
        actions.push(ConnectionAction::StateChanged(self.state));
        actions
    }

    /// Process periodic maintenance (backoff timer, connect timeout,
    /// heartbeat).
    pub fn tick<E>(&mut self, env: &E, now: I) -> Vec<ConnectionAction>
    where
        E: Environment<Instant = I>,
    {
        match self.state {
            ConnectionState::Reconnecting => {
                let Some((scheduled, delay)) = self.reconnect_timer else {
                    return Vec::new();
                };
                if now - scheduled < delay {
                    return Vec::new();
                }

                self.reconnect_timer = None;
                self.attempts += 1;
                debug_assert!(self.attempts <= self.config.max_reconnect_attempts);
                self.begin_open(now, self.attempts)
            },

            ConnectionState::Connecting => {
                let Some(since) = self.connecting_since else {
                    return Vec::new();
                };
                let elapsed = now - since;
                if elapsed < self.config.connect_timeout {
                    return Vec::new();
                }

                let close = CloseInfo::abnormal(format!("connect timeout after {elapsed:?}"));
                let mut actions = vec![ConnectionAction::Close];
                actions.extend(self.transport_closed(&close, env, now));
                actions
            },

            ConnectionState::Connected => {
                let due = match self.last_heartbeat {
                    None => true,
                    Some(last) => now - last >= self.config.heartbeat_interval,
                };

                if due {
                    self.last_heartbeat = Some(now);
                    self.ping_sent_at.get_or_insert(now);
                    vec![ConnectionAction::SendPing]
                } else {
                    Vec::new()
                }
            },

            ConnectionState::Disconnected | ConnectionState::Error => Vec::new(),
        }
    }

    /// Manual disconnect from any state.
    ///
    /// Suppresses auto-reconnect and cancels every timer. No-op when already
    /// `Disconnected`.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        if self.state == ConnectionState::Disconnected {
            return Vec::new();
        }

        self.state = ConnectionState::Disconnected;
        self.attempts = 0;
        self.reconnect_timer = None;
        self.clear_transport();

        vec![
            ConnectionAction::Close,
            ConnectionAction::AbortStreams,
            ConnectionAction::StateChanged(self.state),
        ]
    }

    /// Manual retry: reset attempts, clear the error, and connect.
    ///
    /// From `Connected`/`Connecting` the current transport is closed first.
    pub fn reconnect(&mut self, now: I) -> Vec<ConnectionAction> {
        let mut actions =
            if matches!(self.state, ConnectionState::Connected | ConnectionState::Connecting) {
                self.disconnect()
            } else {
                Vec::new()
            };

        self.attempts = 0;
        self.last_error = None;
        actions.extend(self.connect(now));
        actions
    }

    /// Pong received. Observational: records the ping round trip.
    ///
    /// Liveness is not enforced from pongs.
    pub fn pong_received(&mut self, now: I) -> Option<Duration> {
        let sent = self.ping_sent_at.take()?;
        let rtt = now - sent;
        self.last_round_trip = Some(rtt);
        Some(rtt)
    }

    fn begin_open(&mut self, now: I, attempt: u32) -> Vec<ConnectionAction> {
        self.state = ConnectionState::Connecting;
        self.connecting_since = Some(now);

        vec![ConnectionAction::StateChanged(self.state), ConnectionAction::Open { attempt }]
    }

    fn clear_transport(&mut self) {
        self.connecting_since = None;
        self.last_heartbeat = None;
        self.ping_sent_at = None;
        self.connection_id = None;
    }

    /// Jitter in `[0, max_jitter)` at millisecond resolution.
    fn jitter(&self, random: u64) -> Duration {
        let bound = self.config.max_jitter.as_millis() as u64;
        if bound == 0 { Duration::ZERO } else { Duration::from_millis(random % bound) }
    }
}

#[cfg(test)]
mod tests {
    use lawbuddy_proto::{CLOSE_AUTH_FAILED, CLOSE_INTERNAL_ERROR};

    use super::*;

    /// Virtual time: offsets from an arbitrary origin.
    type T = Duration;

    #[derive(Clone)]
    struct TestEnv {
        random: u64,
    }

    impl Environment for TestEnv {
        type Instant = Duration;

        fn now(&self) -> Duration {
            Duration::ZERO
        }

        fn wall_clock(&self) -> DateTime<Utc> {
            DateTime::<Utc>::UNIX_EPOCH
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            let bytes = self.random.to_be_bytes();
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = bytes[i % 8];
            }
        }
    }

    fn secs(s: u64) -> T {
        Duration::from_secs(s)
    }

    fn no_jitter() -> TestEnv {
        TestEnv { random: 0 }
    }

    fn connected() -> Connection<T> {
        let mut conn = Connection::new(ConnectionConfig::default());
        conn.connect(secs(0));
        conn.transport_opened(secs(0), DateTime::<Utc>::UNIX_EPOCH);
        conn
    }

    fn drop_close() -> CloseInfo {
        CloseInfo::new(CLOSE_INTERNAL_ERROR, "Internal server error")
    }

    #[test]
    fn connection_lifecycle() {
        let mut conn: Connection<T> = Connection::new(ConnectionConfig::default());
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        let actions = conn.connect(secs(0));
        assert_eq!(actions, vec![
            ConnectionAction::StateChanged(ConnectionState::Connecting),
            ConnectionAction::Open { attempt: 0 },
        ]);

        let actions = conn.transport_opened(secs(1), DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(actions, vec![
            ConnectionAction::FlushQueue,
            ConnectionAction::StateChanged(ConnectionState::Connected),
        ]);
        assert!(conn.is_connected());
        assert_eq!(conn.last_connected(), Some(DateTime::<Utc>::UNIX_EPOCH));

        let actions = conn.disconnect();
        assert_eq!(actions, vec![
            ConnectionAction::Close,
            ConnectionAction::AbortStreams,
            ConnectionAction::StateChanged(ConnectionState::Disconnected),
        ]);
    }

    #[test]
    fn connect_is_idempotent() {
        let mut conn = connected();
        assert!(conn.connect(secs(5)).is_empty());
        assert_eq!(conn.state(), ConnectionState::Connected);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = ConnectionConfig::default();
        let delays: Vec<_> = (0..7).map(|a| backoff_delay(a, &config).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
        assert_eq!(backoff_delay(u32::MAX, &config), config.max_delay);
    }

    #[test]
    fn drop_schedules_reconnect_with_jitter() {
        let mut conn = connected();
        let env = TestEnv { random: 250 };

        let actions = conn.transport_closed(&drop_close(), &env, secs(10));
        assert_eq!(conn.state(), ConnectionState::Reconnecting);
        assert_eq!(actions[0], ConnectionAction::AbortStreams);
        assert!(matches!(actions[1], ConnectionAction::Error(ClientError::TransientConnection(_))));

        // 1s base + 250ms jitter
        assert!(conn.tick(&env, secs(11)).is_empty());
        let actions = conn.tick(&env, secs(11) + Duration::from_millis(250));
        assert_eq!(actions, vec![
            ConnectionAction::StateChanged(ConnectionState::Connecting),
            ConnectionAction::Open { attempt: 1 },
        ]);
        assert_eq!(conn.attempts(), 1);
    }

    #[test]
    fn fatal_auth_goes_straight_to_error() {
        let mut conn: Connection<T> = Connection::new(ConnectionConfig::default());
        conn.connect(secs(0));
        conn.transport_opened(secs(0), DateTime::<Utc>::UNIX_EPOCH);

        let close = CloseInfo::new(CLOSE_AUTH_FAILED, "Authentication failed");
        let actions = conn.transport_closed(&close, &no_jitter(), secs(1));

        assert_eq!(conn.state(), ConnectionState::Error);
        assert_eq!(conn.attempts(), 0);
        assert!(actions.contains(&ConnectionAction::Error(ClientError::FatalAuth(
            "Authentication failed".into()
        ))));

        // No timer was scheduled
        for s in 2..120 {
            assert!(conn.tick(&no_jitter(), secs(s)).is_empty());
        }
    }

    #[test]
    fn attempts_stop_at_limit() {
        let config = ConnectionConfig { max_reconnect_attempts: 3, ..Default::default() };
        let mut conn: Connection<T> = Connection::new(config);
        let env = no_jitter();
        let mut now = secs(0);

        conn.connect(now);
        let mut opens = 0;
        for _ in 0..10 {
            conn.transport_closed(&drop_close(), &env, now);
            now += secs(60);
            if conn.tick(&env, now).iter().any(|a| matches!(a, ConnectionAction::Open { .. })) {
                opens += 1;
            }
        }

        assert_eq!(opens, 3);
        assert_eq!(conn.attempts(), 3);
        assert_eq!(conn.state(), ConnectionState::Error);
        assert!(conn.last_error().is_some_and(ClientError::is_retryable));
    }

    #[test]
    fn successful_open_resets_attempts() {
        let mut conn = connected();
        let env = no_jitter();
        conn.transport_closed(&drop_close(), &env, secs(0));
        conn.tick(&env, secs(5));
        assert_eq!(conn.attempts(), 1);

        conn.transport_opened(secs(5), DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(conn.attempts(), 0);
        assert!(conn.last_error().is_none());
    }

    #[test]
    fn connect_timeout_counts_as_transient_close() {
        let mut conn: Connection<T> = Connection::new(ConnectionConfig::default());
        let env = no_jitter();
        conn.connect(secs(0));

        assert!(conn.tick(&env, secs(9)).is_empty());
        let actions = conn.tick(&env, secs(10));
        assert_eq!(actions[0], ConnectionAction::Close);
        assert_eq!(conn.state(), ConnectionState::Reconnecting);
    }

    #[test]
    fn heartbeat_only_while_connected() {
        let mut conn = connected();
        let env = no_jitter();

        assert!(conn.tick(&env, secs(29)).is_empty());
        assert_eq!(conn.tick(&env, secs(30)), vec![ConnectionAction::SendPing]);
        assert!(conn.tick(&env, secs(31)).is_empty());
        assert_eq!(conn.pong_received(secs(31)), Some(secs(1)));
        assert_eq!(conn.last_round_trip(), Some(secs(1)));

        conn.disconnect();
        assert!(conn.tick(&env, secs(120)).is_empty());
    }

    #[test]
    fn unsolicited_pong_is_ignored() {
        let mut conn = connected();
        assert_eq!(conn.pong_received(secs(3)), None);
    }

    #[test]
    fn close_after_manual_disconnect_is_ignored() {
        let mut conn = connected();
        conn.disconnect();
        assert!(conn.transport_closed(&drop_close(), &no_jitter(), secs(1)).is_empty());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.tick(&no_jitter(), secs(100)).is_empty());
    }

    #[test]
    fn disconnect_cancels_pending_reconnect() {
        let mut conn = connected();
        let env = no_jitter();
        conn.transport_closed(&drop_close(), &env, secs(0));
        conn.disconnect();
        assert!(conn.tick(&env, secs(60)).is_empty());
    }

    #[test]
    fn manual_reconnect_recovers_from_error() {
        let mut conn = connected();
        let close = CloseInfo::new(CLOSE_AUTH_FAILED, "Authentication failed");
        conn.transport_closed(&close, &no_jitter(), secs(0));
        assert_eq!(conn.state(), ConnectionState::Error);

        let actions = conn.reconnect(secs(1));
        assert!(actions.contains(&ConnectionAction::Open { attempt: 0 }));
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(conn.last_error().is_none());
    }

    #[test]
    fn reconnect_while_connected_cycles_transport() {
        let mut conn = connected();
        let actions = conn.reconnect(secs(1));
        assert_eq!(actions.first(), Some(&ConnectionAction::Close));
        assert_eq!(actions.last(), Some(&ConnectionAction::Open { attempt: 0 }));
    }

    #[test]
    fn connection_id_cleared_on_close() {
        let mut conn = connected();
        conn.set_connection_id("c-1".into());
        assert_eq!(conn.connection_id(), Some("c-1"));
        conn.transport_closed(&drop_close(), &no_jitter(), secs(1));
        assert_eq!(conn.connection_id(), None);
    }
}
