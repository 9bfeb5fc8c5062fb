//! Client configuration.

use std::time::Duration;

use lawbuddy_core::{ConnectionConfig, DeliveryConfig, PresenceConfig};
use lawbuddy_proto::RoomId;
use thiserror::Error;
use url::Url;

/// Default WebSocket endpoint of a local LawBuddy backend.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8000/ws/chat";

/// Interval at which the session actor feeds `Tick` into the client.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Connection-level errors kept for diagnostics.
pub const DEFAULT_RECENT_ERROR_LIMIT: usize = 20;

/// Invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Server URL did not parse.
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Server URL is not `ws://` or `wss://`.
    #[error("unsupported url scheme `{0}`, expected ws or wss")]
    UnsupportedScheme(String),
}

/// Configuration for one client instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint, without credential query parameters
    pub server_url: Url,
    /// Room joined at connect time via the `chat_id` query parameter
    pub initial_room: Option<RoomId>,
    /// Lifecycle, backoff, and heartbeat
    pub connection: ConnectionConfig,
    /// Ack timeout and offline queue bound
    pub delivery: DeliveryConfig,
    /// Typing expiry and debounce
    pub presence: PresenceConfig,
    /// Timer resolution of the session actor
    pub tick_interval: Duration,
    /// Bound on the recent error log
    pub recent_error_limit: usize,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the endpoint.
    pub fn new(server_url: Url) -> Self {
        Self {
            server_url,
            initial_room: None,
            connection: ConnectionConfig::default(),
            delivery: DeliveryConfig::default(),
            presence: PresenceConfig::default(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            recent_error_limit: DEFAULT_RECENT_ERROR_LIMIT,
        }
    }

    /// Parse and validate a `ws://` or `wss://` endpoint.
    pub fn from_url(server_url: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(server_url)?;
        match url.scheme() {
            "ws" | "wss" => Ok(Self::new(url)),
            other => Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Defaults against [`DEFAULT_SERVER_URL`].
    pub fn local() -> Result<Self, ConfigError> {
        Self::from_url(DEFAULT_SERVER_URL)
    }

    /// Join `room` as part of the connect handshake.
    #[must_use]
    pub fn with_initial_room(mut self, room: impl Into<RoomId>) -> Self {
        self.initial_room = Some(room.into());
        self
    }

    /// Endpoint for one connect attempt: `token` and optional `chat_id`
    /// appended as query parameters.
    pub fn connect_url(&self, token: &str) -> Url {
        let mut url = self.server_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("token", token);
            if let Some(room) = &self.initial_room {
                query.append_pair("chat_id", room);
            }
        }
        url
    }
}
