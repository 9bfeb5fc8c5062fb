//! Client
//!
//! Session client for the LawBuddy real-time chat protocol. Owns connection
//! lifecycle, reliable outbound delivery, AI stream assembly, and typing and
//! presence state for one authenticated session.
//!
//! # Architecture
//!
//! The [`Client`] follows the Sans-IO and action-based patterns of
//! [`lawbuddy_core`]. It receives events ([`ClientEvent`]), processes them
//! through pure state machine logic, and returns actions ([`ClientAction`])
//! for the caller to execute.
//!
//! [`SessionActor`] is that caller: a single tokio task that owns the
//! `Client`, the event dispatcher, and the socket, reached through a
//! cloneable [`SessionHandle`].
//!
//! # Components
//!
//! - [`Client`]: composition of the core state machines
//! - [`ClientConfig`]: endpoint, timers, and bounds
//! - [`SessionActor`] / [`SessionHandle`]: single-owner runtime
//! - [`Connector`]: transport seam
//! - [`SystemEnv`]: production environment
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides
//! [`websocket::WebSocketConnector`], backed by `tokio-tungstenite`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod collaborators;
mod config;
mod event;
mod session;
mod system_env;
mod transport;

#[cfg(feature = "transport")]
pub mod websocket;

pub use client::Client;
pub use collaborators::{CredentialProvider, ErrorSink, StaticCredential, TracingErrorSink};
pub use config::{
    ClientConfig, ConfigError, DEFAULT_RECENT_ERROR_LIMIT, DEFAULT_SERVER_URL,
    DEFAULT_TICK_INTERVAL,
};
pub use event::{
    ClientAction, ClientEvent, HealthSnapshot, Notification, SendOptions, SendReceipt,
};
pub use lawbuddy_core::{
    ClientError, ConnectionState, Environment, HandlerResult, PresenceStatus, QueuedMessage,
    Routable, SubscriptionId, Topic,
};
pub use lawbuddy_proto::{CloseInfo, EnvelopeId, MessageId, RoomId, StreamId, UserId};
pub use session::{SessionActor, SessionClosed, SessionHandle};
pub use system_env::SystemEnv;
pub use transport::{ConnectedTransport, Connector, Outgoing, TransportError, TransportEvent};
