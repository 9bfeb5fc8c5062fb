//! Core
//!
//! Sans-IO state machines for one LawBuddy chat session. Every component takes
//! time as input and returns values (actions, events, outcomes) for the caller
//! to execute; none performs I/O, spawns tasks, or holds a clock.
//!
//! # Components
//!
//! - [`connection::Connection`]: connection lifecycle, backoff, heartbeat
//! - [`delivery::DeliveryTracker`]: offline queue and acknowledgment tracking
//! - [`stream::StreamAssembler`]: incremental AI response assembly
//! - [`presence::PresenceTracker`] / [`presence::LocalTyping`]: presence and
//!   typing indicators
//! - [`dispatcher::EventDispatcher`]: typed publish/subscribe with handler
//!   isolation
//! - [`env::Environment`]: time and randomness abstraction
//! - [`error::ClientError`]: error taxonomy

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod connection;
pub mod delivery;
pub mod dispatcher;
pub mod env;
pub mod error;
pub mod presence;
pub mod stream;

pub use connection::{Connection, ConnectionAction, ConnectionConfig, ConnectionState};
pub use delivery::{Delivered, DeliveryConfig, DeliveryTracker, QueuedMessage, SendOutcome};
pub use dispatcher::{EventDispatcher, HandlerResult, Routable, SubscriptionId, Topic};
pub use env::Environment;
pub use error::ClientError;
pub use presence::{LocalTyping, PresenceConfig, PresenceStatus, PresenceTracker, PresenceUpdate};
pub use stream::{StreamAssembler, StreamEvent, StreamEventKind, StreamSession, StreamStatus};
