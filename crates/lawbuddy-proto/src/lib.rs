//! Wire codec for the LawBuddy session protocol.
//!
//! Every frame on the socket is one JSON object tagged with a `type` string.
//! Outbound frames are built from the typed [`Envelope`]; inbound frames are
//! decoded into [`Inbound`] by [`decode`]. The codec is pure and stateless: it
//! never inspects connection state and never panics on hostile input.
//!
//! # Components
//!
//! - [`Envelope`] / [`Outbound`]: client-to-server frames
//! - [`Inbound`]: server-to-client frames
//! - [`CloseInfo`]: socket close code and reason, with the fatal-auth signal
//! - [`ProtocolError`]: malformed or unroutable frames

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod close;
mod codec;
mod envelope;
mod errors;
mod inbound;

pub use close::{CLOSE_AUTH_FAILED, CLOSE_INTERNAL_ERROR, CLOSE_NORMAL, CloseInfo};
pub use codec::{decode, encode};
pub use envelope::{Envelope, EnvelopeId, MessageRole, Outbound, TypingMetadata};
pub use errors::{ProtocolError, Result};
pub use inbound::Inbound;

/// Chat session (room) identifier assigned by the server.
pub type RoomId = String;

/// User identifier assigned by the server.
pub type UserId = String;

/// Persisted chat message identifier assigned by the server.
pub type MessageId = String;

/// Identifier of one incremental AI generation.
pub type StreamId = String;
