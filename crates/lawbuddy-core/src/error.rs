//! Error taxonomy for the session client.
//!
//! Errors are values: state machines return them inside actions and the
//! client delivers them to subscribers as notifications. Nothing here is ever
//! raised across the actor loop.

use lawbuddy_proto::{EnvelopeId, ProtocolError, StreamId};
use thiserror::Error;

/// Errors surfaced to the application layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Network drop, connect timeout, or abnormal close. Retried via backoff.
    #[error("connection lost: {0}")]
    TransientConnection(String),

    /// Server rejected the bearer credential. Never retried automatically.
    #[error("authentication rejected: {0}")]
    FatalAuth(String),

    /// No acknowledgment arrived within the ack timeout.
    #[error("no acknowledgment for message {id}")]
    DeliveryTimeout {
        /// Envelope that timed out
        id: EnvelopeId,
    },

    /// Server-reported generation failure. Terminates that stream only.
    #[error("stream {stream_id} failed: {reason}")]
    Stream {
        /// Failed stream
        stream_id: StreamId,
        /// Server-provided reason
        reason: String,
    },

    /// Malformed or unroutable frame. Logged and dropped.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// `error` frame from the server.
    #[error("server error: {message}")]
    Server {
        /// Error description
        message: String,
        /// Error code, if given
        code: Option<String>,
    },

    /// Socket-level failure below the protocol.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Returns true if the condition may clear on its own by reconnecting.
    ///
    /// Authentication rejection requires a new credential, delivery timeouts
    /// require an explicit user retry, and protocol errors indicate a broken
    /// peer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientConnection(_) | Self::Transport(_))
    }

    /// Returns true if the user must re-authenticate before reconnecting.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::FatalAuth(_))
    }
}
