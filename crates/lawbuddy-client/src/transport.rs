//! Transport seam between the session actor and a socket.
//!
//! A [`Connector`] opens one socket per connect attempt and hands back a
//! [`ConnectedTransport`]: a pair of channels plus an abort handle for the
//! task doing the socket I/O. This is a thin layer that only moves text
//! frames; protocol logic remains in the Sans-IO [`crate::Client`].

use std::future::Future;

use lawbuddy_proto::CloseInfo;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Server rejected the handshake.
    #[error("handshake rejected: {0}")]
    Rejected(CloseInfo),

    /// Socket error after the connection was established.
    #[error("socket error: {0}")]
    Socket(String),
}

impl TransportError {
    /// Close info reported to the client for this failure.
    pub fn close_info(&self) -> CloseInfo {
        match self {
            Self::Rejected(close) => close.clone(),
            other => CloseInfo::abnormal(other.to_string()),
        }
    }
}

/// Frame written by the session actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Text frame
    Text(String),
    /// Close the socket with this code and reason
    Close {
        /// WebSocket close code
        code: u16,
        /// Close reason
        reason: String,
    },
}

/// Event read from the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Text frame from the server
    Frame(String),
    /// Socket closed; no further events follow
    Closed(CloseInfo),
}

/// Handle to an open transport.
///
/// Frames are sent/received via the channels, and an internal task handles
/// the socket I/O.
#[derive(Debug)]
pub struct ConnectedTransport {
    /// Send frames to the server.
    pub to_server: mpsc::Sender<Outgoing>,
    /// Receive frames from the server.
    pub from_server: mpsc::Receiver<TransportEvent>,
    /// Abort handle to stop the socket task.
    abort_handle: Option<tokio::task::AbortHandle>,
}

impl ConnectedTransport {
    /// Wrap a channel pair.
    pub fn new(
        to_server: mpsc::Sender<Outgoing>,
        from_server: mpsc::Receiver<TransportEvent>,
    ) -> Self {
        Self { to_server, from_server, abort_handle: None }
    }

    /// Attach the task doing the socket I/O, aborted by [`Self::stop`].
    #[must_use]
    pub fn with_abort(mut self, abort_handle: tokio::task::AbortHandle) -> Self {
        self.abort_handle = Some(abort_handle);
        self
    }

    /// Stop the socket task.
    pub fn stop(&self) {
        if let Some(handle) = &self.abort_handle {
            handle.abort();
        }
    }

    /// Split into the writer, the reader, and the abort handle.
    pub fn into_parts(
        self,
    ) -> (mpsc::Sender<Outgoing>, mpsc::Receiver<TransportEvent>, Option<tokio::task::AbortHandle>)
    {
        (self.to_server, self.from_server, self.abort_handle)
    }
}

/// Opens transports for the session actor.
pub trait Connector: Send + Sync + 'static {
    /// Open a socket to `url` (credential already in the query string).
    fn connect(
        &self,
        url: Url,
    ) -> impl Future<Output = Result<ConnectedTransport, TransportError>> + Send;
}
