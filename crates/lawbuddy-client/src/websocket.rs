//! WebSocket transport.
//!
//! [`WebSocketConnector`] opens one socket per attempt with
//! `tokio-tungstenite` and spawns a task that bridges the socket and the
//! [`ConnectedTransport`] channels.

use futures::{SinkExt, StreamExt};
use lawbuddy_proto::{CLOSE_AUTH_FAILED, CloseInfo};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream,
    tungstenite::{
        self, Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use tracing::debug;
use url::Url;

use crate::transport::{ConnectedTransport, Connector, Outgoing, TransportError, TransportEvent};

/// Channel capacity in each direction.
const DEFAULT_BUFFER: usize = 64;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens `ws://` and `wss://` sockets.
#[derive(Debug, Clone, Copy)]
pub struct WebSocketConnector {
    buffer: usize,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self { buffer: DEFAULT_BUFFER }
    }
}

impl WebSocketConnector {
    /// Connector with default channel capacity.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Connector for WebSocketConnector {
    async fn connect(&self, url: Url) -> Result<ConnectedTransport, TransportError> {
        let (socket, _response) =
            tokio_tungstenite::connect_async(url.as_str()).await.map_err(handshake_error)?;

        let (to_server_tx, to_server_rx) = mpsc::channel(self.buffer);
        let (from_server_tx, from_server_rx) = mpsc::channel(self.buffer);

        let handle = tokio::spawn(run_socket(socket, to_server_rx, from_server_tx));

        Ok(ConnectedTransport::new(to_server_tx, from_server_rx).with_abort(handle.abort_handle()))
    }
}

/// A rejected upgrade with 401/403 means the credential was refused.
fn handshake_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                TransportError::Rejected(CloseInfo::new(
                    CLOSE_AUTH_FAILED,
                    format!("Authentication failed: HTTP {status}"),
                ))
            } else {
                TransportError::Connection(format!("HTTP {status}"))
            }
        },
        other => TransportError::Connection(other.to_string()),
    }
}

/// Bridge the socket and the channels until either side closes.
async fn run_socket(
    socket: Socket,
    mut outgoing: mpsc::Receiver<Outgoing>,
    incoming: mpsc::Sender<TransportEvent>,
) {
    let (mut sink, mut stream) = socket.split();

    let close = loop {
        tokio::select! {
            out = outgoing.recv() => match out {
                Some(Outgoing::Text(text)) => {
                    if let Err(err) = sink.send(Message::text(text)).await {
                        break Some(CloseInfo::abnormal(err.to_string()));
                    }
                },
                Some(Outgoing::Close { code, reason }) => {
                    let frame = CloseFrame { code: CloseCode::from(code), reason: reason.into() };
                    if let Err(err) = sink.send(Message::Close(Some(frame))).await {
                        debug!(error = %err, "close frame not sent");
                    }
                    break None;
                },
                None => {
                    let _ = sink.close().await;
                    break None;
                },
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let event = TransportEvent::Frame(text.as_str().to_string());
                    if incoming.send(event).await.is_err() {
                        break None;
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    break Some(frame.map_or_else(
                        || CloseInfo::abnormal("closed without close frame"),
                        |frame| CloseInfo::new(u16::from(frame.code), frame.reason.as_str()),
                    ));
                },
                // Binary frames are not part of the protocol; ping/pong are
                // answered by tungstenite
                Some(Ok(_)) => {},
                Some(Err(err)) => break Some(CloseInfo::abnormal(err.to_string())),
                None => break Some(CloseInfo::abnormal("socket stream ended")),
            },
        }
    };

    if let Some(close) = close {
        let _ = incoming.send(TransportEvent::Closed(close)).await;
    }
}
