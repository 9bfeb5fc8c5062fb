//! In-memory transport for session actor tests.
//!
//! [`MemoryConnector`] plugs into [`lawbuddy_client::SessionActor`] in place
//! of the WebSocket connector. Each successful connect hands the server side
//! of the channel pair to the paired [`MemoryServer`] as a [`ServerSocket`].

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

use lawbuddy_client::{
    CloseInfo, ConnectedTransport, Connector, Outgoing, TransportError, TransportEvent,
};
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

/// Channel capacity in each direction.
const SOCKET_BUFFER: usize = 64;

/// Create a connected connector/server pair.
pub fn memory_transport() -> (MemoryConnector, MemoryServer) {
    let (accepted, sockets) = mpsc::unbounded_channel();
    let rejections = Arc::new(Mutex::new(VecDeque::new()));
    let connector = MemoryConnector { accepted, rejections: Arc::clone(&rejections) };
    (connector, MemoryServer { sockets, rejections })
}

/// Client side: opens in-memory sockets.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    accepted: mpsc::UnboundedSender<ServerSocket>,
    rejections: Arc<Mutex<VecDeque<CloseInfo>>>,
}

impl MemoryConnector {
    fn open(&self, url: Url) -> Result<ConnectedTransport, TransportError> {
        let rejection = self.rejections.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        if let Some(close) = rejection {
            return Err(TransportError::Rejected(close));
        }

        let (to_server_tx, to_server_rx) = mpsc::channel(SOCKET_BUFFER);
        let (from_server_tx, from_server_rx) = mpsc::channel(SOCKET_BUFFER);
        let socket = ServerSocket { url, from_client: to_server_rx, to_client: from_server_tx };
        self.accepted
            .send(socket)
            .map_err(|_| TransportError::Connection("memory server dropped".to_string()))?;

        Ok(ConnectedTransport::new(to_server_tx, from_server_rx))
    }
}

impl Connector for MemoryConnector {
    fn connect(
        &self,
        url: Url,
    ) -> impl Future<Output = Result<ConnectedTransport, TransportError>> + Send {
        let result = self.open(url);
        async move { result }
    }
}

/// Server side: receives every socket the connector opens.
#[derive(Debug)]
pub struct MemoryServer {
    sockets: mpsc::UnboundedReceiver<ServerSocket>,
    rejections: Arc<Mutex<VecDeque<CloseInfo>>>,
}

impl MemoryServer {
    /// Wait for the next socket.
    pub async fn accept(&mut self) -> Option<ServerSocket> {
        self.sockets.recv().await
    }

    /// Refuse the next connect attempt with `close`.
    pub fn reject_next(&self, close: CloseInfo) {
        self.rejections.lock().unwrap_or_else(PoisonError::into_inner).push_back(close);
    }
}

/// Server end of one in-memory socket.
#[derive(Debug)]
pub struct ServerSocket {
    /// URL the client connected to.
    pub url: Url,
    from_client: mpsc::Receiver<Outgoing>,
    to_client: mpsc::Sender<TransportEvent>,
}

impl ServerSocket {
    /// `token` query parameter of the connect URL.
    pub fn token(&self) -> Option<String> {
        self.url.query_pairs().find(|(key, _)| key == "token").map(|(_, value)| value.into_owned())
    }

    /// Send a text frame. Returns `false` if the client side is gone.
    pub async fn send(&self, text: impl Into<String>) -> bool {
        self.to_client.send(TransportEvent::Frame(text.into())).await.is_ok()
    }

    /// Close the socket from the server side.
    pub async fn close(self, close: CloseInfo) {
        let _ = self.to_client.send(TransportEvent::Closed(close)).await;
    }

    /// Next frame written by the client, or `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<Outgoing> {
        self.from_client.recv().await
    }

    /// Next text frame as JSON. `None` on client close or disconnect.
    pub async fn recv_json(&mut self) -> Option<Value> {
        match self.recv().await? {
            Outgoing::Text(text) => serde_json::from_str(&text).ok(),
            Outgoing::Close { .. } => None,
        }
    }

    /// Next text frame of one `type`, skipping others.
    pub async fn recv_of(&mut self, kind: &str) -> Option<Value> {
        loop {
            let frame = self.recv_json().await?;
            if frame["type"] == kind {
                return Some(frame);
            }
        }
    }
}
