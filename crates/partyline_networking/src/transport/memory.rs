//! In-process socket pairs.
//!
//! ```text
//! session ──connect──▶ MemoryConnector ──accept──▶ MemoryListener ──▶ MemoryPeer
//!    ▲                                                                   │
//!    └──────────────── text frames / close notice ◀──────────────────────┘
//! ```
//!
//! The test drives the server end through [`MemoryPeer`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{SocketConnection, SocketConnector, SocketFrame};
use crate::error::{TransportError, TransportResult};

struct Shared {
    protocol: Mutex<Option<String>>,
    refusing: AtomicBool,
    connects: AtomicUsize,
    accepted: mpsc::UnboundedSender<MemoryPeer>,
}

/// Connector whose connections terminate in the test process.
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

/// Receives the server end of every accepted connection.
pub struct MemoryListener {
    accepted: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryConnector {
    /// Creates a connector that selects `protocol` on every connection.
    #[must_use]
    pub fn new(protocol: Option<&str>) -> (Self, MemoryListener) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            protocol: Mutex::new(protocol.map(str::to_owned)),
            refusing: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            accepted: accepted_tx,
        });
        (
            Self { shared },
            MemoryListener {
                accepted: accepted_rx,
            },
        )
    }

    /// Makes subsequent connects fail (or succeed again).
    pub fn set_refusing(&self, refusing: bool) {
        self.shared.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Changes the protocol selected on subsequent connects.
    pub fn set_protocol(&self, protocol: Option<&str>) {
        *self.shared.protocol.lock() = protocol.map(str::to_owned);
    }

    /// Number of connect calls so far, refused ones included.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SocketConnector for MemoryConnector {
    async fn connect(
        &self,
        url: &str,
        protocols: &[&str],
    ) -> TransportResult<Box<dyn SocketConnection>> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);

        if self.shared.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::Connect(format!("{url}: connection refused")));
        }

        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();
        let protocol = self.shared.protocol.lock().clone();

        let peer = MemoryPeer {
            url: url.to_owned(),
            offered: protocols.iter().map(|p| (*p).to_owned()).collect(),
            to_client,
            from_client,
        };
        self.shared
            .accepted
            .send(peer)
            .map_err(|_| TransportError::Connect(format!("{url}: listener gone")))?;

        Ok(Box::new(MemoryConnection {
            protocol,
            incoming: from_server,
            outgoing: Some(to_server),
            closed: false,
        }))
    }
}

impl MemoryListener {
    /// Waits for the next accepted connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accepted.recv().await
    }

    /// Returns an already accepted connection without waiting.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.accepted.try_recv().ok()
    }
}

/// Server end of one in-memory connection.
pub struct MemoryPeer {
    url: String,
    offered: Vec<String>,
    to_client: mpsc::UnboundedSender<SocketFrame>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Endpoint the client dialed.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sub-protocols the client offered.
    #[must_use]
    pub fn offered_protocols(&self) -> &[String] {
        &self.offered
    }

    /// Next text frame from the client; `None` once the client is gone.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next frame from the client parsed as JSON. Unparseable frames yield `Null`.
    pub async fn recv_json(&mut self) -> Option<Value> {
        let text = self.recv_text().await?;
        Some(serde_json::from_str(&text).unwrap_or(Value::Null))
    }

    /// Sends a text frame to the client. Returns false if the client is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client.send(SocketFrame::Text(text.into())).is_ok()
    }

    /// Sends a JSON frame to the client.
    pub fn send_json(&self, value: &Value) -> bool {
        self.send_text(value.to_string())
    }

    /// Closes the connection from the server side.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        self.to_client
            .send(SocketFrame::Closed {
                code: Some(code),
                reason: reason.to_owned(),
            })
            .is_ok()
    }

    /// Returns true once the client closed or dropped its end.
    #[must_use]
    pub fn is_client_gone(&self) -> bool {
        self.to_client.is_closed()
    }
}

struct MemoryConnection {
    protocol: Option<String>,
    incoming: mpsc::UnboundedReceiver<SocketFrame>,
    outgoing: Option<mpsc::UnboundedSender<String>>,
    closed: bool,
}

#[async_trait]
impl SocketConnection for MemoryConnection {
    fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    async fn send_text(&mut self, text: String) -> TransportResult<()> {
        let outgoing = self.outgoing.as_ref().filter(|_| !self.closed);
        outgoing
            .ok_or(TransportError::Closed)?
            .send(text)
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> TransportResult<SocketFrame> {
        if self.closed {
            return Ok(SocketFrame::ended());
        }
        match self.incoming.recv().await {
            Some(frame) => {
                if matches!(frame, SocketFrame::Closed { .. }) {
                    self.closed = true;
                }
                Ok(frame)
            }
            None => {
                self.closed = true;
                Ok(SocketFrame::ended())
            }
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.closed = true;
        self.outgoing = None;
        self.incoming.close();
        Ok(())
    }
}
