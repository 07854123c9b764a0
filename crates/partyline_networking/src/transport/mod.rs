//! # Transport Layer
//!
//! Text-frame sockets with sub-protocol negotiation.
//!
//! ## Design
//!
//! - The session only sees [`SocketConnector`] / [`SocketConnection`]
//! - [`WsConnector`] talks to a real endpoint
//! - [`MemoryConnector`] hands the server end of each connection to the test

use async_trait::async_trait;

use crate::error::TransportResult;

mod memory;
mod websocket;

pub use memory::{MemoryConnector, MemoryListener, MemoryPeer};
pub use websocket::WsConnector;

/// What a socket read produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketFrame {
    /// A text frame.
    Text(String),
    /// The peer closed the connection (or the stream ended).
    Closed {
        /// Close code, when the peer sent one.
        code: Option<u16>,
        /// Close reason, possibly empty.
        reason: String,
    },
}

impl SocketFrame {
    /// Close notice without code or reason.
    #[must_use]
    pub const fn ended() -> Self {
        Self::Closed {
            code: None,
            reason: String::new(),
        }
    }
}

/// Opens connections.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    /// Opens a socket to `url`, offering `protocols` in preference order.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::TransportError`] when the endpoint is invalid or the
    /// socket cannot be opened.
    async fn connect(
        &self,
        url: &str,
        protocols: &[&str],
    ) -> TransportResult<Box<dyn SocketConnection>>;
}

/// One open connection.
#[async_trait]
pub trait SocketConnection: Send {
    /// Sub-protocol the server selected, if any.
    fn protocol(&self) -> Option<&str>;

    /// Sends one text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::TransportError`] when the frame cannot be written.
    async fn send_text(&mut self, text: String) -> TransportResult<()>;

    /// Waits for the next text frame or the close notice.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::TransportError`] when the socket fails.
    async fn recv(&mut self) -> TransportResult<SocketFrame>;

    /// Closes the connection. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::TransportError`] when the close handshake fails.
    async fn close(&mut self) -> TransportResult<()>;
}
