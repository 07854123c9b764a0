//! WebSocket transport backed by `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use super::{SocketConnection, SocketConnector, SocketFrame};
use crate::error::{TransportError, TransportResult};

/// Opens real WebSocket connections (`ws://` and `wss://`).
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Creates a connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SocketConnector for WsConnector {
    async fn connect(
        &self,
        url: &str,
        protocols: &[&str],
    ) -> TransportResult<Box<dyn SocketConnection>> {
        let invalid = |reason: String| TransportError::InvalidUrl {
            url: url.to_owned(),
            reason,
        };

        let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
        let mut request = parsed
            .as_str()
            .into_client_request()
            .map_err(|e| invalid(e.to_string()))?;

        if !protocols.is_empty() {
            let offered =
                HeaderValue::from_str(&protocols.join(", ")).map_err(|e| invalid(e.to_string()))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, offered);
        }

        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let protocol = response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        debug!(url = %parsed, protocol = ?protocol, "websocket open");

        Ok(Box::new(WsConnection {
            inner: stream,
            protocol,
            closed: false,
        }))
    }
}

/// An open WebSocket.
struct WsConnection {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
    protocol: Option<String>,
    closed: bool,
}

#[async_trait]
impl SocketConnection for WsConnection {
    fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    async fn send_text(&mut self, text: String) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> TransportResult<SocketFrame> {
        if self.closed {
            return Ok(SocketFrame::ended());
        }

        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Ok(SocketFrame::Text(text.to_string())),
                Some(Ok(Message::Binary(bytes))) => {
                    // Some servers send JSON as binary frames.
                    if let Ok(text) = String::from_utf8(bytes.to_vec()) {
                        return Ok(SocketFrame::Text(text));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    self.closed = true;
                    return Ok(frame.map_or_else(SocketFrame::ended, |frame| {
                        SocketFrame::Closed {
                            code: Some(frame.code.into()),
                            reason: frame.reason.to_string(),
                        }
                    }));
                }
                // Control frames are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.closed = true;
                    return Err(TransportError::Socket(e.to_string()));
                }
                None => {
                    self.closed = true;
                    return Ok(SocketFrame::ended());
                }
            }
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.inner.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Socket(e.to_string())),
        }
    }
}
