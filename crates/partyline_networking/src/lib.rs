//! # PARTYLINE Networking
//!
//! Push side of the event stream: a GraphQL subscription carried over a
//! WebSocket, in either of the two historical framing dialects.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  SUBSCRIPTION SESSION                    │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌────────────┐   ┌────────────────┐    │
//! │  │ Transport  │──▶│   Codec    │──▶│  Normalizer    │──▶ SessionEvent
//! │  │ (ws / mem) │   │ (dialect)  │   │ (shared crate) │    │
//! │  └────────────┘   └────────────┘   └────────────────┘    │
//! │         ▲                                                │
//! │         └──── Backoff (reconnect, capped, jittered)      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure model
//!
//! Socket errors, ack timeouts and server-side `error`/`complete` frames are
//! all recoverable: the session reconnects with backoff. Only exhausting the
//! attempt budget is fatal, and it is reported once as
//! [`SessionEvent::Fatal`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use partyline_networking::{SessionConfig, Subscription, SubscriptionSession, WsConnector};
//!
//! let (events, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let handle = SubscriptionSession::spawn(
//!     SessionConfig::default(),
//!     Subscription::events("0xABC", "party"),
//!     Arc::new(WsConnector::new()),
//!     events,
//! );
//! while let Some(event) = rx.recv().await { /* ... */ }
//! handle.stop();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]

pub mod backoff;
pub mod error;
pub mod protocol;
pub mod session;
pub mod shutdown;
pub mod transport;

pub use backoff::BackoffPolicy;
pub use error::{SessionFailure, TransportError, TransportResult};
pub use protocol::{Frame, Subscription};
pub use session::{SessionConfig, SessionEvent, SessionHandle, SubscriptionSession};
pub use shutdown::{ShutdownSignal, ShutdownTrigger};
pub use transport::{
    MemoryConnector, MemoryListener, MemoryPeer, SocketConnection, SocketConnector, SocketFrame,
    WsConnector,
};
