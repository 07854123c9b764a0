//! # PARTYLINE Chain
//!
//! Ledger access and the consumer-facing event stream.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐  SessionEvent  ┌─────────────────┐   on_event
//! │  Push session   │ ─────────────▶ │                 │ ───────────▶
//! └─────────────────┘                │   EventStream   │
//! ┌─────────────────┐  PollerEvent   │  (orchestrator) │   on_status
//! │  Cursor poller  │ ─────────────▶ │                 │ ───────────▶
//! └────────┬────────┘                └─────────────────┘
//!          │ query_events
//!          ▼
//! ┌─────────────────┐
//! │  LedgerClient   │  JSON-RPC / in-memory
//! └─────────────────┘
//! ```
//!
//! The stream starts in push mode. When the push session exhausts its
//! reconnect budget the stream switches to the poller, which resumes from the
//! latest ledger event.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod ledger;
pub mod listener;
pub mod poller;

pub use config::StreamSettings;
pub use error::{ConfigError, ConfigResult, LedgerError, LedgerResult};
pub use ledger::{
    EventPage, EventQuery, JsonRpcLedgerClient, LedgerClient, MemoryLedger, QueryOrder,
    RecordedQuery,
};
pub use listener::{EventStream, StreamConfig, StreamHandle, StreamStats, StreamStopper, StreamUpdate};
pub use poller::{CursorPoller, PollerConfig, PollerEvent, PollerHandle};
