//! # PARTYLINE Shared
//!
//! Common types used by the push session, the cursor poller and the consumer.
//!
//! ## Data flow
//!
//! ```text
//! socket payload ─┐
//!                 ├─▶ normalizer ─▶ CanonicalEvent ─▶ EventFilter ─▶ consumer
//! ledger RawEvent ┘
//! ```
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER do I/O. Anything that touches a socket or the ledger
//! lives in `partyline_networking` or `partyline_chain`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod dialect;
pub mod events;
pub mod filter;
pub mod recent;
pub mod status;

pub use dialect::Dialect;
pub use events::{
    extract_correlation_id, parse_subscription_payload, split_qualified_type,
    subscription_error, CanonicalEvent, EventCursor, EventSource, QualifiedType, RawEvent,
};
pub use filter::EventFilter;
pub use recent::{RecentEvents, RefreshThrottle};
pub use status::{PushState, StreamMode, StreamStatus};
