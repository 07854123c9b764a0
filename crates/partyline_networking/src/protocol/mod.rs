//! # Wire Protocol
//!
//! Text frames of the GraphQL-over-WebSocket sub-protocols.
//!
//! ## Dialects
//!
//! ```text
//! ┌──────────────┬──────────────────────┬────────────────┐
//! │ concern      │ graphql-transport-ws │ graphql-ws     │
//! ├──────────────┼──────────────────────┼────────────────┤
//! │ handshake    │ connection_init/ack  │ same           │
//! │ subscribe    │ subscribe            │ start          │
//! │ result       │ next                 │ data           │
//! │ unsubscribe  │ complete             │ stop           │
//! │ keep-alive   │ ping → pong          │ ka (no reply)  │
//! └──────────────┴──────────────────────┴────────────────┘
//! ```
//!
//! Both dialects share the `{type, id?, payload?}` envelope.

mod codec;
mod subscription;

pub use codec::{
    decode, encode_init, encode_pong, encode_subscribe, encode_unsubscribe, error_reason, Frame,
};
pub use subscription::{Subscription, EVENTS_SUBSCRIPTION};
