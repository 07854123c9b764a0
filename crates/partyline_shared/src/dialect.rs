//! Sub-protocol dialects of the push subscription socket.

use serde::{Deserialize, Serialize};

/// Which framing convention the server selected during the socket handshake.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Dialect {
    /// Modern `graphql-transport-ws` framing (`subscribe`/`next`, `ping`/`pong`).
    GraphqlTransportWs,
    /// Legacy `graphql-ws` framing (`start`/`data`, `ka`).
    GraphqlWs,
    /// No sub-protocol negotiated yet, or the server picked none.
    #[default]
    Unknown,
}

impl Dialect {
    /// Sub-protocol names offered on every connect, in preference order.
    pub const OFFERED: [&'static str; 2] = ["graphql-transport-ws", "graphql-ws"];

    /// Maps the negotiated sub-protocol name to a dialect.
    #[must_use]
    pub fn from_protocol(protocol: Option<&str>) -> Self {
        match protocol.map(str::trim) {
            Some("graphql-transport-ws") => Self::GraphqlTransportWs,
            Some("graphql-ws") => Self::GraphqlWs,
            _ => Self::Unknown,
        }
    }

    /// The sub-protocol name, if this is a named dialect.
    #[must_use]
    pub const fn protocol_name(self) -> Option<&'static str> {
        match self {
            Self::GraphqlTransportWs => Some("graphql-transport-ws"),
            Self::GraphqlWs => Some("graphql-ws"),
            Self::Unknown => None,
        }
    }

    /// Returns true for the legacy dialect.
    #[inline]
    #[must_use]
    pub const fn is_legacy(self) -> bool {
        matches!(self, Self::GraphqlWs)
    }
}
