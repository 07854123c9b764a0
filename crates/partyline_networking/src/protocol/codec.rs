//! Frame encoding and decoding for both dialects.
//!
//! Decoding never fails: anything that is not a recognizable frame for the
//! negotiated dialect comes back as [`Frame::Unknown`].

use partyline_shared::Dialect;
use serde::Deserialize;
use serde_json::{json, Value};

/// A decoded server frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// `connection_ack`.
    Ack,
    /// `next` (transport) or `data` (legacy).
    Data {
        /// Subscription the result belongs to.
        id: Option<String>,
        /// GraphQL execution result.
        payload: Value,
    },
    /// `error`, or legacy `connection_error` (which carries no id).
    Error {
        /// Subscription the error belongs to, if any.
        id: Option<String>,
        /// Error details as sent by the server.
        payload: Value,
    },
    /// `complete`: the server finished a subscription.
    Complete {
        /// Subscription that finished.
        id: Option<String>,
    },
    /// Transport `ping`, to be answered with a pong.
    Ping {
        /// Optional payload to echo.
        payload: Option<Value>,
    },
    /// Legacy `ka` notice. Needs no reply.
    KeepAlive,
    /// Transport `pong`.
    Pong,
    /// Unparseable, or not a frame of this dialect.
    Unknown,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    payload: Option<Value>,
}

/// Decodes one text frame.
///
/// An [`Dialect::Unknown`] connection is decoded with the transport vocabulary.
#[must_use]
pub fn decode(dialect: Dialect, text: &str) -> Frame {
    let Ok(envelope) = serde_json::from_str::<Envelope>(text) else {
        return Frame::Unknown;
    };

    let id = envelope.id.as_ref().and_then(Value::as_str).map(str::to_owned);
    let payload = envelope.payload;
    let legacy = dialect.is_legacy();

    match (legacy, envelope.kind.as_str()) {
        (_, "connection_ack") => Frame::Ack,
        (false, "next") | (true, "data") => Frame::Data {
            id,
            payload: payload.unwrap_or(Value::Null),
        },
        (_, "error") => Frame::Error {
            id,
            payload: payload.unwrap_or(Value::Null),
        },
        (true, "connection_error") => Frame::Error {
            id: None,
            payload: payload.unwrap_or(Value::Null),
        },
        (_, "complete") => Frame::Complete { id },
        (false, "ping") => Frame::Ping { payload },
        (false, "pong") => Frame::Pong,
        (true, "ka") => Frame::KeepAlive,
        _ => Frame::Unknown,
    }
}

/// `connection_init` with an empty payload.
#[must_use]
pub fn encode_init() -> String {
    json!({"type": "connection_init", "payload": {}}).to_string()
}

/// `subscribe` (transport) or `start` (legacy).
#[must_use]
pub fn encode_subscribe(dialect: Dialect, id: &str, query: &str, variables: &Value) -> String {
    let kind = if dialect.is_legacy() { "start" } else { "subscribe" };
    json!({
        "id": id,
        "type": kind,
        "payload": {"query": query, "variables": variables},
    })
    .to_string()
}

/// `pong`, echoing the ping payload when there was one.
#[must_use]
pub fn encode_pong(payload: Option<&Value>) -> String {
    match payload {
        Some(payload) => json!({"type": "pong", "payload": payload}).to_string(),
        None => json!({"type": "pong"}).to_string(),
    }
}

/// `complete` (transport) or `stop` (legacy).
#[must_use]
pub fn encode_unsubscribe(dialect: Dialect, id: &str) -> String {
    let kind = if dialect.is_legacy() { "stop" } else { "complete" };
    json!({"id": id, "type": kind}).to_string()
}

/// Human-readable reason from an error frame payload.
///
/// Servers send either a list of GraphQL errors or a single error object.
#[must_use]
pub fn error_reason(payload: &Value) -> String {
    let first = match payload {
        Value::Array(errors) => errors.first(),
        other => Some(other),
    };

    first
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .map_or_else(|| "subscription error".to_owned(), str::to_owned)
}
