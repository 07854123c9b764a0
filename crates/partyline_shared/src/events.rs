//! # Canonical Events & Normalizer
//!
//! Every event that reaches a consumer has the same shape, whether it was
//! pushed over the subscription socket or pulled from the ledger.
//!
//! Normalization never fails. A payload that is missing optional parts yields
//! an event with `None` in the derived fields; a push node without a sender or
//! a type is dropped.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Separator between the package, module and struct parts of a type name.
pub const TYPE_SEPARATOR: &str = "::";

/// Payload keys checked for a correlation id at the top level, in order.
pub const CORRELATION_KEYS: [&str; 3] = ["activity_id", "activityId", "activity"];

/// Payload keys checked inside the nested `fields` envelope, in order.
pub const NESTED_CORRELATION_KEYS: [&str; 2] = ["activity_id", "activityId"];

/// Where an event came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSource {
    /// Delivered by the push subscription.
    Push,
    /// Delivered by the cursor poller.
    Pull,
}

/// Opaque position marker returned by the ledger with every historical event.
///
/// Only ever compared for equality and handed back to the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventCursor(Value);

impl EventCursor {
    /// Wraps a ledger-provided id.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// The raw id as the ledger returned it.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }
}

impl fmt::Display for EventCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

/// Event record as returned by a ledger history query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    /// Cursor of this event.
    pub id: EventCursor,
    /// Sender address.
    pub sender: String,
    /// Qualified type name (`package::module::Struct`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Emission time in milliseconds, as a decimal string.
    #[serde(default, deserialize_with = "string_or_number")]
    pub timestamp_ms: Option<String>,
    /// Decoded event payload.
    #[serde(default)]
    pub parsed_json: Value,
    /// Module of the transaction that emitted the event.
    #[serde(default)]
    pub transaction_module: Option<String>,
    /// Package of the transaction that emitted the event.
    #[serde(default)]
    pub package_id: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// The three parts of a qualified type name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QualifiedType<'a> {
    /// First component, if non-blank.
    pub package_id: Option<&'a str>,
    /// Second component, if non-blank.
    pub module: Option<&'a str>,
    /// Third component (with any further `::` kept), or the whole input.
    pub struct_name: &'a str,
}

/// Splits `package::module::Struct` into its parts.
///
/// Generic arguments stay attached to the struct part, so
/// `0x2::coin::Coin<0x2::iota::IOTA>` yields struct `Coin<0x2::iota::IOTA>`.
#[must_use]
pub fn split_qualified_type(type_name: &str) -> QualifiedType<'_> {
    let mut parts = type_name.splitn(3, TYPE_SEPARATOR);
    let package_id = parts.next().and_then(non_blank);
    let module = parts.next().and_then(non_blank);
    let struct_name = parts.next().and_then(non_blank).unwrap_or(type_name);

    QualifiedType {
        package_id,
        module,
        struct_name,
    }
}

/// Finds the logical correlation id (the activity an event belongs to).
///
/// Checks [`CORRELATION_KEYS`] at the top level, then [`NESTED_CORRELATION_KEYS`]
/// inside `fields`. Only non-blank strings count.
#[must_use]
pub fn extract_correlation_id(json: &Value) -> Option<String> {
    let object = json.as_object()?;

    first_text(object, &CORRELATION_KEYS).or_else(|| {
        object
            .get("fields")
            .and_then(Value::as_object)
            .and_then(|fields| first_text(fields, &NESTED_CORRELATION_KEYS))
    })
}

fn first_text(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str).and_then(non_blank))
        .map(str::to_owned)
}

fn non_blank(s: &str) -> Option<&str> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Reads a string field that some nodes nest one level down
/// (`"sender": {"address": "0x.."}`, `"type": {"repr": "0x..::m::S"}`).
fn read_text<'a>(value: Option<&'a Value>, nested_key: &str) -> Option<&'a str> {
    match value? {
        Value::String(s) => non_blank(s),
        Value::Object(object) => object.get(nested_key).and_then(Value::as_str).and_then(non_blank),
        _ => None,
    }
}

fn read_timestamp(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => non_blank(s).map(str::to_owned),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// An event in the one shape consumers see.
///
/// Immutable once constructed: fields are only readable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEvent {
    source: EventSource,
    timestamp_ms: Option<String>,
    sender: String,
    #[serde(rename = "type")]
    event_type: String,
    package_id: Option<String>,
    module: Option<String>,
    struct_name: String,
    correlation_id: Option<String>,
    json: Value,
}

impl CanonicalEvent {
    fn build(
        source: EventSource,
        timestamp_ms: Option<String>,
        sender: String,
        event_type: String,
        module_fallback: Option<&str>,
        json: Value,
    ) -> Self {
        let parts = split_qualified_type(&event_type);
        let package_id = parts.package_id.map(str::to_owned);
        let module = parts.module.or(module_fallback).map(str::to_owned);
        let struct_name = parts.struct_name.to_owned();
        let correlation_id = extract_correlation_id(&json);

        Self {
            source,
            timestamp_ms,
            sender,
            event_type,
            package_id,
            module,
            struct_name,
            correlation_id,
            json,
        }
    }

    /// Normalizes a ledger history record.
    ///
    /// When the type carries no module part, the emitting transaction's module
    /// is used instead.
    #[must_use]
    pub fn from_raw(raw: &RawEvent, source: EventSource) -> Self {
        Self::build(
            source,
            raw.timestamp_ms.clone(),
            raw.sender.clone(),
            raw.event_type.clone(),
            raw.transaction_module.as_deref(),
            raw.parsed_json.clone(),
        )
    }

    /// Normalizes one event node of a subscription payload.
    ///
    /// Returns `None` when the node has no usable sender or type.
    #[must_use]
    pub fn from_push_node(node: &Value, source: EventSource) -> Option<Self> {
        let sender = read_text(node.get("sender"), "address")?;
        let event_type = read_text(node.get("type"), "repr")?;

        let json = present(node.get("json"))
            .or_else(|| present(node.get("parsedJson")))
            .or_else(|| present(node.get("data").and_then(|data| data.get("json"))))
            .cloned()
            .unwrap_or(Value::Null);

        let timestamp_ms =
            read_timestamp(node.get("timestampMs")).or_else(|| read_timestamp(node.get("timestamp")));

        Some(Self::build(
            source,
            timestamp_ms,
            sender.to_owned(),
            event_type.to_owned(),
            None,
            json,
        ))
    }

    /// Push or pull.
    #[inline]
    #[must_use]
    pub const fn source(&self) -> EventSource {
        self.source
    }

    /// Emission time, when the source reported one.
    #[must_use]
    pub fn timestamp_ms(&self) -> Option<&str> {
        self.timestamp_ms.as_deref()
    }

    /// Sender address.
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Full qualified type name.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Package part of the type.
    #[must_use]
    pub fn package_id(&self) -> Option<&str> {
        self.package_id.as_deref()
    }

    /// Module part of the type.
    #[must_use]
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    /// Struct part of the type (the whole type when it has fewer than three parts).
    #[must_use]
    pub fn struct_name(&self) -> &str {
        &self.struct_name
    }

    /// Activity the event belongs to, if the payload names one.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Undecoded application payload.
    #[must_use]
    pub const fn json(&self) -> &Value {
        &self.json
    }
}

/// Extracts every event carried by one subscription payload.
///
/// Payload shapes differ between node versions, so parsing is lenient: the
/// events live under `data.events` (or `events` when there is no `data`
/// envelope) as either an array or a single object.
#[must_use]
pub fn parse_subscription_payload(payload: &Value, source: EventSource) -> Vec<CanonicalEvent> {
    if !payload.is_object() {
        return Vec::new();
    }

    let data = present(payload.get("data")).unwrap_or(payload);

    match data.get("events") {
        Some(Value::Array(nodes)) => nodes
            .iter()
            .filter_map(|node| CanonicalEvent::from_push_node(node, source))
            .collect(),
        Some(node @ Value::Object(_)) => CanonicalEvent::from_push_node(node, source)
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}

/// Returns the first GraphQL error message of a subscription payload, if any.
#[must_use]
pub fn subscription_error(payload: &Value) -> Option<String> {
    let first = payload.get("errors")?.as_array()?.first()?;
    let message = first
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("subscription payload reported errors");
    Some(message.to_owned())
}
