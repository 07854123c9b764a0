//! # Event Filter
//!
//! Decides whether a canonical event is relevant to the consumer.
//!
//! ```text
//! package  ──▶ exact
//! module   ──▶ exact
//! activity ──▶ exact on correlation id (only when set)
//! structs  ──▶ any name: struct equals OR type contains (case-insensitive)
//! ```

use serde::{Deserialize, Serialize};

use crate::events::CanonicalEvent;

/// Selection criteria for one stream. Fixed for the stream's lifetime.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    /// Package that must have emitted the event.
    pub package_id: String,
    /// Module that must have emitted the event.
    pub module: String,
    /// Optional activity the event must belong to.
    #[serde(default)]
    pub activity_id: Option<String>,
    /// Optional list of accepted struct names. Empty means "any".
    #[serde(default)]
    pub struct_names: Vec<String>,
}

impl EventFilter {
    /// Creates a filter for one package/module pair.
    #[must_use]
    pub fn new(package_id: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            module: module.into(),
            activity_id: None,
            struct_names: Vec::new(),
        }
    }

    /// Restricts to one activity.
    #[must_use]
    pub fn with_activity_id(mut self, activity_id: impl Into<String>) -> Self {
        self.activity_id = Some(activity_id.into());
        self
    }

    /// Restricts to the given struct names.
    #[must_use]
    pub fn with_struct_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.struct_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true when the event satisfies every criterion.
    #[must_use]
    pub fn matches(&self, event: &CanonicalEvent) -> bool {
        if event.package_id() != Some(self.package_id.as_str())
            || event.module() != Some(self.module.as_str())
        {
            return false;
        }

        if let Some(activity) = self.activity_id.as_deref().filter(|id| !id.is_empty()) {
            if event.correlation_id() != Some(activity) {
                return false;
            }
        }

        let mut wanted = self
            .struct_names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .peekable();

        if wanted.peek().is_none() {
            return true;
        }

        let struct_name = event.struct_name().to_lowercase();
        let event_type = event.event_type().to_lowercase();

        wanted.any(|name| {
            let name = name.to_lowercase();
            struct_name == name || event_type.contains(&name)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventCursor, EventSource, RawEvent};
    use serde_json::{json, Value};

    fn event(event_type: &str, payload: Value) -> CanonicalEvent {
        let raw = RawEvent {
            id: EventCursor::new(json!("c")),
            sender: "0xs".to_string(),
            event_type: event_type.to_string(),
            timestamp_ms: None,
            parsed_json: payload,
            transaction_module: None,
            package_id: None,
        };
        CanonicalEvent::from_raw(&raw, EventSource::Push)
    }

    #[test]
    fn test_package_and_module_must_match() {
        let filter = EventFilter::new("0xABC", "mymodule");
        assert!(filter.matches(&event("0xABC::mymodule::Foo", json!({}))));
        assert!(!filter.matches(&event("0xDEF::mymodule::Foo", json!({}))));
        assert!(!filter.matches(&event("0xABC::other::Foo", json!({}))));
        assert!(!filter.matches(&event("Foo", json!({}))));
    }

    #[test]
    fn test_struct_names_case_insensitive() {
        let filter = EventFilter::new("0xABC", "mymodule").with_struct_names(["foo"]);
        assert!(filter.matches(&event("0xABC::mymodule::Foo", json!({}))));

        let filter = EventFilter::new("0xABC", "mymodule").with_struct_names(["Bar"]);
        assert!(!filter.matches(&event("0xABC::mymodule::Foo", json!({}))));
    }

    #[test]
    fn test_struct_name_substring_of_type() {
        let filter = EventFilter::new("0xABC", "mymodule").with_struct_names(["executed"]);
        assert!(filter.matches(&event("0xABC::mymodule::LotteryExecutedEvent", json!({}))));
    }

    #[test]
    fn test_blank_struct_names_mean_any() {
        let filter = EventFilter::new("0xABC", "mymodule").with_struct_names(["  ", ""]);
        assert!(filter.matches(&event("0xABC::mymodule::Anything", json!({}))));
    }

    #[test]
    fn test_activity_id_requires_correlation() {
        let filter = EventFilter::new("0xABC", "mymodule").with_activity_id("0x1");
        assert!(filter.matches(&event("0xABC::mymodule::Foo", json!({"activity_id": "0x1"}))));
        assert!(!filter.matches(&event("0xABC::mymodule::Foo", json!({"activity_id": "0x2"}))));
        assert!(!filter.matches(&event("0xABC::mymodule::Foo", json!({}))));
    }

    #[test]
    fn test_empty_activity_id_is_ignored() {
        let filter = EventFilter::new("0xABC", "mymodule").with_activity_id("");
        assert!(filter.matches(&event("0xABC::mymodule::Foo", json!({}))));
    }
}
