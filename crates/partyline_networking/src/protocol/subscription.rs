//! The GraphQL subscription a session keeps alive.

use std::time::{SystemTime, UNIX_EPOCH};

use partyline_shared::EventFilter;
use serde_json::{json, Value};

/// Event subscription document understood by the ledger's GraphQL service.
pub const EVENTS_SUBSCRIPTION: &str = "subscription Events($filter: SubscriptionEventFilter) { \
events(filter: $filter) { timestamp sender type json data { json } } }";

/// One subscription request. The id is fixed for the session's lifetime and
/// reused on every reconnect.
#[derive(Clone, Debug, PartialEq)]
pub struct Subscription {
    id: String,
    query: String,
    variables: Value,
}

impl Subscription {
    /// Creates a request with a freshly generated id.
    #[must_use]
    pub fn new(query: impl Into<String>, variables: Value) -> Self {
        Self {
            id: generate_id(),
            query: query.into(),
            variables,
        }
    }

    /// Events emitted by one package/module pair.
    #[must_use]
    pub fn events(package_id: &str, module: &str) -> Self {
        Self::new(
            EVENTS_SUBSCRIPTION,
            json!({"filter": {"MoveEventModule": {"package": package_id, "module": module}}}),
        )
    }

    /// Events selected by `filter` at the server side (package and module only;
    /// the rest of the filter is applied locally).
    #[must_use]
    pub fn for_filter(filter: &EventFilter) -> Self {
        Self::events(&filter.package_id, &filter.module)
    }

    /// Overrides the generated id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Subscription id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// GraphQL document.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// GraphQL variables.
    #[must_use]
    pub const fn variables(&self) -> &Value {
        &self.variables
    }
}

/// `<unix-ms>-<random hex>`.
fn generate_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis());
    let suffix: u32 = rand::random();
    format!("{millis}-{suffix:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_variables() {
        let subscription = Subscription::events("0xABC", "party");
        assert_eq!(
            subscription.variables(),
            &json!({"filter": {"MoveEventModule": {"package": "0xABC", "module": "party"}}})
        );
        assert!(subscription.query().starts_with("subscription Events"));
    }

    #[test]
    fn test_id_shape() {
        let subscription = Subscription::events("0xABC", "party");
        let (millis, suffix) = subscription.id().split_once('-').unwrap();
        assert!(millis.parse::<u128>().is_ok());
        assert!(u32::from_str_radix(suffix, 16).is_ok());
    }

    #[test]
    fn test_ids_differ() {
        let a = Subscription::events("0xABC", "party");
        let b = Subscription::events("0xABC", "party");
        assert_ne!(a.id(), b.id());
    }
}
