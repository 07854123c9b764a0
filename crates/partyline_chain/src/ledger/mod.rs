//! # Ledger Access
//!
//! Historical event queries, the pull side of the stream.
//!
//! ```text
//! query_events(query, cursor?, limit, order) ──▶ EventPage { data, nextCursor?, hasNextPage }
//! ```
//!
//! The cursor is exclusive: a page starts right after it in the requested
//! order.

use async_trait::async_trait;
use partyline_shared::{EventCursor, EventFilter, RawEvent};
use serde::{Deserialize, Serialize};

use crate::error::LedgerResult;

mod memory;
mod rpc;

pub use memory::{MemoryLedger, RecordedQuery};
pub use rpc::{JsonRpcLedgerClient, QUERY_EVENTS_METHOD};

/// Server-side event selector (externally tagged, as the node expects).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventQuery {
    /// Events emitted by transactions calling into `package::module`.
    MoveModule {
        /// Package id.
        package: String,
        /// Module name.
        module: String,
    },
    /// Events whose type is defined in `package::module`.
    MoveEventModule {
        /// Package id.
        package: String,
        /// Module name.
        module: String,
    },
}

impl EventQuery {
    /// The query the poller uses for `filter`.
    #[must_use]
    pub fn for_filter(filter: &EventFilter) -> Self {
        Self::MoveModule {
            package: filter.package_id.clone(),
            module: filter.module.clone(),
        }
    }
}

/// Page order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryOrder {
    /// Oldest first.
    Ascending,
    /// Newest first.
    Descending,
}

impl QueryOrder {
    /// The `descending` flag of the RPC call.
    #[inline]
    #[must_use]
    pub const fn is_descending(self) -> bool {
        matches!(self, Self::Descending)
    }
}

/// One page of query results.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    /// Events in the requested order.
    #[serde(default)]
    pub data: Vec<RawEvent>,
    /// Cursor of the last returned event.
    #[serde(default)]
    pub next_cursor: Option<EventCursor>,
    /// Whether more events follow.
    #[serde(default)]
    pub has_next_page: bool,
}

/// Read access to the ledger's event history.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetches up to `limit` events matching `query`, after `cursor` in `order`.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::LedgerError`] when the ledger cannot be reached or
    /// rejects the query.
    async fn query_events(
        &self,
        query: &EventQuery,
        cursor: Option<&EventCursor>,
        limit: usize,
        order: QueryOrder,
    ) -> LedgerResult<EventPage>;
}
