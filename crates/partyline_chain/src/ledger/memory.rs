//! In-memory ledger with a query log and failure injection.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use partyline_shared::{split_qualified_type, EventCursor, RawEvent};

use super::{EventPage, EventQuery, LedgerClient, QueryOrder};
use crate::error::{LedgerError, LedgerResult};

/// A query as the ledger received it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedQuery {
    /// Selector.
    pub query: EventQuery,
    /// Exclusive start position.
    pub cursor: Option<EventCursor>,
    /// Page size.
    pub limit: usize,
    /// Page order.
    pub order: QueryOrder,
}

#[derive(Default)]
struct State {
    history: Vec<RawEvent>,
    failures: VecDeque<String>,
    queries: Vec<RecordedQuery>,
}

/// Event history held in memory, oldest first.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event to the history.
    pub fn push(&self, event: RawEvent) {
        self.state.lock().history.push(event);
    }

    /// Makes the next query fail with a transport error.
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.state.lock().failures.push_back(reason.into());
    }

    /// Every query received so far, failed ones included.
    #[must_use]
    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.state.lock().queries.clone()
    }

    /// Number of events in the history.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Returns true when the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().history.is_empty()
    }
}

fn selects(query: &EventQuery, event: &RawEvent) -> bool {
    let parts = split_qualified_type(&event.event_type);
    match query {
        EventQuery::MoveModule { package, module } => {
            let emitting_package = event.package_id.as_deref().or(parts.package_id);
            let emitting_module = event.transaction_module.as_deref().or(parts.module);
            emitting_package == Some(package.as_str()) && emitting_module == Some(module.as_str())
        }
        EventQuery::MoveEventModule { package, module } => {
            parts.package_id == Some(package.as_str()) && parts.module == Some(module.as_str())
        }
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn query_events(
        &self,
        query: &EventQuery,
        cursor: Option<&EventCursor>,
        limit: usize,
        order: QueryOrder,
    ) -> LedgerResult<EventPage> {
        let mut state = self.state.lock();
        state.queries.push(RecordedQuery {
            query: query.clone(),
            cursor: cursor.cloned(),
            limit,
            order,
        });

        if let Some(reason) = state.failures.pop_front() {
            return Err(LedgerError::Transport(reason));
        }

        let matching: Vec<&RawEvent> = state.history.iter().filter(|e| selects(query, e)).collect();

        let start = match cursor {
            None => None,
            Some(cursor) => Some(
                matching
                    .iter()
                    .position(|e| &e.id == cursor)
                    .ok_or_else(|| LedgerError::Rpc {
                        code: -32602,
                        message: format!("unknown cursor {cursor}"),
                    })?,
            ),
        };

        let candidates: Vec<&RawEvent> = match (order, start) {
            (QueryOrder::Ascending, None) => matching,
            (QueryOrder::Ascending, Some(at)) => matching[at + 1..].to_vec(),
            (QueryOrder::Descending, None) => matching.into_iter().rev().collect(),
            (QueryOrder::Descending, Some(at)) => matching[..at].iter().rev().copied().collect(),
        };

        let has_next_page = candidates.len() > limit;
        let data: Vec<RawEvent> = candidates.into_iter().take(limit).cloned().collect();
        let next_cursor = data.last().map(|e| e.id.clone());

        Ok(EventPage {
            data,
            next_cursor,
            has_next_page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(seq: u32, module: &str) -> RawEvent {
        RawEvent {
            id: EventCursor::new(json!({"txDigest": "d", "eventSeq": seq.to_string()})),
            sender: "0xs".to_string(),
            event_type: format!("0xABC::{module}::Tick"),
            timestamp_ms: Some(seq.to_string()),
            parsed_json: json!({}),
            transaction_module: Some(module.to_string()),
            package_id: Some("0xABC".to_string()),
        }
    }

    fn party() -> EventQuery {
        EventQuery::MoveModule {
            package: "0xABC".to_string(),
            module: "party".to_string(),
        }
    }

    fn seqs(page: &EventPage) -> Vec<String> {
        page.data.iter().map(|e| e.timestamp_ms.clone().unwrap()).collect()
    }

    fn ledger() -> MemoryLedger {
        let ledger = MemoryLedger::new();
        for seq in 1..=5 {
            ledger.push(raw(seq, "party"));
        }
        ledger.push(raw(6, "other"));
        ledger
    }

    #[tokio::test]
    async fn test_ascending_after_cursor() {
        let ledger = ledger();
        let cursor = raw(2, "party").id;
        let page = ledger
            .query_events(&party(), Some(&cursor), 2, QueryOrder::Ascending)
            .await
            .unwrap();
        assert_eq!(seqs(&page), ["3", "4"]);
        assert!(page.has_next_page);
        assert_eq!(page.next_cursor, Some(raw(4, "party").id));
    }

    #[tokio::test]
    async fn test_descending_latest() {
        let ledger = ledger();
        let page = ledger
            .query_events(&party(), None, 1, QueryOrder::Descending)
            .await
            .unwrap();
        assert_eq!(seqs(&page), ["5"]);
    }

    #[tokio::test]
    async fn test_other_modules_are_excluded() {
        let ledger = ledger();
        let page = ledger
            .query_events(&party(), None, 50, QueryOrder::Ascending)
            .await
            .unwrap();
        assert_eq!(page.data.len(), 5);
        assert!(!page.has_next_page);
    }

    #[tokio::test]
    async fn test_failure_injection_and_log() {
        let ledger = ledger();
        ledger.fail_next("node down");

        let err = ledger
            .query_events(&party(), None, 50, QueryOrder::Ascending)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Transport(reason) if reason == "node down"));
        assert!(ledger
            .query_events(&party(), None, 50, QueryOrder::Ascending)
            .await
            .is_ok());
        assert_eq!(ledger.queries().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_cursor_is_rejected() {
        let ledger = ledger();
        let cursor = EventCursor::new(json!("nowhere"));
        let err = ledger
            .query_events(&party(), Some(&cursor), 50, QueryOrder::Ascending)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rpc { code: -32602, .. }));
    }
}
