//! JSON-RPC 2.0 ledger client over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use partyline_shared::EventCursor;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{EventPage, EventQuery, LedgerClient, QueryOrder};
use crate::error::{LedgerError, LedgerResult};

/// RPC method for historical event queries.
pub const QUERY_EVENTS_METHOD: &str = "iotax_queryEvents";

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Ledger client speaking JSON-RPC to a full node.
#[derive(Debug)]
pub struct JsonRpcLedgerClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcLedgerClient {
    /// Creates a client for the node at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Transport`] when the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> LedgerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(Self::with_client(http, url))
    }

    /// Creates a client reusing an existing HTTP client.
    #[must_use]
    pub fn with_client(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Node endpoint.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> LedgerResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});

        debug!(id, method, url = %self.url, "ledger call");

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;

        if let Some(error) = envelope.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        envelope
            .result
            .ok_or_else(|| LedgerError::Decode("response has neither result nor error".to_owned()))
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedgerClient {
    async fn query_events(
        &self,
        query: &EventQuery,
        cursor: Option<&EventCursor>,
        limit: usize,
        order: QueryOrder,
    ) -> LedgerResult<EventPage> {
        self.call(
            QUERY_EVENTS_METHOD,
            json!([query, cursor, limit, order.is_descending()]),
        )
        .await
    }
}
