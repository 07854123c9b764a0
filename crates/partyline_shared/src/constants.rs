//! # Endpoint & Timing Constants
//!
//! Defaults used when a configuration value is not supplied.

use std::time::Duration;

// =============================================================================
// ENDPOINTS
// =============================================================================

/// Default push endpoint (GraphQL over WebSocket).
pub const DEFAULT_PUSH_URL: &str = "wss://api.testnet.iota.cafe/graphql";

/// Default ledger JSON-RPC endpoint (local node).
pub const DEFAULT_RPC_URL: &str = "http://localhost:1769";

// =============================================================================
// PUSH SESSION
// =============================================================================

/// How long to wait for the handshake ack after the socket opens.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(6);

/// How long a socket open may take before it counts as a failure.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Base reconnect delay.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(800);

/// Reconnect delay cap for a standalone session.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Reconnect delay cap used by the stream orchestrator.
pub const STREAM_MAX_DELAY: Duration = Duration::from_secs(20);

/// Reconnect attempts allowed before the session fails for good.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Upper bound (exclusive) of the random jitter added to each backoff delay.
pub const MAX_JITTER_MS: u64 = 200;

// =============================================================================
// PULL (POLLING)
// =============================================================================

/// Pause between two poll ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4);

/// Page size of a delivering poll query.
pub const POLL_PAGE_LIMIT: usize = 50;

/// Page size of the cursor seed query.
pub const SEED_PAGE_LIMIT: usize = 1;

// =============================================================================
// CONSUMER HELPERS
// =============================================================================

/// Number of events kept by [`crate::RecentEvents`] by default.
pub const DEFAULT_RECENT_CAPACITY: usize = 50;

/// Minimum spacing between two refresh notifications.
pub const DEFAULT_REFRESH_WINDOW: Duration = Duration::from_millis(1500);
