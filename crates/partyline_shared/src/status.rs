//! # Stream Status
//!
//! The snapshot handed to the consumer every time the stream changes shape.

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;

/// Which path is currently delivering events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamMode {
    /// The push subscription.
    #[default]
    Push,
    /// The cursor poller.
    Pull,
}

/// Lifecycle of a push session.
///
/// ```text
/// IDLE ─▶ CONNECTING ─▶ CONNECTED
///             ▲   │          │
///             │   ▼          ▼
///          RECONNECTING ◀────┘
///             │
///             ▼
///           FAILED          (any) ─stop─▶ CLOSED
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PushState {
    /// Not started.
    #[default]
    Idle,
    /// Opening the socket or waiting for the ack.
    Connecting,
    /// Acknowledged and subscribed.
    Connected,
    /// Waiting out a backoff delay.
    Reconnecting,
    /// Gave up after exhausting its attempts.
    Failed,
    /// Stopped by its owner.
    Closed,
}

impl PushState {
    /// Returns true for states a session never leaves.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

/// Status snapshot reported to the consumer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    /// Which path is delivering.
    pub mode: StreamMode,
    /// Last known push session state.
    pub push_state: PushState,
    /// Last known push dialect.
    pub push_dialect: Dialect,
    /// Whether the poller is running.
    pub pull_active: bool,
    /// Most recent error, if any.
    pub last_error: Option<String>,
}
