//! # Subscription Session
//!
//! Owns one logical push subscription across any number of physical sockets.
//!
//! ## Lifecycle
//!
//! ```text
//!            ┌────────────── ack ──────────────┐
//!            │                                 ▼
//! IDLE ─▶ CONNECTING ──(ack timeout,      CONNECTED ──(error/complete/close)──┐
//!            ▲          error, close)─┐                                       │
//!            │                        ▼                                       │
//!            └──── delay ───── RECONNECTING ◀──────────────────────────────────┘
//!                                     │
//!                        attempts exhausted
//!                                     ▼
//!                                  FAILED            stop (any state) ─▶ CLOSED
//! ```
//!
//! ## Reconnect accounting
//!
//! The attempt counter resets to zero on every ack. On a failure, if the
//! counter already reached `max_attempts` the session fails for good;
//! otherwise the delay is computed from the current counter, the counter is
//! incremented and the session reconnects after the delay.
//!
//! The session runs as its own tokio task and reports through an unbounded
//! channel of [`SessionEvent`]s.

use std::sync::Arc;
use std::time::Duration;

use partyline_shared::constants::{
    DEFAULT_ACK_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_ATTEMPTS, DEFAULT_PUSH_URL,
};
use partyline_shared::{
    parse_subscription_payload, subscription_error, CanonicalEvent, Dialect, EventSource,
    PushState,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::error::{SessionFailure, TransportError};
use crate::protocol::{self, Frame, Subscription};
use crate::shutdown::{self, ShutdownSignal, ShutdownTrigger};
use crate::transport::{SocketConnection, SocketConnector, SocketFrame};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Session tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Push endpoint.
    pub url: String,
    /// Time allowed between socket open and `connection_ack`.
    pub ack_timeout: Duration,
    /// Time allowed for the socket open itself.
    pub connect_timeout: Duration,
    /// Reconnect delays.
    pub backoff: BackoffPolicy,
    /// Reconnects allowed without an ack in between.
    pub max_attempts: u32,
    /// Log every frame at debug level.
    pub debug: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PUSH_URL.to_owned(),
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            backoff: BackoffPolicy::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            debug: false,
        }
    }
}

impl SessionConfig {
    /// Default tuning against `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Sets the ack timeout.
    #[must_use]
    pub const fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the backoff policy.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Enables per-frame debug logging.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

// =============================================================================
// EVENTS & HANDLE
// =============================================================================

/// What a session reports to its owner.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The session changed state or learned its dialect.
    State {
        /// New state.
        state: PushState,
        /// Dialect of the current (or last) connection.
        dialect: Dialect,
    },
    /// A pushed event.
    Event(CanonicalEvent),
    /// A recoverable problem (the session keeps going).
    Error(String),
    /// The attempt budget is exhausted. Always the last event.
    Fatal(SessionFailure),
}

/// Owner's grip on a spawned session. Dropping it stops the session.
#[derive(Debug)]
pub struct SessionHandle {
    trigger: ShutdownTrigger,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Asks the session to unsubscribe, close its socket and finish.
    pub fn stop(&self) {
        self.trigger.trigger();
    }

    /// Returns true once the session task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the session task to end without stopping it.
    pub async fn join(self) {
        let Self { trigger, task } = self;
        let _ = task.await;
        drop(trigger);
    }
}

// =============================================================================
// SESSION
// =============================================================================

enum Outcome {
    Stopped,
    Lost(String),
}

/// One push subscription with reconnect logic.
pub struct SubscriptionSession {
    config: SessionConfig,
    subscription: Subscription,
    connector: Arc<dyn SocketConnector>,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: PushState,
    dialect: Dialect,
    attempt: u32,
}

impl SubscriptionSession {
    /// Creates an idle session.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        subscription: Subscription,
        connector: Arc<dyn SocketConnector>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            config,
            subscription,
            connector,
            events,
            state: PushState::Idle,
            dialect: Dialect::Unknown,
            attempt: 0,
        }
    }

    /// Creates a session and runs it on its own task.
    #[must_use]
    pub fn spawn(
        config: SessionConfig,
        subscription: Subscription,
        connector: Arc<dyn SocketConnector>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> SessionHandle {
        let (trigger, signal) = shutdown::channel();
        let session = Self::new(config, subscription, connector, events);
        let task = tokio::spawn(session.run(signal));
        SessionHandle { trigger, task }
    }

    /// Drives the session until it is stopped or fails.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        info!(
            url = %self.config.url,
            id = self.subscription.id(),
            "push session starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            self.set_state(PushState::Connecting);

            let reason = match self.connect_and_serve(&mut shutdown).await {
                Outcome::Stopped => break,
                Outcome::Lost(reason) => reason,
            };

            if shutdown.is_cancelled() {
                break;
            }

            if self.attempt >= self.config.max_attempts {
                warn!(attempts = self.attempt, reason = %reason, "push session failed");
                self.set_state(PushState::Failed);
                self.emit(SessionEvent::Fatal(SessionFailure {
                    attempts: self.attempt,
                    reason,
                }));
                return;
            }

            let delay = self.config.backoff.delay(self.attempt);
            self.attempt += 1;

            warn!(
                attempt = self.attempt,
                delay = ?delay,
                reason = %reason,
                "push connection lost, reconnecting"
            );
            self.emit(SessionEvent::Error(reason));
            self.set_state(PushState::Reconnecting);

            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(PushState::Closed);
        info!(id = self.subscription.id(), "push session closed");
    }

    /// One physical connection: open, handshake, serve until it ends.
    async fn connect_and_serve(&mut self, shutdown: &mut ShutdownSignal) -> Outcome {
        let timeout = self.config.connect_timeout;
        let opened = tokio::select! {
            biased;
            () = shutdown.cancelled() => return Outcome::Stopped,
            opened = tokio::time::timeout(
                timeout,
                self.connector.connect(&self.config.url, &Dialect::OFFERED),
            ) => opened,
        };

        let mut connection = match opened {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => return Outcome::Lost(e.to_string()),
            Err(_) => return Outcome::Lost(TransportError::Timeout(timeout).to_string()),
        };

        let dialect = Dialect::from_protocol(connection.protocol());
        if dialect != self.dialect {
            self.dialect = dialect;
            self.publish_state();
        }
        debug!(dialect = ?self.dialect, "push socket open");

        if let Err(e) = connection.send_text(protocol::encode_init()).await {
            return Outcome::Lost(e.to_string());
        }

        let ack_deadline = tokio::time::sleep(self.config.ack_timeout);
        tokio::pin!(ack_deadline);
        let mut acknowledged = false;

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    if acknowledged {
                        let unsubscribe =
                            protocol::encode_unsubscribe(self.dialect, self.subscription.id());
                        let _ = connection.send_text(unsubscribe).await;
                    }
                    let _ = connection.close().await;
                    return Outcome::Stopped;
                }
                () = &mut ack_deadline, if !acknowledged => {
                    let _ = connection.close().await;
                    return Outcome::Lost(format!(
                        "no connection ack within {:?}",
                        self.config.ack_timeout
                    ));
                }
                received = connection.recv() => match received {
                    Ok(SocketFrame::Text(text)) => {
                        if let Some(outcome) =
                            self.handle_frame(connection.as_mut(), &text, &mut acknowledged).await
                        {
                            let _ = connection.close().await;
                            return outcome;
                        }
                    }
                    Ok(SocketFrame::Closed { code, reason }) => {
                        return Outcome::Lost(describe_close(code, &reason));
                    }
                    Err(e) => return Outcome::Lost(e.to_string()),
                },
            }
        }
    }

    /// Handles one text frame. Returns an outcome when the connection must end.
    async fn handle_frame(
        &mut self,
        connection: &mut dyn SocketConnection,
        text: &str,
        acknowledged: &mut bool,
    ) -> Option<Outcome> {
        if self.config.debug {
            debug!(frame = text, "push frame");
        }

        match protocol::decode(self.dialect, text) {
            Frame::Ack => {
                if *acknowledged {
                    return None;
                }
                *acknowledged = true;
                self.attempt = 0;
                self.set_state(PushState::Connected);
                info!(dialect = ?self.dialect, id = self.subscription.id(), "push session connected");

                let subscribe = protocol::encode_subscribe(
                    self.dialect,
                    self.subscription.id(),
                    self.subscription.query(),
                    self.subscription.variables(),
                );
                connection
                    .send_text(subscribe)
                    .await
                    .err()
                    .map(|e| Outcome::Lost(e.to_string()))
            }
            Frame::Data { id, payload } => {
                if !*acknowledged || id.as_deref() != Some(self.subscription.id()) {
                    return None;
                }
                if let Some(message) = subscription_error(&payload) {
                    warn!(reason = %message, "subscription payload carried errors");
                    self.emit(SessionEvent::Error(message));
                    return None;
                }
                for event in parse_subscription_payload(&payload, EventSource::Push) {
                    self.emit(SessionEvent::Event(event));
                }
                None
            }
            Frame::Error { id, payload } => {
                if id.as_deref().is_some_and(|id| id != self.subscription.id()) {
                    return None;
                }
                Some(Outcome::Lost(protocol::error_reason(&payload)))
            }
            Frame::Complete { id } => (id.as_deref() == Some(self.subscription.id()))
                .then(|| Outcome::Lost("subscription completed by server".to_owned())),
            Frame::Ping { payload } => connection
                .send_text(protocol::encode_pong(payload.as_ref()))
                .await
                .err()
                .map(|e| Outcome::Lost(e.to_string())),
            Frame::KeepAlive | Frame::Pong | Frame::Unknown => None,
        }
    }

    fn set_state(&mut self, state: PushState) {
        self.state = state;
        self.publish_state();
    }

    fn publish_state(&self) {
        self.emit(SessionEvent::State {
            state: self.state,
            dialect: self.dialect,
        });
    }

    fn emit(&self, event: SessionEvent) {
        // The owner may already be gone; the shutdown signal ends the task then.
        let _ = self.events.send(event);
    }
}

fn describe_close(code: Option<u16>, reason: &str) -> String {
    match (code, reason.is_empty()) {
        (Some(code), false) => format!("socket closed ({code}): {reason}"),
        (Some(code), true) => format!("socket closed ({code})"),
        (None, false) => format!("socket closed: {reason}"),
        (None, true) => "socket closed".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.url, DEFAULT_PUSH_URL);
        assert_eq!(config.ack_timeout, Duration::from_secs(6));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.backoff.initial_delay, Duration::from_millis(800));
        assert!(!config.debug);
    }

    #[test]
    fn test_describe_close() {
        assert_eq!(describe_close(Some(1000), "bye"), "socket closed (1000): bye");
        assert_eq!(describe_close(Some(1006), ""), "socket closed (1006)");
        assert_eq!(describe_close(None, ""), "socket closed");
    }
}
