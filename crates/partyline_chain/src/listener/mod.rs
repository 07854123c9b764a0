//! # Event Stream
//!
//! Push-first event delivery with automatic fallback to polling.
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────────────────────────────────┐
//!  SubscriptionSession │                                          │
//!  ──SessionEvent────▶ │  orchestrator task                       │
//!                      │   PUSH ──fatal──▶ PULL                   │
//!  CursorPoller        │     ▲               │ (push_retry set)   │
//!  ──PollerEvent─────▶ │     └──retry acked──┘                    │
//!                      │                                          │
//!                      │  filter ─▶ dispatch gate ─▶ on_event     │
//!                      │            (re-entrant)  ─▶ on_status    │
//!                      └──────────────────────────────────────────┘
//! ```
//!
//! Every callback runs under the dispatch gate and only after checking the
//! stopped flag, so once [`StreamHandle::stop`] returns no callback starts
//! again. The gate is re-entrant: callbacks may stop the stream themselves.

use std::cell::RefCell;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver};
use parking_lot::ReentrantMutex;
use partyline_networking::shutdown::{self, ShutdownSignal, ShutdownTrigger};
use partyline_networking::{
    BackoffPolicy, SessionConfig, SessionEvent, SessionFailure, SessionHandle, SocketConnector,
    Subscription, SubscriptionSession,
};
use partyline_shared::constants::{DEFAULT_INITIAL_DELAY, STREAM_MAX_DELAY};
use partyline_shared::{CanonicalEvent, EventFilter, PushState, StreamMode, StreamStatus};
use tokio::sync::mpsc;
use tokio::time::Sleep;
use tracing::{info, warn};

use crate::ledger::LedgerClient;
use crate::poller::{CursorPoller, PollerConfig, PollerEvent, PollerHandle};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Everything a stream needs besides its collaborators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Final gate for every delivered event. Fixed for the stream's lifetime.
    pub filter: EventFilter,
    /// Push session tuning.
    pub session: SessionConfig,
    /// Poller tuning.
    pub poller: PollerConfig,
    /// How often to try push again after failing over. `None` stays on pull.
    pub push_retry_interval: Option<Duration>,
}

impl StreamConfig {
    /// Stream defaults for `filter`: reconnect delays capped at 20s.
    #[must_use]
    pub fn new(filter: EventFilter) -> Self {
        Self {
            filter,
            session: SessionConfig::default()
                .with_backoff(BackoffPolicy::new(DEFAULT_INITIAL_DELAY, STREAM_MAX_DELAY)),
            poller: PollerConfig::default(),
            push_retry_interval: None,
        }
    }

    /// Sets the push session tuning.
    #[must_use]
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Sets the poller tuning.
    #[must_use]
    pub const fn with_poller(mut self, poller: PollerConfig) -> Self {
        self.poller = poller;
        self
    }

    /// Enables periodic push retries after failover.
    #[must_use]
    pub const fn with_push_retry_interval(mut self, interval: Option<Duration>) -> Self {
        self.push_retry_interval = interval;
        self
    }
}

/// Counters for one stream.
#[derive(Debug, Default)]
pub struct StreamStats {
    /// Events handed to `on_event`.
    pub events_delivered: AtomicU64,
    /// Events the filter rejected, pushed or polled.
    pub events_filtered: AtomicU64,
    /// Push to pull switches.
    pub failovers: AtomicU64,
    /// Pull to push switches.
    pub push_restores: AtomicU64,
}

/// One item of a buffered stream.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamUpdate {
    /// A delivered event.
    Event(CanonicalEvent),
    /// A status snapshot.
    Status(StreamStatus),
}

// =============================================================================
// DISPATCH GATE
// =============================================================================

type EventCallback = Box<dyn Fn(&CanonicalEvent) + Send + Sync>;
type StatusCallback = Box<dyn Fn(&StreamStatus) + Send + Sync>;

struct DispatchState {
    stopped: bool,
    status: StreamStatus,
}

struct Dispatcher {
    gate: ReentrantMutex<RefCell<DispatchState>>,
    on_event: EventCallback,
    on_status: StatusCallback,
    stats: Arc<StreamStats>,
}

impl Dispatcher {
    fn new(on_event: EventCallback, on_status: StatusCallback) -> Self {
        Self {
            gate: ReentrantMutex::new(RefCell::new(DispatchState {
                stopped: false,
                status: StreamStatus::default(),
            })),
            on_event,
            on_status,
            stats: Arc::new(StreamStats::default()),
        }
    }

    fn status(&self) -> StreamStatus {
        self.gate.lock().borrow().status.clone()
    }

    fn is_stopped(&self) -> bool {
        self.gate.lock().borrow().stopped
    }

    fn deliver(&self, event: &CanonicalEvent) {
        let guard = self.gate.lock();
        if guard.borrow().stopped {
            return;
        }
        self.stats.events_delivered.fetch_add(1, Ordering::Relaxed);
        (self.on_event)(event);
    }

    /// Applies `change` and publishes the result if anything changed.
    fn update(&self, change: impl FnOnce(&mut StreamStatus)) {
        let guard = self.gate.lock();
        let snapshot = {
            let mut state = guard.borrow_mut();
            if state.stopped {
                return;
            }
            let before = state.status.clone();
            change(&mut state.status);
            if state.status == before {
                return;
            }
            state.status.clone()
        };
        (self.on_status)(&snapshot);
    }

    /// Marks the stream stopped and publishes the final status once.
    fn stop(&self) -> bool {
        let guard = self.gate.lock();
        let snapshot = {
            let mut state = guard.borrow_mut();
            if state.stopped {
                return false;
            }
            state.stopped = true;
            state.status.push_state = PushState::Closed;
            state.status.pull_active = false;
            state.status.clone()
        };
        (self.on_status)(&snapshot);
        true
    }
}

// =============================================================================
// HANDLES
// =============================================================================

/// Cheap, clonable stop switch for a stream. Usable from inside callbacks.
#[derive(Clone)]
pub struct StreamStopper {
    dispatcher: Arc<Dispatcher>,
    trigger: Arc<ShutdownTrigger>,
}

impl StreamStopper {
    /// Stops the stream. Idempotent; after the first call returns no
    /// callback runs again.
    pub fn stop(&self) {
        if self.dispatcher.stop() {
            info!("event stream stopped");
        }
        self.trigger.trigger();
    }

    /// Returns true once the stream was stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.dispatcher.is_stopped()
    }
}

/// Owner's handle on a running stream. Dropping it stops the stream.
pub struct StreamHandle {
    stopper: StreamStopper,
}

impl StreamHandle {
    /// Stops the stream. Same as [`StreamStopper::stop`].
    pub fn stop(&self) {
        self.stopper.stop();
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> StreamStatus {
        self.stopper.dispatcher.status()
    }

    /// Delivery counters.
    #[must_use]
    pub fn stats(&self) -> Arc<StreamStats> {
        Arc::clone(&self.stopper.dispatcher.stats)
    }

    /// A stop switch that can be moved into callbacks or other tasks.
    #[must_use]
    pub fn stopper(&self) -> StreamStopper {
        self.stopper.clone()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stopper.stop();
    }
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Push/pull event stream.
pub struct EventStream;

impl EventStream {
    /// Starts a stream: push immediately, pull after push gives up.
    ///
    /// `on_event` receives every event that passes the filter, `on_status`
    /// every status change. Both run on the stream's task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn start<E, S>(
        config: StreamConfig,
        connector: Arc<dyn SocketConnector>,
        ledger: Arc<dyn LedgerClient>,
        on_event: E,
        on_status: S,
    ) -> StreamHandle
    where
        E: Fn(&CanonicalEvent) + Send + Sync + 'static,
        S: Fn(&StreamStatus) + Send + Sync + 'static,
    {
        let dispatcher = Arc::new(Dispatcher::new(Box::new(on_event), Box::new(on_status)));
        let (trigger, signal) = shutdown::channel();

        let orchestrator = Orchestrator {
            config,
            connector,
            ledger,
            dispatcher: Arc::clone(&dispatcher),
            mode: StreamMode::Push,
            session: None,
            poller: None,
            retry: None,
        };
        tokio::spawn(orchestrator.run(signal));

        StreamHandle {
            stopper: StreamStopper {
                dispatcher,
                trigger: Arc::new(trigger),
            },
        }
    }

    /// Starts a stream whose updates land in a bounded channel.
    ///
    /// Updates that do not fit are dropped rather than blocking the stream.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn start_buffered(
        config: StreamConfig,
        connector: Arc<dyn SocketConnector>,
        ledger: Arc<dyn LedgerClient>,
        capacity: usize,
    ) -> (StreamHandle, Receiver<StreamUpdate>) {
        let (sender, receiver) = bounded(capacity);
        let event_sender = sender.clone();

        let handle = Self::start(
            config,
            connector,
            ledger,
            move |event| {
                let _ = event_sender.try_send(StreamUpdate::Event(event.clone()));
            },
            move |status| {
                let _ = sender.try_send(StreamUpdate::Status(status.clone()));
            },
        );

        (handle, receiver)
    }
}

// =============================================================================
// ORCHESTRATOR
// =============================================================================

type Child<H, E> = Option<(H, mpsc::UnboundedReceiver<E>)>;

struct Orchestrator {
    config: StreamConfig,
    connector: Arc<dyn SocketConnector>,
    ledger: Arc<dyn LedgerClient>,
    dispatcher: Arc<Dispatcher>,
    mode: StreamMode,
    session: Child<SessionHandle, SessionEvent>,
    poller: Child<PollerHandle, PollerEvent>,
    retry: Option<Pin<Box<Sleep>>>,
}

/// Next event of a child, or never when there is no child.
async fn next_from<H, E>(child: &mut Child<H, E>) -> Option<E> {
    match child {
        Some((_, events)) => events.recv().await,
        None => std::future::pending().await,
    }
}

/// Fires when the retry timer is armed and due; never otherwise.
async fn retry_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

impl Orchestrator {
    async fn run(mut self, mut shutdown: ShutdownSignal) {
        info!(
            package = %self.config.filter.package_id,
            module = %self.config.filter.module,
            "event stream starting"
        );
        self.start_session();

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                event = next_from(&mut self.session) => match event {
                    Some(event) => self.on_session_event(event),
                    None => self.on_session_gone(),
                },
                event = next_from(&mut self.poller) => match event {
                    Some(event) => self.on_poller_event(event),
                    None => {
                        self.poller = None;
                        self.dispatcher.update(|s| s.pull_active = false);
                    }
                },
                () = retry_due(&mut self.retry) => {
                    self.retry = None;
                    if self.session.is_none() {
                        info!("probing push subscription");
                        self.start_session();
                    }
                }
            }
        }

        if let Some((session, _)) = self.session.take() {
            session.stop();
        }
        if let Some((poller, _)) = self.poller.take() {
            poller.stop();
        }
    }

    fn start_session(&mut self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = SubscriptionSession::spawn(
            self.config.session.clone(),
            Subscription::for_filter(&self.config.filter),
            Arc::clone(&self.connector),
            sender,
        );
        self.session = Some((handle, receiver));
    }

    fn start_poller(&mut self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = CursorPoller::spawn(
            self.config.poller,
            self.config.filter.clone(),
            Arc::clone(&self.ledger),
            sender,
        );
        self.poller = Some((handle, receiver));
    }

    fn arm_retry(&mut self) {
        self.retry = self
            .config
            .push_retry_interval
            .map(|interval| Box::pin(tokio::time::sleep(interval)));
    }

    fn forward(&self, event: &CanonicalEvent) {
        if self.config.filter.matches(event) {
            self.dispatcher.deliver(event);
        } else {
            self.dispatcher
                .stats
                .events_filtered
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::State { state, dialect } => {
                let restore = state == PushState::Connected && self.mode == StreamMode::Pull;
                if restore {
                    self.restore_push();
                }
                self.dispatcher.update(|status| {
                    status.push_state = state;
                    status.push_dialect = dialect;
                    if restore {
                        status.mode = StreamMode::Push;
                        status.pull_active = false;
                    }
                });
            }
            SessionEvent::Event(event) => self.forward(&event),
            SessionEvent::Error(reason) => {
                self.dispatcher.update(|status| status.last_error = Some(reason));
            }
            SessionEvent::Fatal(failure) => self.on_session_failed(&failure),
        }
    }

    fn on_session_gone(&mut self) {
        let failure = SessionFailure {
            attempts: 0,
            reason: "push session ended unexpectedly".to_owned(),
        };
        self.on_session_failed(&failure);
    }

    fn on_session_failed(&mut self, failure: &SessionFailure) {
        self.session = None;

        match self.mode {
            StreamMode::Push => {
                warn!(
                    attempts = failure.attempts,
                    reason = %failure.reason,
                    "push unavailable, falling back to polling"
                );
                self.mode = StreamMode::Pull;
                self.dispatcher.stats.failovers.fetch_add(1, Ordering::Relaxed);
                self.start_poller();
                self.dispatcher.update(|status| {
                    status.mode = StreamMode::Pull;
                    status.push_state = PushState::Failed;
                    status.pull_active = true;
                    status.last_error = Some(failure.to_string());
                });
            }
            StreamMode::Pull => {
                warn!(reason = %failure.reason, "push retry failed, staying on polling");
                self.dispatcher.update(|status| {
                    status.push_state = PushState::Failed;
                    status.last_error = Some(failure.to_string());
                });
            }
        }

        self.arm_retry();
    }

    fn restore_push(&mut self) {
        if let Some((poller, _)) = self.poller.take() {
            poller.stop();
        }
        self.retry = None;
        self.mode = StreamMode::Push;
        self.dispatcher
            .stats
            .push_restores
            .fetch_add(1, Ordering::Relaxed);
        info!("push subscription restored, polling stopped");
    }

    fn on_poller_event(&mut self, event: PollerEvent) {
        match event {
            PollerEvent::Event(event) => self.forward(&event),
            PollerEvent::Error(reason) => {
                self.dispatcher.update(|status| status.last_error = Some(reason));
            }
            PollerEvent::Filtered(count) => {
                self.dispatcher
                    .stats
                    .events_filtered
                    .fetch_add(u64::try_from(count).unwrap_or(u64::MAX), Ordering::Relaxed);
            }
        }
    }
}
