//! # Cursor Poller
//!
//! Pull side of the stream: pages through the ledger history from a cursor.
//!
//! ```text
//! tick 0   seed:  query(desc, limit 1)         cursor := newest id  (nothing delivered)
//! tick n   pull:  query(asc,  limit 50, after cursor)
//!                 for each event: normalize ─▶ filter ─▶ deliver?  cursor := event id
//! ```
//!
//! The cursor only moves forward, also past events the filter rejects, so an
//! event is never delivered twice within one polling run. Query failures are
//! reported and the next tick simply tries again.

use std::sync::Arc;
use std::time::Duration;

use partyline_networking::shutdown::{self, ShutdownSignal, ShutdownTrigger};
use partyline_shared::constants::{DEFAULT_POLL_INTERVAL, POLL_PAGE_LIMIT, SEED_PAGE_LIMIT};
use partyline_shared::{CanonicalEvent, EventCursor, EventFilter, EventSource};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::LedgerResult;
use crate::ledger::{EventQuery, LedgerClient, QueryOrder};

/// Poller tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollerConfig {
    /// Pause between ticks.
    pub interval: Duration,
    /// Page size of a delivering query.
    pub page_limit: usize,
    /// Skip the existing history and only deliver events newer than the
    /// latest one at start.
    pub start_from_latest: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            page_limit: POLL_PAGE_LIMIT,
            start_from_latest: true,
        }
    }
}

impl PollerConfig {
    /// Sets the tick interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets whether to start from the latest event.
    #[must_use]
    pub const fn with_start_from_latest(mut self, start_from_latest: bool) -> Self {
        self.start_from_latest = start_from_latest;
        self
    }
}

/// What a poller reports to its owner.
#[derive(Clone, Debug, PartialEq)]
pub enum PollerEvent {
    /// A historical event that passed the filter.
    Event(CanonicalEvent),
    /// A tick failed. Polling continues.
    Error(String),
    /// How many events of one tick the filter rejected.
    Filtered(usize),
}

/// Owner's grip on a spawned poller. Dropping it stops the poller.
#[derive(Debug)]
pub struct PollerHandle {
    trigger: ShutdownTrigger,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stops polling. A tick in flight is abandoned; its query result is
    /// dropped and nothing more is delivered.
    pub fn stop(&self) {
        self.trigger.trigger();
    }

    /// Returns true once the poller task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Cursor-based history poller.
pub struct CursorPoller {
    config: PollerConfig,
    filter: EventFilter,
    query: EventQuery,
    ledger: Arc<dyn LedgerClient>,
    events: mpsc::UnboundedSender<PollerEvent>,
    cursor: Option<EventCursor>,
    seeded: bool,
}

impl CursorPoller {
    /// Creates a poller that has not fetched anything yet.
    #[must_use]
    pub fn new(
        config: PollerConfig,
        filter: EventFilter,
        ledger: Arc<dyn LedgerClient>,
        events: mpsc::UnboundedSender<PollerEvent>,
    ) -> Self {
        let query = EventQuery::for_filter(&filter);
        Self {
            config,
            filter,
            query,
            ledger,
            events,
            cursor: None,
            seeded: !config.start_from_latest,
        }
    }

    /// Creates a poller and runs it on its own task.
    #[must_use]
    pub fn spawn(
        config: PollerConfig,
        filter: EventFilter,
        ledger: Arc<dyn LedgerClient>,
        events: mpsc::UnboundedSender<PollerEvent>,
    ) -> PollerHandle {
        let (trigger, signal) = shutdown::channel();
        let poller = Self::new(config, filter, ledger, events);
        let task = tokio::spawn(poller.run(signal));
        PollerHandle { trigger, task }
    }

    /// Position of the last consumed event.
    #[must_use]
    pub const fn cursor(&self) -> Option<&EventCursor> {
        self.cursor.as_ref()
    }

    /// Ticks every interval until stopped. The first tick runs immediately.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        info!(interval = ?self.config.interval, "polling started");

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                result = self.tick() => result,
            };

            if let Err(e) = result {
                warn!(error = %e, "poll tick failed");
                let _ = self.events.send(PollerEvent::Error(e.to_string()));
            }
        }

        info!("polling stopped");
    }

    /// Runs one tick. Returns how many events were delivered.
    ///
    /// # Errors
    ///
    /// Returns the ledger error of a failed query. The cursor is unchanged then.
    pub async fn tick(&mut self) -> LedgerResult<usize> {
        if !self.seeded {
            let page = self
                .ledger
                .query_events(&self.query, None, SEED_PAGE_LIMIT, QueryOrder::Descending)
                .await?;
            self.cursor = page.data.first().map(|event| event.id.clone());
            self.seeded = true;
            debug!(cursor = ?self.cursor, "poll cursor seeded");
            return Ok(0);
        }

        let page = self
            .ledger
            .query_events(
                &self.query,
                self.cursor.as_ref(),
                self.config.page_limit,
                QueryOrder::Ascending,
            )
            .await?;

        let mut delivered = 0;
        let mut rejected = 0;
        for raw in &page.data {
            let event = CanonicalEvent::from_raw(raw, EventSource::Pull);
            if self.filter.matches(&event) {
                let _ = self.events.send(PollerEvent::Event(event));
                delivered += 1;
            } else {
                rejected += 1;
            }
            self.cursor = Some(raw.id.clone());
        }

        if rejected > 0 {
            let _ = self.events.send(PollerEvent::Filtered(rejected));
        }
        if !page.data.is_empty() {
            debug!(fetched = page.data.len(), delivered, rejected, "poll tick");
        }
        Ok(delivered)
    }
}
