//! Consumer-side helpers: a bounded recent-events list and a refresh throttle.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::constants::{DEFAULT_RECENT_CAPACITY, DEFAULT_REFRESH_WINDOW};
use crate::events::CanonicalEvent;

/// Newest-first list of the last N delivered events.
#[derive(Clone, Debug)]
pub struct RecentEvents {
    capacity: usize,
    events: VecDeque<CanonicalEvent>,
}

impl Default for RecentEvents {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_CAPACITY)
    }
}

impl RecentEvents {
    /// Creates an empty list holding at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity),
        }
    }

    /// Adds an event at the front, evicting the oldest past capacity.
    pub fn push(&mut self, event: CanonicalEvent) {
        if self.capacity == 0 {
            return;
        }
        self.events.push_front(event);
        self.events.truncate(self.capacity);
    }

    /// Newest event first.
    pub fn iter(&self) -> impl Iterator<Item = &CanonicalEvent> {
        self.events.iter()
    }

    /// Most recent event.
    #[must_use]
    pub fn latest(&self) -> Option<&CanonicalEvent> {
        self.events.front()
    }

    /// Number of events held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true when nothing has been pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drops every held event.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// Lets at most one refresh through per window.
#[derive(Clone, Debug)]
pub struct RefreshThrottle {
    window: Duration,
    last_fired: Option<Instant>,
}

impl Default for RefreshThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_WINDOW)
    }
}

impl RefreshThrottle {
    /// Creates a throttle with the given minimum spacing.
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            last_fired: None,
        }
    }

    /// Returns true (and records `now`) when a refresh may fire.
    pub fn try_fire(&mut self, now: Instant) -> bool {
        let allowed = self
            .last_fired
            .map_or(true, |last| now.saturating_duration_since(last) >= self.window);
        if allowed {
            self.last_fired = Some(now);
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventCursor, EventSource, RawEvent};
    use serde_json::json;

    fn event(name: &str) -> CanonicalEvent {
        let raw = RawEvent {
            id: EventCursor::new(json!(name)),
            sender: "0xs".to_string(),
            event_type: format!("0x1::m::{name}"),
            timestamp_ms: None,
            parsed_json: json!({}),
            transaction_module: None,
            package_id: None,
        };
        CanonicalEvent::from_raw(&raw, EventSource::Pull)
    }

    #[test]
    fn test_recent_events_newest_first_and_bounded() {
        let mut recent = RecentEvents::new(2);
        recent.push(event("A"));
        recent.push(event("B"));
        recent.push(event("C"));

        let names: Vec<_> = recent.iter().map(CanonicalEvent::struct_name).collect();
        assert_eq!(names, ["C", "B"]);
        assert_eq!(recent.latest().map(CanonicalEvent::struct_name), Some("C"));
    }

    #[test]
    fn test_zero_capacity_holds_nothing() {
        let mut recent = RecentEvents::new(0);
        recent.push(event("A"));
        assert!(recent.is_empty());
    }

    #[test]
    fn test_throttle_window() {
        let start = Instant::now();
        let mut throttle = RefreshThrottle::new(Duration::from_millis(1500));

        assert!(throttle.try_fire(start));
        assert!(!throttle.try_fire(start + Duration::from_millis(1000)));
        assert!(throttle.try_fire(start + Duration::from_millis(1500)));
        assert!(!throttle.try_fire(start + Duration::from_millis(2000)));
    }
}
