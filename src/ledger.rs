//! Append-only bounded ledger of classified fault events.
//!
//! The ledger is the engine's only memory of past faults: a FIFO ring of
//! the most recent events plus monotonic counters that survive eviction.
//! Every aggregate query scans a caller-supplied recency window, which is
//! cheap because capacity is small and bounded.
//!
//! The ledger itself is not synchronized; the orchestrator owns it and
//! wraps it in a mutex (short critical sections, no awaits held across).

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fault::{FaultCategory, Severity};

/// A classified fault, as retained by the ledger.
///
/// Created when a raw fault is classified; mutated exactly once, when
/// recovery succeeds; never deleted individually, only evicted FIFO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultEvent {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the originating fault was classified.
    pub timestamp: DateTime<Utc>,
    /// Category from classification.
    pub category: FaultCategory,
    /// Severity after any stability escalation.
    pub severity: Severity,
    /// Originating component or context label.
    pub component: String,
    /// Whether a recovery strategy resolved this fault.
    pub resolved: bool,
    /// Time from classification to successful recovery.
    pub resolution_latency_ms: Option<u64>,
}

impl FaultEvent {
    /// Build an unresolved event with a fresh id.
    pub fn new(
        timestamp: DateTime<Utc>,
        category: FaultCategory,
        severity: Severity,
        component: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            category,
            severity,
            component: component.into(),
            resolved: false,
            resolution_latency_ms: None,
        }
    }

    /// Whether this event falls inside the window ending at `now`.
    fn in_window(&self, now: DateTime<Utc>, within: Duration) -> bool {
        let age = now.signed_duration_since(self.timestamp);
        age >= Duration::zero() && age <= within
    }
}

/// Bounded FIFO log of fault events with rolling aggregates.
#[derive(Debug)]
pub struct FaultLedger {
    events: VecDeque<FaultEvent>,
    capacity: usize,
    total_recorded: u64,
}

impl FaultLedger {
    /// Create a ledger holding at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            total_recorded: 0,
        }
    }

    /// Append an event, evicting the oldest once capacity is exceeded.
    pub fn record(&mut self, event: FaultEvent) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
        self.total_recorded = self.total_recorded.saturating_add(1);
    }

    /// Flip an event to resolved and record its latency.
    ///
    /// Returns `false` if the event was evicted or already resolved;
    /// resolution is recorded at most once per event.
    pub fn mark_resolved(&mut self, id: Uuid, latency_ms: u64) -> bool {
        for event in &mut self.events {
            if event.id == id {
                if event.resolved {
                    return false;
                }
                event.resolved = true;
                event.resolution_latency_ms = Some(latency_ms);
                return true;
            }
        }
        false
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the ledger holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Configured capacity bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Monotonic count of every event ever recorded, eviction included.
    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    /// Retained events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &FaultEvent> {
        self.events.iter()
    }

    /// Events within the window ending at `now`, oldest first.
    pub fn window(&self, now: DateTime<Utc>, within: Duration) -> Vec<&FaultEvent> {
        self.events
            .iter()
            .filter(|e| e.in_window(now, within))
            .collect()
    }

    /// Count of events within the window.
    pub fn count_in_window(&self, now: DateTime<Utc>, within: Duration) -> usize {
        self.count_matching(now, within, |_| true)
    }

    /// Count of windowed events satisfying `pred`.
    pub fn count_matching<F>(&self, now: DateTime<Utc>, within: Duration, pred: F) -> usize
    where
        F: Fn(&FaultEvent) -> bool,
    {
        self.events
            .iter()
            .filter(|e| e.in_window(now, within) && pred(e))
            .count()
    }

    /// Windowed event counts keyed by category.
    pub fn count_by_category(
        &self,
        now: DateTime<Utc>,
        within: Duration,
    ) -> BTreeMap<FaultCategory, usize> {
        let mut counts = BTreeMap::new();
        for event in self.events.iter().filter(|e| e.in_window(now, within)) {
            let entry: &mut usize = counts.entry(event.category).or_default();
            *entry = entry.saturating_add(1);
        }
        counts
    }

    /// The category with the most windowed events, if any.
    pub fn most_frequent_category(
        &self,
        now: DateTime<Utc>,
        within: Duration,
    ) -> Option<FaultCategory> {
        let counts = self.count_by_category(now, within);
        let mut best: Option<(FaultCategory, usize)> = None;
        for (category, count) in counts {
            match best {
                Some((_, best_count)) if count <= best_count => {}
                _ => best = Some((category, count)),
            }
        }
        best.map(|(category, _)| category)
    }

    /// Count of windowed events marked resolved.
    pub fn resolved_count(&self, now: DateTime<Utc>, within: Duration) -> usize {
        self.count_matching(now, within, |e| e.resolved)
    }

    /// Drop every retained event and reset the monotonic counter.
    pub fn clear(&mut self) {
        self.events.clear();
        self.total_recorded = 0;
    }
}
