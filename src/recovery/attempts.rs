//! Per-fingerprint recovery attempt accounting.
//!
//! Attempts are correlated by fault fingerprint and counted over a
//! sliding horizon: attempts older than the horizon stop counting toward
//! the budget, so a fault that went quiet earns a fresh budget without
//! any explicit reset. Entries are pruned on access and empty
//! fingerprints are dropped, which keeps the table bounded by the set of
//! faults active within one horizon.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};

/// Sliding-window attempt counter keyed by fault fingerprint.
///
/// Not synchronized; the orchestrator owns it behind the same mutex as
/// the ledger.
#[derive(Debug)]
pub struct AttemptTracker {
    horizon: Duration,
    attempts: HashMap<String, VecDeque<DateTime<Utc>>>,
}

impl AttemptTracker {
    /// Create a tracker whose attempts expire after `horizon`.
    pub fn new(horizon: Duration) -> Self {
        Self {
            horizon,
            attempts: HashMap::new(),
        }
    }

    /// Attempts within the horizon for this fingerprint.
    ///
    /// Prunes expired entries as a side effect.
    pub fn count(&mut self, fingerprint: &str, now: DateTime<Utc>) -> u32 {
        self.prune(fingerprint, now);
        let count = self
            .attempts
            .get(fingerprint)
            .map_or(0, VecDeque::len);
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Record an attempt for this fingerprint.
    pub fn record(&mut self, fingerprint: &str, now: DateTime<Utc>) {
        self.attempts
            .entry(fingerprint.to_owned())
            .or_default()
            .push_back(now);
    }

    /// Timestamp of the most recent attempt within the horizon.
    pub fn last_attempt(&mut self, fingerprint: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.prune(fingerprint, now);
        self.attempts
            .get(fingerprint)
            .and_then(|window| window.back().copied())
    }

    /// Number of fingerprints with live attempts.
    pub fn tracked(&self) -> usize {
        self.attempts.len()
    }

    /// Forget every attempt.
    pub fn clear(&mut self) {
        self.attempts.clear();
    }

    /// Drop attempts older than the horizon; forget empty fingerprints.
    fn prune(&mut self, fingerprint: &str, now: DateTime<Utc>) {
        let Some(window) = self.attempts.get_mut(fingerprint) else {
            return;
        };
        let cutoff = now.checked_sub_signed(self.horizon).unwrap_or(now);
        while window.front().is_some_and(|t| *t < cutoff) {
            window.pop_front();
        }
        if window.is_empty() {
            self.attempts.remove(fingerprint);
        }
    }
}
