//! Recovery orchestration.
//!
//! The orchestrator is the only writer of the fault ledger and the
//! attempt table. For every classified fault it appends a ledger event,
//! reassesses stability, and then branches on the signature's action:
//! absorb it, log it, run a bounded recovery strategy, or hand it back
//! to the host crash path. Ledger append always happens before the
//! branch, so ignored and escalated faults still feed the stability
//! picture.
//!
//! Bookkeeping runs under one mutex with no await inside the critical
//! section; only the backoff delay and the strategy call itself suspend.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::fault::{truncate_chars, FaultCategory, RawFault, Severity};
use crate::ledger::{FaultEvent, FaultLedger};
use crate::report::{FaultReport, ReportDisposition, ReportSink, RuntimeContext};
use crate::signature::{Classification, FaultAction};
use crate::stability::{assess, escalate_severity, StabilitySnapshot, StabilityThresholds};

pub mod attempts;
pub mod strategy;

pub use attempts::AttemptTracker;
pub use strategy::{RecoveryStrategy, RuntimeFlags, StrategyRegistry, StrategyResult};

// ---------------------------------------------------------------------------
// Outcome and tuning
// ---------------------------------------------------------------------------

/// Terminal verdict the ingress surfaces act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// The engine absorbed the fault; execution may continue.
    Handled,
    /// The engine declines to absorb it; the host crash path applies.
    Propagated,
}

/// Knobs for the recovery pipeline.
#[derive(Debug, Clone)]
pub struct RecoveryTuning {
    /// Ledger capacity in events.
    pub ledger_capacity: usize,
    /// Attempt ceiling for signatures that do not set their own.
    pub default_max_attempts: u32,
    /// How long attempts count against the ceiling.
    pub attempt_horizon: Duration,
    /// Backoff unit; attempt `n` waits `n * base_backoff` first.
    pub base_backoff: StdDuration,
    /// Same-component faults at or above this count trigger the
    /// restart advisory.
    pub cascade_threshold: usize,
    /// Window for the cascade count.
    pub cascade_window: Duration,
    /// Window for `statistics` aggregates.
    pub stats_window: Duration,
    /// Cap on stack text carried into reports, in characters.
    pub max_stack_chars: usize,
}

impl Default for RecoveryTuning {
    fn default() -> Self {
        Self {
            ledger_capacity: 100,
            default_max_attempts: 3,
            attempt_horizon: Duration::minutes(5),
            base_backoff: StdDuration::from_secs(1),
            cascade_threshold: 3,
            cascade_window: Duration::seconds(60),
            stats_window: Duration::hours(24),
            max_stack_chars: 2_000,
        }
    }
}

/// Host advisory that same-component faults have exceeded safe bounds.
///
/// Latched: once raised it stays raised until [`Orchestrator::clear_history`]
/// resets it, so a presentation layer polling late still sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartAdvisory {
    /// Whether a restart is currently recommended.
    pub recommended: bool,
    /// Component whose cascade tripped the guard.
    pub component: Option<String>,
    /// When the guard tripped.
    pub since: Option<DateTime<Utc>>,
}

/// Aggregate counters for diagnostics and operator surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    /// Faults ever recorded, including evicted ones.
    pub total_faults: u64,
    /// Faults inside the stability window.
    pub recent_faults: usize,
    /// Faults resolved by recovery inside the statistics window.
    pub resolved: usize,
    /// Critical-severity faults inside the statistics window.
    pub critical_faults: usize,
    /// Per-category counts inside the statistics window.
    pub by_category: BTreeMap<FaultCategory, usize>,
    /// Dominant category, if any faults are in the window.
    pub most_frequent_category: Option<FaultCategory>,
    /// Current derived stability.
    pub stability: StabilitySnapshot,
    /// Whether the cascade guard currently recommends a restart.
    pub restart_recommended: bool,
    /// Reports evicted from the sink queue since start.
    pub reports_dropped: u64,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Ledger and attempt state, guarded together so classification turns
/// are atomic.
struct PipelineState {
    ledger: FaultLedger,
    attempts: AttemptTracker,
}

/// Owns the fault ledger, the attempt table, and the branch logic
/// between them.
pub struct Orchestrator {
    state: Mutex<PipelineState>,
    thresholds: StabilityThresholds,
    tuning: RecoveryTuning,
    strategies: StrategyRegistry,
    flags: Arc<RuntimeFlags>,
    sink: Arc<ReportSink>,
    context: RuntimeContext,
    started: Instant,
    advisory_tx: watch::Sender<RestartAdvisory>,
}

impl Orchestrator {
    /// Build an orchestrator over a fresh ledger and attempt table.
    pub fn new(
        thresholds: StabilityThresholds,
        tuning: RecoveryTuning,
        strategies: StrategyRegistry,
        flags: Arc<RuntimeFlags>,
        sink: Arc<ReportSink>,
    ) -> Self {
        let (advisory_tx, _) = watch::channel(RestartAdvisory::default());
        let state = PipelineState {
            ledger: FaultLedger::new(tuning.ledger_capacity),
            attempts: AttemptTracker::new(tuning.attempt_horizon),
        };
        Self {
            state: Mutex::new(state),
            thresholds,
            tuning,
            strategies,
            flags,
            sink,
            context: RuntimeContext::capture(),
            started: Instant::now(),
            advisory_tx,
        }
    }

    /// Run the pipeline for one classified fault.
    ///
    /// Appends to the ledger before branching on the action, so every
    /// fault feeds stability regardless of how it is handled. Only
    /// `escalate` signatures and unmatched fatal faults propagate.
    pub async fn handle(&self, raw: &RawFault, classification: &Classification) -> FaultOutcome {
        let now = Utc::now();

        let (event_id, severity, stability) = {
            let mut state = self.lock_state();
            let before = assess(&state.ledger, now, &self.thresholds);
            let severity = escalate_severity(classification.severity, before.level);
            let event = FaultEvent::new(now, classification.category, severity, &raw.component);
            let event_id = event.id;
            state.ledger.record(event);
            let after = assess(&state.ledger, now, &self.thresholds);
            self.check_cascade(&state.ledger, now, &raw.component);
            (event_id, severity, after)
        };

        debug!(
            signature = classification.signature_id.as_deref().unwrap_or("unmatched"),
            category = %classification.category,
            severity = %severity,
            action = %classification.action,
            component = %raw.component,
            level = %stability.level,
            mode = %stability.mode,
            "fault classified"
        );

        match classification.action {
            FaultAction::Ignore => FaultOutcome::Handled,
            FaultAction::Log => {
                self.submit_report(
                    raw,
                    classification,
                    severity,
                    event_id,
                    stability,
                    ReportDisposition::Logged,
                );
                if raw.fatal && !classification.matched() {
                    warn!(
                        component = %raw.component,
                        "fatal fault matched no signature, propagating"
                    );
                    return FaultOutcome::Propagated;
                }
                FaultOutcome::Handled
            }
            FaultAction::Recover => {
                self.recover(raw, classification, severity, event_id, stability, now)
                    .await
            }
            FaultAction::Escalate => {
                error!(
                    signature = classification.signature_id.as_deref().unwrap_or("unmatched"),
                    component = %raw.component,
                    "fault escalated to host crash path"
                );
                self.submit_report(
                    raw,
                    classification,
                    severity,
                    event_id,
                    stability,
                    ReportDisposition::Escalated,
                );
                FaultOutcome::Propagated
            }
        }
    }

    /// Attempt a recovery strategy within budget, backoff, and timeout.
    async fn recover(
        &self,
        raw: &RawFault,
        classification: &Classification,
        severity: Severity,
        event_id: Uuid,
        stability: StabilitySnapshot,
        now: DateTime<Utc>,
    ) -> FaultOutcome {
        let fingerprint = raw.fingerprint();
        let max_attempts = classification
            .max_attempts
            .unwrap_or(self.tuning.default_max_attempts);

        let prior_attempts = {
            let mut state = self.lock_state();
            let prior = state.attempts.count(&fingerprint, now);
            if prior < max_attempts {
                state.attempts.record(&fingerprint, now);
            }
            prior
        };

        if prior_attempts >= max_attempts {
            debug!(
                fingerprint = %fingerprint,
                max_attempts,
                "recovery budget exhausted, logging instead"
            );
            self.submit_report(
                raw,
                classification,
                severity,
                event_id,
                stability,
                ReportDisposition::Logged,
            );
            return FaultOutcome::Handled;
        }

        let Some(strategy) = classification
            .strategy
            .as_deref()
            .and_then(|id| self.strategies.get(id))
        else {
            warn!(
                signature = classification.signature_id.as_deref().unwrap_or("unmatched"),
                strategy = classification.strategy.as_deref().unwrap_or("none"),
                "recovery strategy not registered"
            );
            self.submit_report(
                raw,
                classification,
                severity,
                event_id,
                stability,
                ReportDisposition::RecoveryFailed,
            );
            return FaultOutcome::Handled;
        };

        // Thrash guard: attempt n waits n * base_backoff before running.
        if prior_attempts > 0 {
            let delay = self.tuning.base_backoff.saturating_mul(prior_attempts);
            debug!(
                fingerprint = %fingerprint,
                attempt = prior_attempts.saturating_add(1),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "backing off before recovery attempt"
            );
            tokio::time::sleep(delay).await;
        }

        let strategy_id = strategy.id().to_owned();
        let attempt_started = Instant::now();
        let outcome =
            tokio::time::timeout(strategy.timeout(), strategy.attempt(&self.flags)).await;

        match outcome {
            Ok(StrategyResult::Recovered) => {
                let latency_ms =
                    u64::try_from(attempt_started.elapsed().as_millis()).unwrap_or(u64::MAX);
                {
                    let mut state = self.lock_state();
                    state.ledger.mark_resolved(event_id, latency_ms);
                }
                info!(
                    strategy = %strategy_id,
                    latency_ms,
                    component = %raw.component,
                    "recovery succeeded"
                );
                self.submit_report(
                    raw,
                    classification,
                    severity,
                    event_id,
                    stability,
                    ReportDisposition::Recovered,
                );
                FaultOutcome::Handled
            }
            Ok(StrategyResult::Failed(reason)) => {
                warn!(strategy = %strategy_id, reason = %reason, "recovery failed");
                self.submit_report(
                    raw,
                    classification,
                    severity,
                    event_id,
                    stability,
                    ReportDisposition::RecoveryFailed,
                );
                FaultOutcome::Handled
            }
            Err(_) => {
                warn!(
                    strategy = %strategy_id,
                    timeout_ms = u64::try_from(strategy.timeout().as_millis()).unwrap_or(u64::MAX),
                    "recovery timed out"
                );
                self.submit_report(
                    raw,
                    classification,
                    severity,
                    event_id,
                    stability,
                    ReportDisposition::RecoveryFailed,
                );
                FaultOutcome::Handled
            }
        }
    }

    /// Raise the restart advisory when one component faults repeatedly.
    fn check_cascade(&self, ledger: &FaultLedger, now: DateTime<Utc>, component: &str) {
        let count = ledger.count_matching(now, self.tuning.cascade_window, |event| {
            event.component == component
        });
        if count < self.tuning.cascade_threshold {
            return;
        }
        let raised = self.advisory_tx.send_if_modified(|advisory| {
            if advisory.recommended {
                return false;
            }
            *advisory = RestartAdvisory {
                recommended: true,
                component: Some(component.to_owned()),
                since: Some(now),
            };
            true
        });
        if raised {
            error!(
                component = %component,
                count,
                window_secs = self.tuning.cascade_window.num_seconds(),
                "fault cascade detected, recommending restart"
            );
        }
    }

    /// Current derived stability.
    pub fn stability(&self) -> StabilitySnapshot {
        let now = Utc::now();
        let state = self.lock_state();
        assess(&state.ledger, now, &self.thresholds)
    }

    /// Aggregate counters over the statistics window.
    pub fn statistics(&self) -> Statistics {
        let now = Utc::now();
        let state = self.lock_state();
        let window = self.tuning.stats_window;
        Statistics {
            total_faults: state.ledger.total_recorded(),
            recent_faults: state.ledger.count_in_window(now, self.thresholds.window),
            resolved: state.ledger.resolved_count(now, window),
            critical_faults: state.ledger.count_matching(now, window, |event| {
                event.severity == Severity::Critical
            }),
            by_category: state.ledger.count_by_category(now, window),
            most_frequent_category: state.ledger.most_frequent_category(now, window),
            stability: assess(&state.ledger, now, &self.thresholds),
            restart_recommended: self.advisory_tx.borrow().recommended,
            reports_dropped: self.sink.dropped(),
        }
    }

    /// Forget all history: ledger, attempts, and the restart advisory.
    ///
    /// Stability returns to stable/normal because the assessment runs
    /// over an empty ledger afterwards.
    pub fn clear_history(&self) {
        {
            let mut state = self.lock_state();
            state.ledger.clear();
            state.attempts.clear();
        }
        self.advisory_tx.send_replace(RestartAdvisory::default());
        info!("fault history cleared");
    }

    /// Watch the restart advisory.
    pub fn restart_advisory(&self) -> watch::Receiver<RestartAdvisory> {
        self.advisory_tx.subscribe()
    }

    /// Assemble and enqueue the outbound report for one fault.
    fn submit_report(
        &self,
        raw: &RawFault,
        classification: &Classification,
        severity: Severity,
        event_id: Uuid,
        stability: StabilitySnapshot,
        disposition: ReportDisposition,
    ) {
        let report = FaultReport {
            id: event_id,
            timestamp: raw.timestamp,
            source: raw.source,
            category: classification.category,
            severity,
            action: classification.action,
            disposition,
            signature_id: classification.signature_id.clone(),
            message: raw.message.clone(),
            stack: truncate_chars(&raw.stack, self.tuning.max_stack_chars),
            component: raw.component.clone(),
            fingerprint: raw.fingerprint(),
            stability,
            flags: self.flags.snapshot(),
            uptime_secs: self.started.elapsed().as_secs(),
            context: self.context.clone(),
        };
        self.sink.submit(report);
    }

    // A panic inside another holder must not wedge fault handling for
    // the rest of the process; the guarded state stays valid between
    // critical sections.
    fn lock_state(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
