//! Fault report assembly and fan-out.
//!
//! The sink sits between the orchestrator and whatever destinations the
//! host registers. Submission is synchronous and never blocks the fault
//! path: reports land in a bounded in-memory queue and a single consumer
//! task drains it, invoking handlers in registration order. When the
//! queue is full the oldest report is dropped in favor of the newest,
//! on the theory that during a fault storm the most recent evidence is
//! the most valuable.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::fault::{FaultCategory, FaultSource, Severity};
use crate::recovery::strategy::FlagsSnapshot;
use crate::signature::FaultAction;
use crate::stability::StabilitySnapshot;

pub mod context;
pub mod handlers;

pub use context::RuntimeContext;
pub use handlers::{JsonlHandler, ReportHandler, TracingHandler};

/// Default bound on queued reports awaiting delivery.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// FaultReport
// ---------------------------------------------------------------------------

/// What the pipeline ultimately did with a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportDisposition {
    /// Recorded without mitigation.
    Logged,
    /// A strategy ran and confirmed recovery.
    Recovered,
    /// A strategy ran and failed, timed out, or was missing.
    RecoveryFailed,
    /// Deliberately handed back to the host crash path.
    Escalated,
}

impl std::fmt::Display for ReportDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Logged => "logged",
            Self::Recovered => "recovered",
            Self::RecoveryFailed => "recovery_failed",
            Self::Escalated => "escalated",
        };
        write!(f, "{text}")
    }
}

/// A fully enriched fault record, ready for delivery.
///
/// Enrichment happens before submission; handlers receive the report
/// exactly as the orchestrator assembled it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultReport {
    /// Ledger event id for this fault.
    pub id: Uuid,
    /// When the fault was ingested.
    pub timestamp: DateTime<Utc>,
    /// Which ingress surface captured it.
    pub source: FaultSource,
    /// Classified category.
    pub category: FaultCategory,
    /// Severity after stability escalation.
    pub severity: Severity,
    /// Action the matching signature prescribed.
    pub action: FaultAction,
    /// What actually happened.
    pub disposition: ReportDisposition,
    /// Matching signature id, if any.
    pub signature_id: Option<String>,
    /// Original fault message.
    pub message: String,
    /// Stack trace, truncated to the configured cap.
    pub stack: String,
    /// Component the fault was attributed to.
    pub component: String,
    /// Correlation fingerprint.
    pub fingerprint: String,
    /// Stability snapshot after this fault was recorded.
    pub stability: StabilitySnapshot,
    /// Mitigation flags active when the report was assembled.
    pub flags: FlagsSnapshot,
    /// Seconds since engine start.
    pub uptime_secs: u64,
    /// Process and platform facts.
    pub context: RuntimeContext,
}

// ---------------------------------------------------------------------------
// ReportSink
// ---------------------------------------------------------------------------

/// Bounded drop-oldest queue plus the handler table it feeds.
///
/// `submit` is cheap and lock-bounded; handler IO happens only on the
/// consumer task driven by [`run_sink`].
pub struct ReportSink {
    queue: Mutex<VecDeque<FaultReport>>,
    notify: Notify,
    handlers: Mutex<Vec<Arc<dyn ReportHandler>>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl std::fmt::Debug for ReportSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportSink")
            .field("capacity", &self.capacity)
            .field("queued", &self.queued())
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl ReportSink {
    /// Create a sink bounded at `capacity` queued reports (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            handlers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a report, evicting the oldest when full.
    pub fn submit(&self, report: FaultReport) {
        {
            let mut queue = self.lock_queue();
            if queue.len() >= self.capacity {
                queue.pop_front();
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed).saturating_add(1);
                warn!(dropped, capacity = self.capacity, "report queue full, dropped oldest");
            }
            queue.push_back(report);
        }
        self.notify.notify_one();
    }

    /// Append a handler; delivery order follows registration order.
    pub fn add_handler(&self, handler: Arc<dyn ReportHandler>) {
        let name = handler.name().to_owned();
        self.lock_handlers().push(handler);
        info!(handler = %name, "report handler registered");
    }

    /// Remove every handler with this name. Returns whether any matched.
    pub fn remove_handler(&self, name: &str) -> bool {
        let mut handlers = self.lock_handlers();
        let before = handlers.len();
        handlers.retain(|h| h.name() != name);
        let removed = handlers.len() < before;
        if removed {
            info!(handler = %name, "report handler removed");
        }
        removed
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.lock_handlers().len()
    }

    /// Reports currently awaiting delivery.
    pub fn queued(&self) -> usize {
        self.lock_queue().len()
    }

    /// Reports evicted because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn pop(&self) -> Option<FaultReport> {
        self.lock_queue().pop_front()
    }

    /// Invoke every handler for one report, isolating failures.
    async fn dispatch(&self, report: &FaultReport) {
        // Snapshot so no lock is held across handler awaits.
        let handlers: Vec<Arc<dyn ReportHandler>> = self.lock_handlers().clone();
        for handler in handlers {
            if let Err(error) = handler.deliver(report).await {
                warn!(
                    handler = handler.name(),
                    error = %error,
                    report = %report.id,
                    "report handler failed"
                );
            }
        }
    }

    // The engine must keep reporting even after a panic poisoned a lock;
    // both structures stay valid between critical sections.
    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<FaultReport>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_handlers(&self) -> MutexGuard<'_, Vec<Arc<dyn ReportHandler>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Consumer loop
// ---------------------------------------------------------------------------

/// Drain the sink until shutdown, delivering each report in order.
///
/// On shutdown the remaining queue is flushed before returning, so
/// reports submitted before `shutdown` resolves are never lost.
pub async fn run_sink(sink: Arc<ReportSink>, mut shutdown: watch::Receiver<bool>) {
    debug!("report sink consumer started");
    loop {
        while let Some(report) = sink.pop() {
            sink.dispatch(&report).await;
        }
        tokio::select! {
            _ = sink.notify.notified() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    while let Some(report) = sink.pop() {
                        sink.dispatch(&report).await;
                    }
                    break;
                }
            }
        }
    }
    debug!("report sink consumer stopped");
}

/// Fixture report for handler and sink tests.
#[cfg(test)]
pub(crate) fn test_report(message: &str) -> FaultReport {
    FaultReport {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        source: FaultSource::Manual,
        category: FaultCategory::Bridge,
        severity: Severity::High,
        action: FaultAction::Log,
        disposition: ReportDisposition::Logged,
        signature_id: Some("bridge_module_lost".to_owned()),
        message: message.to_owned(),
        stack: String::new(),
        component: "test".to_owned(),
        fingerprint: crate::fault::fingerprint(message, ""),
        stability: StabilitySnapshot::healthy(),
        flags: FlagsSnapshot::default(),
        uptime_secs: 0,
        context: RuntimeContext::capture(),
    }
}
