//! Core fault vocabulary shared by every stage of the pipeline.
//!
//! A [`RawFault`] is the transient record built at an ingress boundary
//! (panic hook, supervised task, diagnostic log). It is consumed
//! immediately by the classifier and never retained; what survives is a
//! `ledger::FaultEvent` derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum fingerprint length in characters.
///
/// Long enough to separate distinct faults that share a message prefix,
/// short enough that stack noise past the top frames does not split
/// repeats of the same fault into different fingerprints.
pub const FINGERPRINT_LEN: usize = 160;

// ---------------------------------------------------------------------------
// Category and severity
// ---------------------------------------------------------------------------

/// Coarse fault category assigned by signature matching.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FaultCategory {
    /// Locale/ICU data and locale-dependent string operations.
    Locale,
    /// Memory pressure and allocation failures.
    Memory,
    /// Accessibility service integration (screen readers, focus traversal).
    Accessibility,
    /// Platform-bridge faults (native module boundary).
    Bridge,
    /// Garbage-collector pauses and heap diagnostics.
    Gc,
    /// Transient network failures.
    Network,
    /// Audio subsystem faults (sessions, focus, capture devices).
    Audio,
    /// Anything no signature recognises.
    Unknown,
}

impl std::fmt::Display for FaultCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Locale => "locale",
            Self::Memory => "memory",
            Self::Accessibility => "accessibility",
            Self::Bridge => "bridge",
            Self::Gc => "gc",
            Self::Network => "network",
            Self::Audio => "audio",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Fault severity, ordered lowest to highest.
///
/// The derived `Ord` is load-bearing: severity escalation and the
/// stability assessment compare severities directly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Cosmetic or informational; no user-visible impact expected.
    Low,
    /// Degraded behaviour, recoverable without intervention.
    Medium,
    /// User-visible failure of a feature.
    High,
    /// Process-threatening fault.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Raw fault
// ---------------------------------------------------------------------------

/// Where a fault entered the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultSource {
    /// Synchronous panic caught by the installed panic hook.
    Panic,
    /// A supervised task failed or panicked (unhandled async rejection).
    TaskFailure,
    /// An ERROR-level diagnostic event matched at the logging boundary.
    DiagnosticLog,
    /// Submitted directly through the engine API.
    Manual,
}

impl std::fmt::Display for FaultSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Panic => "panic",
            Self::TaskFailure => "task_failure",
            Self::DiagnosticLog => "diagnostic_log",
            Self::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Transient record of an intercepted fault.
///
/// Built at the ingress boundary and handed straight to the classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFault {
    /// Human-readable fault message.
    pub message: String,
    /// Stack or backtrace text; empty when the source provides none.
    pub stack: String,
    /// Ingress boundary the fault arrived through.
    pub source: FaultSource,
    /// Whether the host considers this fault fatal if left unhandled.
    pub fatal: bool,
    /// Originating component label (task name, hook, log target).
    pub component: String,
    /// When the fault was intercepted.
    pub timestamp: DateTime<Utc>,
}

impl RawFault {
    /// Build a fault record with the current timestamp.
    pub fn new(
        message: impl Into<String>,
        stack: impl Into<String>,
        source: FaultSource,
        fatal: bool,
        component: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            stack: stack.into(),
            source,
            fatal,
            component: component.into(),
            timestamp: Utc::now(),
        }
    }

    /// Build a fatal panic-sourced fault.
    pub fn from_panic(message: impl Into<String>, stack: impl Into<String>) -> Self {
        Self::new(message, stack, FaultSource::Panic, true, "panic_hook")
    }

    /// Build a task-failure fault for the named component.
    ///
    /// Marked fatal: an unsupervised panic in the same place would have
    /// taken the process down.
    pub fn from_task_failure(component: impl Into<String>, message: impl Into<String>) -> Self {
        let component = component.into();
        Self::new(message, "", FaultSource::TaskFailure, true, component)
    }

    /// Build a diagnostic-log fault for the given log target.
    pub fn from_diagnostic(target: impl Into<String>, message: impl Into<String>) -> Self {
        let target = target.into();
        Self::new(message, "", FaultSource::DiagnosticLog, false, target)
    }

    /// The text the classifier matches against: message and stack joined.
    pub fn match_text(&self) -> String {
        if self.stack.is_empty() {
            self.message.clone()
        } else {
            format!("{}\n{}", self.message, self.stack)
        }
    }

    /// Normalized fingerprint for attempt correlation.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.message, &self.stack)
    }
}

// ---------------------------------------------------------------------------
// Fingerprinting
// ---------------------------------------------------------------------------

/// Normalized fingerprint of a fault's text.
///
/// Lowercases, collapses whitespace runs to single spaces, and truncates
/// to [`FINGERPRINT_LEN`] characters. Repeated occurrences of "the same"
/// fault fingerprint identically even when trailing stack frames differ.
pub fn fingerprint(message: &str, stack: &str) -> String {
    let combined = format!("{message} {stack}");
    let mut out = String::with_capacity(FINGERPRINT_LEN);
    let mut count: usize = 0;
    let mut last_was_space = true;

    for ch in combined.chars() {
        if count >= FINGERPRINT_LEN {
            break;
        }
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                count = count.saturating_add(1);
                last_was_space = true;
            }
        } else {
            for lower in ch.to_lowercase() {
                if count >= FINGERPRINT_LEN {
                    break;
                }
                out.push(lower);
                count = count.saturating_add(1);
            }
            last_was_space = false;
        }
    }

    // A trailing separator carries no signal.
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Truncate to at most `max` characters on a char boundary.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((index, _)) => text.get(..index).unwrap_or(text).to_owned(),
        None => text.to_owned(),
    }
}
