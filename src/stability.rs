//! Coarse process-health assessment derived from the fault ledger.
//!
//! A [`StabilitySnapshot`] is a pure function of the ledger's recent
//! window: it is recomputed on demand, never cached across events. Raw
//! fault volume escalates the operating mode before any single category
//! does; category overrides (locale by default, the most frequent fatal
//! pattern in the telemetry this design is modeled on) only apply while
//! the level is still stable, and can downgrade to safe but never force
//! minimal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::fault::{FaultCategory, Severity};
use crate::ledger::FaultLedger;

// ---------------------------------------------------------------------------
// Level and mode
// ---------------------------------------------------------------------------

/// Three-value health indicator.
///
/// Ordered worst to best: `Critical < Unstable < Stable`. The feature
/// gate compares levels with this ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StabilityLevel {
    /// Repeated critical faults in the recent window.
    Critical,
    /// Elevated fault volume.
    Unstable,
    /// Normal operation.
    Stable,
}

impl std::fmt::Display for StabilityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Critical => "critical",
            Self::Unstable => "unstable",
            Self::Stable => "stable",
        };
        f.write_str(name)
    }
}

/// Behaviour-restricting setting the rest of the application honours.
///
/// Ordered least to most restrictive: `Normal < Safe < Minimal`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// Everything permitted.
    Normal,
    /// Risk-prone capabilities restricted.
    Safe,
    /// Essentials only.
    Minimal,
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Normal => "normal",
            Self::Safe => "safe",
            Self::Minimal => "minimal",
        };
        f.write_str(name)
    }
}

/// Derived health picture; recomputed on demand, not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilitySnapshot {
    /// Coarse health level.
    pub level: StabilityLevel,
    /// Operating mode derived from the level and category overrides.
    pub mode: OperatingMode,
}

impl StabilitySnapshot {
    /// The snapshot of a healthy process.
    pub fn healthy() -> Self {
        Self {
            level: StabilityLevel::Stable,
            mode: OperatingMode::Normal,
        }
    }
}

impl Default for StabilitySnapshot {
    fn default() -> Self {
        Self::healthy()
    }
}

// ---------------------------------------------------------------------------
// Thresholds and overrides
// ---------------------------------------------------------------------------

/// Category-specific mode override, evaluated only while the level is
/// stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeOverride {
    /// Category whose repeats trigger the override.
    pub category: FaultCategory,
    /// Window the repeats are counted over.
    pub window: Duration,
    /// Minimum windowed count for the override to fire.
    pub min_count: usize,
    /// Target mode; clamped to safe, a stable process is never forced to
    /// minimal by a single category.
    pub mode: OperatingMode,
}

/// Tunables for the assessment.
#[derive(Debug, Clone)]
pub struct StabilityThresholds {
    /// Recency window the level is computed over.
    pub window: Duration,
    /// Critical-severity count that makes the level critical.
    pub critical_count: usize,
    /// Total event count that makes the level unstable.
    pub unstable_count: usize,
    /// Ordered category overrides; the first that fires applies.
    pub overrides: Vec<ModeOverride>,
}

impl Default for StabilityThresholds {
    fn default() -> Self {
        Self {
            window: Duration::minutes(10),
            critical_count: 2,
            unstable_count: 5,
            overrides: vec![ModeOverride {
                category: FaultCategory::Locale,
                window: Duration::minutes(5),
                min_count: 2,
                mode: OperatingMode::Safe,
            }],
        }
    }
}

// ---------------------------------------------------------------------------
// Assessment
// ---------------------------------------------------------------------------

/// Compute the stability snapshot from the ledger's recent window.
///
/// Level first: `critical` at `critical_count` critical-severity events,
/// `unstable` at `unstable_count` events of any severity, else `stable`.
/// Mode follows the level (`minimal`/`safe`), and only a stable level
/// consults the category overrides. This ordering is a deliberate
/// tie-break: volume escalates before any single category does.
pub fn assess(
    ledger: &FaultLedger,
    now: DateTime<Utc>,
    thresholds: &StabilityThresholds,
) -> StabilitySnapshot {
    let recent = ledger.count_in_window(now, thresholds.window);
    let critical_recent =
        ledger.count_matching(now, thresholds.window, |e| e.severity == Severity::Critical);

    let level = if critical_recent >= thresholds.critical_count {
        StabilityLevel::Critical
    } else if recent >= thresholds.unstable_count {
        StabilityLevel::Unstable
    } else {
        StabilityLevel::Stable
    };

    let mode = match level {
        StabilityLevel::Critical => OperatingMode::Minimal,
        StabilityLevel::Unstable => OperatingMode::Safe,
        StabilityLevel::Stable => stable_mode(ledger, now, thresholds),
    };

    StabilitySnapshot { level, mode }
}

/// Mode for a stable level: the first firing override, clamped to safe.
fn stable_mode(
    ledger: &FaultLedger,
    now: DateTime<Utc>,
    thresholds: &StabilityThresholds,
) -> OperatingMode {
    for rule in &thresholds.overrides {
        let count = ledger.count_matching(now, rule.window, |e| e.category == rule.category);
        if count >= rule.min_count {
            return rule.mode.min(OperatingMode::Safe);
        }
    }
    OperatingMode::Normal
}

/// Escalate a fault's severity based on the stability level at the time
/// it was classified.
///
/// An already-degraded process treats further faults as more serious:
/// under `unstable`, high becomes critical; under `critical`, medium and
/// high each move up one step. A stable process records severities
/// unchanged.
pub fn escalate_severity(severity: Severity, level: StabilityLevel) -> Severity {
    match (level, severity) {
        (StabilityLevel::Unstable, Severity::High) => Severity::Critical,
        (StabilityLevel::Critical, Severity::Medium) => Severity::High,
        (StabilityLevel::Critical, Severity::High) => Severity::Critical,
        (_, severity) => severity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::FaultEvent;

    fn ledger_with(events: Vec<(Duration, FaultCategory, Severity)>) -> (FaultLedger, DateTime<Utc>) {
        let now = Utc::now();
        let mut ledger = FaultLedger::new(100);
        for (age, category, severity) in events {
            ledger.record(FaultEvent::new(now - age, category, severity, "test"));
        }
        (ledger, now)
    }

    #[test]
    fn empty_ledger_is_stable_normal() {
        let (ledger, now) = ledger_with(vec![]);
        let snap = assess(&ledger, now, &StabilityThresholds::default());
        assert_eq!(snap, StabilitySnapshot::healthy());
    }

    #[test]
    fn five_recent_events_make_unstable_safe() {
        let events = (0..5)
            .map(|_| (Duration::minutes(1), FaultCategory::Network, Severity::Low))
            .collect();
        let (ledger, now) = ledger_with(events);
        let snap = assess(&ledger, now, &StabilityThresholds::default());
        assert_eq!(snap.level, StabilityLevel::Unstable);
        assert_eq!(snap.mode, OperatingMode::Safe);
    }

    #[test]
    fn two_critical_events_make_critical_minimal() {
        let events = vec![
            (Duration::minutes(2), FaultCategory::Memory, Severity::Critical),
            (Duration::minutes(8), FaultCategory::Bridge, Severity::Critical),
        ];
        let (ledger, now) = ledger_with(events);
        let snap = assess(&ledger, now, &StabilityThresholds::default());
        assert_eq!(snap.level, StabilityLevel::Critical);
        assert_eq!(snap.mode, OperatingMode::Minimal);
    }

    #[test]
    fn critical_wins_regardless_of_total_count() {
        // Two criticals among many low-severity events: still critical.
        let mut events = vec![
            (Duration::minutes(1), FaultCategory::Memory, Severity::Critical),
            (Duration::minutes(2), FaultCategory::Memory, Severity::Critical),
        ];
        for _ in 0..10 {
            events.push((Duration::minutes(3), FaultCategory::Gc, Severity::Low));
        }
        let (ledger, now) = ledger_with(events);
        let snap = assess(&ledger, now, &StabilityThresholds::default());
        assert_eq!(snap.level, StabilityLevel::Critical);
        assert_eq!(snap.mode, OperatingMode::Minimal);
    }

    #[test]
    fn old_events_fall_out_of_the_window() {
        let events = vec![
            (Duration::minutes(30), FaultCategory::Memory, Severity::Critical),
            (Duration::minutes(40), FaultCategory::Memory, Severity::Critical),
        ];
        let (ledger, now) = ledger_with(events);
        let snap = assess(&ledger, now, &StabilityThresholds::default());
        assert_eq!(snap.level, StabilityLevel::Stable);
    }

    #[test]
    fn locale_override_downgrades_stable_to_safe() {
        // Two locale faults within five minutes, total volume below the
        // unstable threshold: level stays stable, mode drops to safe.
        let events = vec![
            (Duration::minutes(1), FaultCategory::Locale, Severity::High),
            (Duration::minutes(3), FaultCategory::Locale, Severity::High),
        ];
        let (ledger, now) = ledger_with(events);
        let snap = assess(&ledger, now, &StabilityThresholds::default());
        assert_eq!(snap.level, StabilityLevel::Stable);
        assert_eq!(snap.mode, OperatingMode::Safe);
    }

    #[test]
    fn locale_faults_outside_override_window_do_not_fire() {
        let events = vec![
            (Duration::minutes(7), FaultCategory::Locale, Severity::High),
            (Duration::minutes(8), FaultCategory::Locale, Severity::High),
        ];
        let (ledger, now) = ledger_with(events);
        let snap = assess(&ledger, now, &StabilityThresholds::default());
        assert_eq!(snap.mode, OperatingMode::Normal, "outside 5-minute override window");
    }

    #[test]
    fn volume_escalates_before_category_override() {
        // Five locale faults: the unstable threshold fires on volume, not
        // via the override path.
        let events = (0..5)
            .map(|_| (Duration::minutes(1), FaultCategory::Locale, Severity::Medium))
            .collect();
        let (ledger, now) = ledger_with(events);
        let snap = assess(&ledger, now, &StabilityThresholds::default());
        assert_eq!(snap.level, StabilityLevel::Unstable);
        assert_eq!(snap.mode, OperatingMode::Safe);
    }

    #[test]
    fn override_mode_is_clamped_to_safe() {
        let thresholds = StabilityThresholds {
            overrides: vec![ModeOverride {
                category: FaultCategory::Audio,
                window: Duration::minutes(5),
                min_count: 1,
                mode: OperatingMode::Minimal,
            }],
            ..StabilityThresholds::default()
        };
        let events = vec![(Duration::minutes(1), FaultCategory::Audio, Severity::Low)];
        let (ledger, now) = ledger_with(events);
        let snap = assess(&ledger, now, &thresholds);
        assert_eq!(snap.level, StabilityLevel::Stable);
        assert_eq!(snap.mode, OperatingMode::Safe, "stable never forces minimal");
    }

    #[test]
    fn first_firing_override_applies() {
        let thresholds = StabilityThresholds {
            overrides: vec![
                ModeOverride {
                    category: FaultCategory::Bridge,
                    window: Duration::minutes(5),
                    min_count: 1,
                    mode: OperatingMode::Normal,
                },
                ModeOverride {
                    category: FaultCategory::Bridge,
                    window: Duration::minutes(5),
                    min_count: 1,
                    mode: OperatingMode::Safe,
                },
            ],
            ..StabilityThresholds::default()
        };
        let events = vec![(Duration::minutes(1), FaultCategory::Bridge, Severity::Low)];
        let (ledger, now) = ledger_with(events);
        let snap = assess(&ledger, now, &thresholds);
        assert_eq!(snap.mode, OperatingMode::Normal);
    }

    #[test]
    fn level_ordering_for_gate_comparisons() {
        assert!(StabilityLevel::Critical < StabilityLevel::Unstable);
        assert!(StabilityLevel::Unstable < StabilityLevel::Stable);
    }

    #[test]
    fn severity_escalation_table() {
        use StabilityLevel::{Critical, Stable, Unstable};

        assert_eq!(escalate_severity(Severity::High, Stable), Severity::High);
        assert_eq!(escalate_severity(Severity::High, Unstable), Severity::Critical);
        assert_eq!(escalate_severity(Severity::Medium, Unstable), Severity::Medium);
        assert_eq!(escalate_severity(Severity::Medium, Critical), Severity::High);
        assert_eq!(escalate_severity(Severity::High, Critical), Severity::Critical);
        assert_eq!(escalate_severity(Severity::Low, Critical), Severity::Low);
        assert_eq!(
            escalate_severity(Severity::Critical, Critical),
            Severity::Critical
        );
    }
}
