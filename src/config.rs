//! Configuration loading and conversion into engine tunables.
//!
//! One TOML file covers every section; every field has a default, so an
//! empty file (or no file at all) yields the shipped behavior. Host
//! signatures declared under `[[catalog.signatures]]` are matched ahead
//! of the built-in table; features under `[[gate.features]]` extend the
//! built-in gate table.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;
use thiserror::Error;

use crate::fault::{FaultCategory, Severity};
use crate::gate::{FeatureGate, FeatureRequirement};
use crate::recovery::RecoveryTuning;
use crate::signature::{FaultAction, FaultSignature, SignatureCatalog, SignatureError};
use crate::stability::{ModeOverride, OperatingMode, StabilityLevel, StabilityThresholds};

/// Errors raised while converting a parsed config into engine state.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A `[[catalog.signatures]]` entry carried an invalid pattern.
    #[error(transparent)]
    Signature(#[from] SignatureError),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Top-level engine configuration.
#[derive(Debug, Default, Deserialize)]
pub struct EngineConfig {
    /// Fault ledger sizing.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Stability assessment thresholds.
    #[serde(default)]
    pub stability: StabilityConfig,

    /// Recovery pacing and budgets.
    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// Reporting sink and handlers.
    #[serde(default)]
    pub report: ReportConfig,

    /// Feature gate table.
    #[serde(default)]
    pub gate: GateConfig,

    /// Signature catalog extensions.
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Fault ledger sizing.
#[derive(Debug, Deserialize)]
pub struct LedgerConfig {
    /// Bounded event capacity; oldest entries evict first.
    #[serde(default = "default_ledger_capacity")]
    pub capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            capacity: default_ledger_capacity(),
        }
    }
}

/// Stability assessment thresholds.
#[derive(Debug, Deserialize)]
pub struct StabilityConfig {
    /// Recency window in seconds for the level computation.
    #[serde(default = "default_stability_window_secs")]
    pub window_secs: u64,

    /// Critical-severity count that makes the level critical.
    #[serde(default = "default_critical_count")]
    pub critical_count: usize,

    /// Total event count that makes the level unstable.
    #[serde(default = "default_unstable_count")]
    pub unstable_count: usize,

    /// Category overrides evaluated while the level is stable. Absent
    /// means the built-in locale rule; present (even empty) replaces it.
    #[serde(default)]
    pub mode_overrides: Option<Vec<ModeOverrideConfig>>,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            window_secs: default_stability_window_secs(),
            critical_count: default_critical_count(),
            unstable_count: default_unstable_count(),
            mode_overrides: None,
        }
    }
}

/// One `[[stability.mode_overrides]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ModeOverrideConfig {
    /// Category whose repeats trigger the override.
    pub category: FaultCategory,

    /// Window in seconds the repeats are counted over.
    pub window_secs: u64,

    /// Minimum windowed count for the override to fire.
    pub min_count: usize,

    /// Target mode while the override holds.
    #[serde(default = "default_override_mode")]
    pub mode: OperatingMode,
}

/// Recovery pacing and budgets.
#[derive(Debug, Deserialize)]
pub struct RecoveryConfig {
    /// Attempt ceiling for signatures that do not set their own.
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,

    /// Seconds an attempt counts against the ceiling.
    #[serde(default = "default_attempt_horizon_secs")]
    pub attempt_horizon_secs: u64,

    /// Backoff unit in milliseconds; attempt `n` waits `n` units.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Same-component fault count that raises the restart advisory.
    #[serde(default = "default_cascade_threshold")]
    pub cascade_threshold: usize,

    /// Window in seconds for the cascade count.
    #[serde(default = "default_cascade_window_secs")]
    pub cascade_window_secs: u64,

    /// Window in hours for the statistics aggregates.
    #[serde(default = "default_stats_window_hours")]
    pub stats_window_hours: u64,

    /// Cap on stack text carried into reports, in characters.
    #[serde(default = "default_max_stack_chars")]
    pub max_stack_chars: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: default_max_attempts(),
            attempt_horizon_secs: default_attempt_horizon_secs(),
            base_backoff_ms: default_base_backoff_ms(),
            cascade_threshold: default_cascade_threshold(),
            cascade_window_secs: default_cascade_window_secs(),
            stats_window_hours: default_stats_window_hours(),
            max_stack_chars: default_max_stack_chars(),
        }
    }
}

/// Reporting sink and handlers.
#[derive(Debug, Deserialize)]
pub struct ReportConfig {
    /// Queue bound; the oldest report drops on overflow.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Emit each report as a structured log event.
    #[serde(default = "default_true")]
    pub tracing_handler: bool,

    /// Append each report as a JSON line to this file.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            tracing_handler: true,
            log_file: None,
        }
    }
}

/// Feature gate table.
#[derive(Debug, Default, Deserialize)]
pub struct GateConfig {
    /// Extra gated features, added over the built-in table.
    #[serde(default)]
    pub features: Vec<FeatureConfig>,
}

/// One `[[gate.features]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureConfig {
    /// Feature name as call sites query it.
    pub name: String,

    /// Minimum stability level the feature tolerates.
    pub min_level: StabilityLevel,

    /// Operating modes the feature may run in.
    pub modes: Vec<OperatingMode>,
}

/// Signature catalog extensions.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogConfig {
    /// Host signatures, matched ahead of the built-in table.
    #[serde(default)]
    pub signatures: Vec<SignatureConfig>,
}

/// One `[[catalog.signatures]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureConfig {
    /// Unique signature id.
    pub id: String,

    /// Case-insensitive regex over message plus stack text.
    pub pattern: String,

    /// Category assigned on match.
    pub category: FaultCategory,

    /// Action taken on match.
    pub action: FaultAction,

    /// Base severity assigned on match.
    pub severity: Severity,

    /// Recovery strategy id, for `recover` signatures.
    #[serde(default)]
    pub strategy: Option<String>,

    /// Attempt ceiling carried by this signature.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

// ---------------------------------------------------------------------------
// Conversion into engine tunables
// ---------------------------------------------------------------------------

impl EngineConfig {
    /// Stability thresholds for the assessor.
    pub fn stability_thresholds(&self) -> StabilityThresholds {
        let defaults = StabilityThresholds::default();
        let overrides = match &self.stability.mode_overrides {
            None => defaults.overrides,
            Some(rules) => rules
                .iter()
                .map(|rule| ModeOverride {
                    category: rule.category,
                    window: secs(rule.window_secs),
                    min_count: rule.min_count,
                    mode: rule.mode,
                })
                .collect(),
        };
        StabilityThresholds {
            window: secs(self.stability.window_secs),
            critical_count: self.stability.critical_count,
            unstable_count: self.stability.unstable_count,
            overrides,
        }
    }

    /// Pipeline tuning for the orchestrator.
    pub fn recovery_tuning(&self) -> RecoveryTuning {
        RecoveryTuning {
            ledger_capacity: self.ledger.capacity,
            default_max_attempts: self.recovery.default_max_attempts,
            attempt_horizon: secs(self.recovery.attempt_horizon_secs),
            base_backoff: std::time::Duration::from_millis(self.recovery.base_backoff_ms),
            cascade_threshold: self.recovery.cascade_threshold,
            cascade_window: secs(self.recovery.cascade_window_secs),
            stats_window: secs(self.recovery.stats_window_hours.saturating_mul(3_600)),
            max_stack_chars: self.recovery.max_stack_chars,
        }
    }

    /// Signature catalog: host signatures first, then the built-ins.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Signature`] if any configured pattern does
    /// not compile.
    pub fn signature_catalog(&self) -> Result<SignatureCatalog, ConfigError> {
        let mut extras = Vec::with_capacity(self.catalog.signatures.len());
        for entry in &self.catalog.signatures {
            let mut signature = FaultSignature::new(
                entry.id.clone(),
                &entry.pattern,
                entry.category,
                entry.action,
                entry.severity,
            )?;
            signature.strategy = entry.strategy.clone();
            signature.max_attempts = entry.max_attempts;
            extras.push(signature);
        }
        Ok(SignatureCatalog::with_extras(extras))
    }

    /// Feature gate table: built-ins plus configured entries.
    pub fn feature_gate(&self) -> FeatureGate {
        let mut gate = FeatureGate::with_defaults();
        for feature in &self.gate.features {
            gate.register(
                &feature.name,
                FeatureRequirement::new(feature.min_level, feature.modes.iter().copied()),
            );
        }
        gate
    }
}

fn secs(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX))
}

// Default value functions for serde

fn default_ledger_capacity() -> usize {
    100
}
fn default_stability_window_secs() -> u64 {
    600
}
fn default_critical_count() -> usize {
    2
}
fn default_unstable_count() -> usize {
    5
}
fn default_override_mode() -> OperatingMode {
    OperatingMode::Safe
}
fn default_max_attempts() -> u32 {
    3
}
fn default_attempt_horizon_secs() -> u64 {
    300
}
fn default_base_backoff_ms() -> u64 {
    1_000
}
fn default_cascade_threshold() -> usize {
    3
}
fn default_cascade_window_secs() -> u64 {
    60
}
fn default_stats_window_hours() -> u64 {
    24
}
fn default_max_stack_chars() -> usize {
    2_000
}
fn default_queue_capacity() -> usize {
    256
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load engine configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<EngineConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: EngineConfig = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    Ok(config)
}

/// Resolve the default config directory (`~/.armitage/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".armitage"))
}
