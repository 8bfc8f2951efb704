//! Recovery strategies and the runtime degradation flags they toggle.
//!
//! A strategy never repairs the faulting call site. It flips a shared
//! [`RuntimeFlags`] switch that reroutes future work around the broken
//! subsystem (simpler formatter, bypassed bridge module, suspended
//! accessibility announcements) and reports the result explicitly.
//! Setting a flag that is already set is a no-op, so re-running a
//! strategy is always safe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default wall-clock budget for a single strategy attempt.
pub const DEFAULT_STRATEGY_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// RuntimeFlags
// ---------------------------------------------------------------------------

/// Degraded-mode switches shared between strategies and the host.
///
/// The host consults these on its hot paths and routes around whatever
/// subsystem has been flagged. All flags start unset and stay set until
/// the host clears them itself; clearing is a host decision, not an
/// engine one.
#[derive(Debug, Default)]
pub struct RuntimeFlags {
    locale_fallback: AtomicBool,
    safe_string_mode: AtomicBool,
    bridge_isolation: AtomicBool,
    accessibility_bypass: AtomicBool,
    audio_restart_requested: AtomicBool,
}

impl RuntimeFlags {
    /// Route formatting through the default locale.
    pub fn enable_locale_fallback(&self) {
        self.locale_fallback.store(true, Ordering::Relaxed);
    }

    /// Whether formatting is pinned to the default locale.
    pub fn locale_fallback_active(&self) -> bool {
        self.locale_fallback.load(Ordering::Relaxed)
    }

    /// Route text handling through lossy sanitizing paths.
    pub fn enable_safe_string_mode(&self) {
        self.safe_string_mode.store(true, Ordering::Relaxed);
    }

    /// Whether text handling runs in sanitizing mode.
    pub fn safe_string_mode_active(&self) -> bool {
        self.safe_string_mode.load(Ordering::Relaxed)
    }

    /// Stop routing calls into the embedded bridge.
    pub fn enable_bridge_isolation(&self) {
        self.bridge_isolation.store(true, Ordering::Relaxed);
    }

    /// Whether the embedded bridge is isolated.
    pub fn bridge_isolation_active(&self) -> bool {
        self.bridge_isolation.load(Ordering::Relaxed)
    }

    /// Suppress accessibility announcements.
    pub fn enable_accessibility_bypass(&self) {
        self.accessibility_bypass.store(true, Ordering::Relaxed);
    }

    /// Whether accessibility announcements are suppressed.
    pub fn accessibility_bypass_active(&self) -> bool {
        self.accessibility_bypass.load(Ordering::Relaxed)
    }

    /// Ask the audio subsystem to tear down and reinitialize.
    ///
    /// The host clears this after honoring the request.
    pub fn request_audio_restart(&self) {
        self.audio_restart_requested.store(true, Ordering::Relaxed);
    }

    /// Whether an audio restart request is pending.
    pub fn audio_restart_requested(&self) -> bool {
        self.audio_restart_requested.load(Ordering::Relaxed)
    }

    /// Acknowledge a pending audio restart request.
    pub fn acknowledge_audio_restart(&self) {
        self.audio_restart_requested.store(false, Ordering::Relaxed);
    }

    /// Point-in-time copy of every flag, for reports and diagnostics.
    pub fn snapshot(&self) -> FlagsSnapshot {
        FlagsSnapshot {
            locale_fallback: self.locale_fallback_active(),
            safe_string_mode: self.safe_string_mode_active(),
            bridge_isolation: self.bridge_isolation_active(),
            accessibility_bypass: self.accessibility_bypass_active(),
            audio_restart_requested: self.audio_restart_requested(),
        }
    }
}

/// Serializable copy of [`RuntimeFlags`] at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagsSnapshot {
    /// Formatting pinned to the default locale.
    pub locale_fallback: bool,
    /// Text handling in sanitizing mode.
    pub safe_string_mode: bool,
    /// Embedded bridge isolated.
    pub bridge_isolation: bool,
    /// Accessibility announcements suppressed.
    pub accessibility_bypass: bool,
    /// Audio restart pending host acknowledgement.
    pub audio_restart_requested: bool,
}

// ---------------------------------------------------------------------------
// RecoveryStrategy
// ---------------------------------------------------------------------------

/// Outcome of one strategy attempt.
///
/// Failure is a value, never an unwind: a strategy that cannot recover
/// says so in-band so the orchestrator can report it and move on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyResult {
    /// The mitigation took effect.
    Recovered,
    /// The mitigation could not take effect.
    Failed(String),
}

/// A named, idempotent mitigation.
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    /// Stable identifier that signatures reference.
    fn id(&self) -> &str;

    /// Wall-clock budget for one attempt; exceeded attempts count as failed.
    fn timeout(&self) -> Duration {
        DEFAULT_STRATEGY_TIMEOUT
    }

    /// Run the mitigation against the shared flags.
    async fn attempt(&self, flags: &RuntimeFlags) -> StrategyResult;
}

// ---------------------------------------------------------------------------
// Built-in strategies
// ---------------------------------------------------------------------------

/// Pin formatting to the default locale.
#[derive(Debug, Default)]
pub struct LocaleFallback;

#[async_trait]
impl RecoveryStrategy for LocaleFallback {
    fn id(&self) -> &str {
        "locale_fallback"
    }

    async fn attempt(&self, flags: &RuntimeFlags) -> StrategyResult {
        flags.enable_locale_fallback();
        debug!("locale fallback enabled");
        StrategyResult::Recovered
    }
}

/// Switch text handling to sanitizing paths.
#[derive(Debug, Default)]
pub struct SafeStringGuard;

#[async_trait]
impl RecoveryStrategy for SafeStringGuard {
    fn id(&self) -> &str {
        "safe_string_guard"
    }

    async fn attempt(&self, flags: &RuntimeFlags) -> StrategyResult {
        flags.enable_safe_string_mode();
        debug!("safe string mode enabled");
        StrategyResult::Recovered
    }
}

/// Cut the embedded bridge out of the call path.
#[derive(Debug, Default)]
pub struct BridgeIsolation;

#[async_trait]
impl RecoveryStrategy for BridgeIsolation {
    fn id(&self) -> &str {
        "bridge_isolation"
    }

    async fn attempt(&self, flags: &RuntimeFlags) -> StrategyResult {
        flags.enable_bridge_isolation();
        debug!("bridge isolation enabled");
        StrategyResult::Recovered
    }
}

/// Suppress accessibility announcements.
#[derive(Debug, Default)]
pub struct AccessibilityBypass;

#[async_trait]
impl RecoveryStrategy for AccessibilityBypass {
    fn id(&self) -> &str {
        "accessibility_bypass"
    }

    async fn attempt(&self, flags: &RuntimeFlags) -> StrategyResult {
        flags.enable_accessibility_bypass();
        debug!("accessibility bypass enabled");
        StrategyResult::Recovered
    }
}

/// Request an audio subsystem restart.
#[derive(Debug, Default)]
pub struct AudioReset;

#[async_trait]
impl RecoveryStrategy for AudioReset {
    fn id(&self) -> &str {
        "audio_reset"
    }

    async fn attempt(&self, flags: &RuntimeFlags) -> StrategyResult {
        flags.request_audio_restart();
        debug!("audio restart requested");
        StrategyResult::Recovered
    }
}

// ---------------------------------------------------------------------------
// StrategyRegistry
// ---------------------------------------------------------------------------

/// Strategies indexed by id.
///
/// Signatures name strategies by id; a signature whose strategy id is
/// absent here fails recovery at dispatch time rather than at load time,
/// so hosts can ship signatures ahead of the strategies they reference.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn RecoveryStrategy>>,
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&str> = self.strategies.keys().map(String::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("StrategyRegistry").field("ids", &ids).finish()
    }
}

impl StrategyRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with every built-in strategy.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LocaleFallback));
        registry.register(Arc::new(SafeStringGuard));
        registry.register(Arc::new(BridgeIsolation));
        registry.register(Arc::new(AccessibilityBypass));
        registry.register(Arc::new(AudioReset));
        registry
    }

    /// Add or replace a strategy under its own id.
    pub fn register(&mut self, strategy: Arc<dyn RecoveryStrategy>) {
        self.strategies.insert(strategy.id().to_owned(), strategy);
    }

    /// Look up a strategy by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn RecoveryStrategy>> {
        self.strategies.get(id).cloned()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.strategies.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered strategies.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Whether no strategies are registered.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{FaultAction, SignatureCatalog};

    #[tokio::test]
    async fn builtin_strategies_set_their_flags() {
        let flags = RuntimeFlags::default();
        assert!(!flags.locale_fallback_active());

        let result = LocaleFallback.attempt(&flags).await;
        assert_eq!(result, StrategyResult::Recovered);
        assert!(flags.locale_fallback_active());

        SafeStringGuard.attempt(&flags).await;
        BridgeIsolation.attempt(&flags).await;
        AccessibilityBypass.attempt(&flags).await;
        AudioReset.attempt(&flags).await;

        let snapshot = flags.snapshot();
        assert!(snapshot.safe_string_mode);
        assert!(snapshot.bridge_isolation);
        assert!(snapshot.accessibility_bypass);
        assert!(snapshot.audio_restart_requested);
    }

    #[tokio::test]
    async fn strategies_are_idempotent() {
        let flags = RuntimeFlags::default();
        for _ in 0..3 {
            let result = BridgeIsolation.attempt(&flags).await;
            assert_eq!(result, StrategyResult::Recovered);
        }
        assert!(flags.bridge_isolation_active());
    }

    #[test]
    fn audio_restart_can_be_acknowledged() {
        let flags = RuntimeFlags::default();
        flags.request_audio_restart();
        assert!(flags.audio_restart_requested());
        flags.acknowledge_audio_restart();
        assert!(!flags.audio_restart_requested());
    }

    #[test]
    fn registry_lookup_by_id() {
        let registry = StrategyRegistry::with_defaults();
        assert_eq!(registry.len(), 5);
        assert!(registry.get("bridge_isolation").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn register_replaces_same_id() {
        let mut registry = StrategyRegistry::new();
        registry.register(Arc::new(LocaleFallback));
        registry.register(Arc::new(LocaleFallback));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn default_registry_covers_builtin_catalog() {
        let registry = StrategyRegistry::with_defaults();
        let catalog = SignatureCatalog::builtin();
        for signature in catalog.iter() {
            if signature.action == FaultAction::Recover {
                let id = signature
                    .strategy
                    .as_deref()
                    .expect("recover signature should name a strategy");
                assert!(
                    registry.get(id).is_some(),
                    "strategy {id} missing from default registry"
                );
            }
        }
    }

    #[test]
    fn default_timeout_is_five_seconds() {
        assert_eq!(LocaleFallback.timeout(), Duration::from_secs(5));
    }
}
