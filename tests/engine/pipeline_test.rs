//! End-to-end pipeline behaviour through the public engine surface.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use armitage::config::EngineConfig;
use armitage::engine::Engine;
use armitage::fault::{FaultCategory, FaultSource, RawFault, Severity};
use armitage::recovery::{FaultOutcome, RecoveryStrategy, RuntimeFlags, StrategyRegistry, StrategyResult};
use armitage::signature::{FaultAction, FaultSignature, SignatureCatalog};
use armitage::stability::{OperatingMode, StabilityLevel};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fault(message: &str, component: &str) -> RawFault {
    RawFault::new(message, "", FaultSource::DiagnosticLog, false, component)
}

struct CountingStrategy {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl RecoveryStrategy for CountingStrategy {
    fn id(&self) -> &str {
        "counting"
    }

    async fn attempt(&self, _flags: &RuntimeFlags) -> StrategyResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        StrategyResult::Recovered
    }
}

// ---------------------------------------------------------------------------
// Pipeline scenarios
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn locale_storm_degrades_to_safe_mode() {
    let engine = Engine::start(&EngineConfig::default()).expect("engine should start");

    // Distinct components so the cascade guard stays out of the picture.
    let components = ["formatter", "contact_list", "chat_view", "search", "settings"];
    for component in components {
        let outcome = engine
            .process(fault("locale data missing for ru-RU", component))
            .await;
        assert_eq!(outcome, FaultOutcome::Handled);
    }

    let stability = engine.stability();
    assert_eq!(stability.level, StabilityLevel::Unstable);
    assert_eq!(stability.mode, OperatingMode::Safe);

    // Safe mode shuts down risk-prone features, keeps degradable ones.
    assert!(!engine.is_allowed("voice_recognition"));
    assert!(!engine.is_allowed("media_prefetch"));
    assert!(engine.is_allowed("background_sync"));
    assert!(engine.is_allowed("speech_synthesis"));

    // The locale fallback flag latched on the first successful recovery.
    assert!(engine.flags().locale_fallback_active());

    let stats = engine.statistics();
    assert_eq!(stats.total_faults, 5);
    assert_eq!(stats.by_category.get(&FaultCategory::Locale), Some(&5));
    assert_eq!(stats.most_frequent_category, Some(FaultCategory::Locale));
    // Budget of 2 for this signature: two recoveries, then logging.
    assert_eq!(stats.resolved, 2);

    engine.shutdown().await;
}

#[tokio::test]
async fn repeated_critical_faults_drive_minimal_mode() {
    let engine = Engine::start(&EngineConfig::default()).expect("engine should start");

    engine
        .process(fault("out of memory in image decoder", "image_cache"))
        .await;
    engine
        .process(fault("out of memory in message store", "message_store"))
        .await;

    let stability = engine.stability();
    assert_eq!(stability.level, StabilityLevel::Critical);
    assert_eq!(stability.mode, OperatingMode::Minimal);

    // Minimal mode denies even features that tolerate safe mode.
    assert!(!engine.is_allowed("background_sync"));
    assert!(!engine.is_allowed("voice_recognition"));

    let stats = engine.statistics();
    assert_eq!(stats.critical_faults, 2);
    assert_eq!(stats.stability.level, StabilityLevel::Critical);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn two_locale_faults_trigger_the_safe_mode_override() {
    let engine = Engine::start(&EngineConfig::default()).expect("engine should start");

    engine
        .process(fault("Collator failed during locale-aware sort", "contacts"))
        .await;
    engine
        .process(fault("Collator failed during locale-aware sort", "chats"))
        .await;

    // Volume is below the unstable threshold, so the level stays stable
    // and only the category override drops the mode.
    let stability = engine.stability();
    assert_eq!(stability.level, StabilityLevel::Stable);
    assert_eq!(stability.mode, OperatingMode::Safe);
    assert!(!engine.is_allowed("voice_recognition"));

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn attempt_budget_is_enforced_per_fingerprint() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut strategies = StrategyRegistry::new();
    strategies.register(Arc::new(CountingStrategy {
        calls: Arc::clone(&calls),
    }));

    let mut catalog = SignatureCatalog::empty();
    catalog.push(
        FaultSignature::new(
            "widget_crash",
            r"widget exploded",
            FaultCategory::Bridge,
            FaultAction::Recover,
            Severity::High,
        )
        .expect("pattern should compile")
        .with_strategy("counting", 2),
    );

    let engine = Engine::start_with(&EngineConfig::default(), catalog, strategies)
        .expect("engine should start");

    for _ in 0..4 {
        let outcome = engine.process(fault("widget exploded", "home_screen")).await;
        assert_eq!(outcome, FaultOutcome::Handled, "exhausted budget logs, never crashes");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2, "strategy stops at the budget");
    assert_eq!(engine.statistics().total_faults, 4, "every fault still hits the ledger");

    engine.shutdown().await;
}

#[tokio::test]
async fn native_fatal_faults_propagate() {
    let engine = Engine::start(&EngineConfig::default()).expect("engine should start");

    let raw = RawFault::new(
        "Fatal signal 11 (SIGSEGV), code 1",
        "",
        FaultSource::Panic,
        true,
        "native",
    );
    let outcome = engine.process(raw).await;
    assert_eq!(outcome, FaultOutcome::Propagated);

    engine.shutdown().await;
}

#[tokio::test]
async fn cascade_in_one_component_recommends_restart() {
    let engine = Engine::start(&EngineConfig::default()).expect("engine should start");
    let advisory = engine.restart_advisory();
    assert!(!advisory.borrow().recommended);

    for _ in 0..3 {
        engine.process(fault("gc pause exceeded budget", "heap_monitor")).await;
    }

    let current = advisory.borrow();
    assert!(current.recommended);
    assert_eq!(current.component.as_deref(), Some("heap_monitor"));
    drop(current);
    assert!(engine.statistics().restart_recommended);

    engine.shutdown().await;
}

#[tokio::test]
async fn clear_history_restores_normal_operation() {
    let engine = Engine::start(&EngineConfig::default()).expect("engine should start");

    for i in 0..5 {
        engine
            .process(fault("connection reset by peer", &format!("sync_{i}")))
            .await;
    }
    assert_eq!(engine.stability().mode, OperatingMode::Safe);
    assert!(!engine.is_allowed("voice_recognition"));

    engine.clear_history();

    let stability = engine.stability();
    assert_eq!(stability.level, StabilityLevel::Stable);
    assert_eq!(stability.mode, OperatingMode::Normal);
    assert!(engine.is_allowed("voice_recognition"));
    assert_eq!(engine.statistics().recent_faults, 0);

    engine.shutdown().await;
}

#[tokio::test]
async fn host_signatures_override_builtin_classification() {
    let config: EngineConfig = toml::from_str(
        r#"
        [[catalog.signatures]]
        id = "known_benign_oom"
        pattern = "out of memory in thumbnail cache"
        category = "memory"
        action = "ignore"
        severity = "low"
        "#,
    )
    .expect("config should parse");
    let engine = Engine::start(&config).expect("engine should start");

    // The host entry wins over the built-in critical oom signature.
    engine
        .process(fault("out of memory in thumbnail cache", "thumbnails"))
        .await;
    engine
        .process(fault("out of memory in thumbnail cache", "thumbnails_2"))
        .await;

    assert_eq!(engine.stability().level, StabilityLevel::Stable);
    assert_eq!(engine.statistics().critical_faults, 0);

    engine.shutdown().await;
}
