//! Tests for the diagnostic-log capture layer.

use std::time::Duration;

use tracing_subscriber::layer::SubscriberExt;

use armitage::config::EngineConfig;
use armitage::engine::Engine;
use armitage::ingress::FaultCaptureLayer;

#[tokio::test]
async fn foreign_error_events_become_faults() {
    let engine = Engine::start(&EngineConfig::default()).expect("engine should start");
    let layer = FaultCaptureLayer::new(&engine).expect("layer should build");
    let subscriber = tracing_subscriber::registry().with(layer);

    tracing::subscriber::with_default(subscriber, || {
        tracing::error!(target: "host::bridge", "bridge payload invalid near frame 3");
        tracing::warn!(target: "host::bridge", "routine warning, not a fault");
        tracing::error!(target: "armitage::report", "own-crate events stay out of the pipeline");
    });

    // Pipeline work is spawned off the event path; let it run.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let stats = engine.statistics();
    assert_eq!(stats.total_faults, 1, "only the foreign ERROR event counts");
    assert!(engine.flags().bridge_isolation_active());

    engine.shutdown().await;
}

#[tokio::test]
async fn extra_ignored_targets_are_respected() {
    let engine = Engine::start(&EngineConfig::default()).expect("engine should start");
    let layer = FaultCaptureLayer::new(&engine)
        .expect("layer should build")
        .with_ignored_target("noisy_dep");
    let subscriber = tracing_subscriber::registry().with(layer);

    tracing::subscriber::with_default(subscriber, || {
        tracing::error!(target: "noisy_dep::retries", "connection reset by peer");
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.statistics().total_faults, 0);

    engine.shutdown().await;
}
