//! Tests for supervised task execution.

use std::sync::Arc;

use armitage::config::EngineConfig;
use armitage::engine::Engine;
use armitage::fault::FaultCategory;
use armitage::ingress::{supervise, SupervisedOutcome};

#[tokio::test]
async fn completed_task_returns_its_value() {
    let engine = Engine::start(&EngineConfig::default()).expect("engine should start");

    let outcome = supervise(&engine, "worker", async { 21 * 2 }).await;
    assert_eq!(outcome, SupervisedOutcome::Completed(42));
    assert_eq!(outcome.into_completed(), Some(42));
    assert_eq!(engine.statistics().total_faults, 0);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn recoverable_panic_is_absorbed() {
    let engine = Engine::start(&EngineConfig::default()).expect("engine should start");

    // The payload matches a recover signature, so the engine absorbs it.
    let outcome: SupervisedOutcome<()> = supervise(&engine, "formatter", async {
        panic!("locale data missing for ru-RU");
    })
    .await;

    assert_eq!(outcome, SupervisedOutcome::Faulted);
    assert!(engine.flags().locale_fallback_active());

    let stats = engine.statistics();
    assert_eq!(stats.total_faults, 1);
    assert_eq!(stats.by_category.get(&FaultCategory::Locale), Some(&1));

    engine.shutdown().await;
}

#[tokio::test]
async fn unrecognized_panic_resumes_the_unwind() {
    let engine = Engine::start(&EngineConfig::default()).expect("engine should start");

    // Supervised panics are fatal at the source; with no matching
    // signature the engine propagates and the unwind resumes here.
    let supervised = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let _: SupervisedOutcome<()> = supervise(&engine, "worker", async {
                panic!("some entirely novel meltdown");
            })
            .await;
        })
    };

    let result = supervised.await;
    assert!(result.is_err_and(|e| e.is_panic()), "unwind must continue past supervise");
    assert_eq!(
        engine.statistics().total_faults,
        1,
        "the fault is recorded before propagating"
    );

    engine.shutdown().await;
}

#[tokio::test]
async fn escalate_classified_panic_resumes_the_unwind() {
    let engine = Engine::start(&EngineConfig::default()).expect("engine should start");

    let supervised = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let _: SupervisedOutcome<()> = supervise(&engine, "native", async {
                panic!("stack overflow in render loop");
            })
            .await;
        })
    };

    assert!(supervised.await.is_err_and(|e| e.is_panic()));

    engine.shutdown().await;
}

#[test]
fn into_completed_maps_non_completion_to_none() {
    assert_eq!(SupervisedOutcome::<u8>::Faulted.into_completed(), None);
    assert_eq!(SupervisedOutcome::<u8>::Cancelled.into_completed(), None);
}
