//! Reporting behaviour through the public engine surface.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use armitage::config::EngineConfig;
use armitage::engine::Engine;
use armitage::fault::{FaultCategory, FaultSource, RawFault};
use armitage::report::{FaultReport, ReportDisposition, ReportHandler};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fault(message: &str, component: &str) -> RawFault {
    RawFault::new(message, "", FaultSource::DiagnosticLog, false, component)
}

struct RecordingHandler {
    seen: Mutex<Vec<FaultReport>>,
}

impl RecordingHandler {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }

    fn reports(&self) -> Vec<FaultReport> {
        self.seen.lock().expect("test lock").clone()
    }
}

#[async_trait]
impl ReportHandler for RecordingHandler {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, report: &FaultReport) -> anyhow::Result<()> {
        self.seen.lock().expect("test lock").push(report.clone());
        Ok(())
    }
}

struct FailingHandler;

#[async_trait]
impl ReportHandler for FailingHandler {
    fn name(&self) -> &str {
        "failing"
    }

    async fn deliver(&self, _report: &FaultReport) -> anyhow::Result<()> {
        anyhow::bail!("destination unreachable")
    }
}

// ---------------------------------------------------------------------------
// Reporting scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reports_reach_handlers_in_submission_order() {
    let engine = Engine::start(&EngineConfig::default()).expect("engine should start");
    let recorder = RecordingHandler::new();
    // A broken destination ahead of the recorder must not block delivery.
    engine.add_handler(Arc::new(FailingHandler));
    engine.add_handler(recorder.clone());

    engine.process(fault("memory pressure warning 1", "heap")).await;
    engine.process(fault("memory pressure warning 2", "heap_2")).await;
    engine.process(fault("memory pressure warning 3", "heap_3")).await;

    // Shutdown drains the queue before returning.
    engine.shutdown().await;

    let reports = recorder.reports();
    assert_eq!(reports.len(), 3);
    let messages: Vec<&str> = reports.iter().map(|r| r.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "memory pressure warning 1",
            "memory pressure warning 2",
            "memory pressure warning 3"
        ]
    );
    for report in &reports {
        assert_eq!(report.category, FaultCategory::Memory);
        assert_eq!(report.disposition, ReportDisposition::Logged);
        assert_eq!(report.signature_id.as_deref(), Some("memory_pressure"));
    }
}

#[tokio::test(start_paused = true)]
async fn recovered_reports_carry_flags_and_context() {
    let engine = Engine::start(&EngineConfig::default()).expect("engine should start");
    let recorder = RecordingHandler::new();
    engine.add_handler(recorder.clone());

    engine
        .process(fault("locale data missing for uk-UA", "formatter"))
        .await;
    engine.shutdown().await;

    let reports = recorder.reports();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.disposition, ReportDisposition::Recovered);
    assert_eq!(report.signature_id.as_deref(), Some("locale_data_unavailable"));
    assert!(report.flags.locale_fallback, "flag snapshot reflects the mitigation");
    assert!(!report.fingerprint.is_empty());
    assert!(report.context.pid > 0);
    assert!(!report.context.os.is_empty());
}

#[tokio::test]
async fn jsonl_handler_appends_one_line_per_report() {
    let dir = tempfile::tempdir().expect("temp dir");
    let log_path = dir.path().join("reports.jsonl");

    let config: EngineConfig = toml::from_str(&format!(
        "[report]\nlog_file = {:?}\n",
        log_path.display().to_string()
    ))
    .expect("config should parse");
    let engine = Engine::start(&config).expect("engine should start");

    engine.process(fault("memory pressure warning", "heap")).await;
    engine.process(fault("gc pause exceeded budget", "heap")).await;
    engine.shutdown().await;

    let contents = std::fs::read_to_string(&log_path).expect("report log should exist");
    // The gc fault is ignored, not logged, so exactly one line lands.
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 1);

    let parsed: serde_json::Value = serde_json::from_str(lines[0]).expect("line should be JSON");
    assert_eq!(parsed["category"], "memory");
    assert_eq!(parsed["disposition"], "logged");
    assert_eq!(parsed["component"], "heap");
}

#[tokio::test]
async fn removed_handler_stops_receiving_reports() {
    let engine = Engine::start(&EngineConfig::default()).expect("engine should start");
    let recorder = RecordingHandler::new();
    engine.add_handler(recorder.clone());

    engine.process(fault("memory pressure warning", "heap")).await;
    // Let the consumer deliver before removing the handler.
    tokio::task::yield_now().await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(engine.remove_handler("recording"));
    engine.process(fault("memory pressure warning encore", "heap")).await;
    engine.shutdown().await;

    let reports = recorder.reports();
    assert_eq!(reports.len(), 1, "only the report delivered before removal");
}
