//! Built-in report handlers.
//!
//! Handlers receive finished reports from the sink consumer, already
//! enriched and ordered. A handler that fails returns an error; the
//! consumer logs it and moves on, so one broken destination never
//! starves the others.

use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::fault::Severity;

use super::FaultReport;

// ---------------------------------------------------------------------------
// ReportHandler
// ---------------------------------------------------------------------------

/// A delivery destination for fault reports.
#[async_trait]
pub trait ReportHandler: Send + Sync {
    /// Stable handler name, used for removal and in failure logs.
    fn name(&self) -> &str;

    /// Deliver one report.
    ///
    /// # Errors
    ///
    /// Returns an error when delivery fails; the sink consumer logs the
    /// failure and continues with the remaining handlers.
    async fn deliver(&self, report: &FaultReport) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// TracingHandler
// ---------------------------------------------------------------------------

/// Emits each report as a structured log event.
///
/// Log level follows report severity. Events carry this crate's target,
/// which the diagnostic ingress ignores, so reports never re-enter the
/// pipeline as new faults.
#[derive(Debug, Default)]
pub struct TracingHandler;

#[async_trait]
impl ReportHandler for TracingHandler {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn deliver(&self, report: &FaultReport) -> anyhow::Result<()> {
        match report.severity {
            Severity::Critical => error!(
                id = %report.id,
                category = %report.category,
                severity = %report.severity,
                disposition = %report.disposition,
                component = %report.component,
                message = %report.message,
                "fault report"
            ),
            Severity::High => warn!(
                id = %report.id,
                category = %report.category,
                severity = %report.severity,
                disposition = %report.disposition,
                component = %report.component,
                message = %report.message,
                "fault report"
            ),
            Severity::Medium | Severity::Low => info!(
                id = %report.id,
                category = %report.category,
                severity = %report.severity,
                disposition = %report.disposition,
                component = %report.component,
                message = %report.message,
                "fault report"
            ),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JsonlHandler
// ---------------------------------------------------------------------------

/// Appends each report as one JSON line to a local file.
///
/// The file survives crashes of the embedding app, so the next launch
/// can upload whatever the previous session managed to record.
pub struct JsonlHandler {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonlHandler {
    /// Open (or create) an append-only report log at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// file cannot be opened for append.
    pub fn create(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create report log dir {}", parent.display()))?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open report log {}", path.display()))?;
        Ok(Self {
            writer: Mutex::new(Box::new(file)),
        })
    }

    /// Build a handler over an arbitrary writer (for testing).
    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl ReportHandler for JsonlHandler {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn deliver(&self, report: &FaultReport) -> anyhow::Result<()> {
        let line = serde_json::to_string(report).context("failed to serialize fault report")?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("report log lock poisoned: {e}"))?;
        writeln!(writer, "{line}").context("failed to write fault report")?;
        writer.flush().context("failed to flush fault report")?;
        Ok(())
    }
}
