//! Diagnostic-log fault capture.
//!
//! Other subsystems already narrate their failures through `tracing`.
//! [`FaultCaptureLayer`] turns every ERROR event from a foreign target
//! into a fault, which catches problems that never unwind (bridge call
//! failures that log and limp on, decoder errors swallowed by a retry
//! loop). Events from this crate's own targets are ignored so reports
//! and pipeline logs cannot re-enter the pipeline.

use std::sync::Arc;

use anyhow::Context as _;
use tokio::runtime::Handle;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::engine::Engine;
use crate::fault::RawFault;

/// Tracing layer that feeds foreign ERROR events into the engine.
pub struct FaultCaptureLayer {
    engine: Arc<Engine>,
    runtime: Handle,
    ignored_prefixes: Vec<String>,
}

impl FaultCaptureLayer {
    /// Build a capture layer bound to the given engine.
    ///
    /// # Errors
    ///
    /// Returns an error when called outside a Tokio runtime; events can
    /// arrive on any thread and pipeline work is spawned via the handle.
    pub fn new(engine: &Arc<Engine>) -> anyhow::Result<Self> {
        let runtime =
            Handle::try_current().context("capture layer requires a running tokio runtime")?;
        Ok(Self {
            engine: Arc::clone(engine),
            runtime,
            ignored_prefixes: vec![env!("CARGO_PKG_NAME").to_owned()],
        })
    }

    /// Also ignore events whose target starts with `prefix`.
    ///
    /// Useful for chatty dependencies whose errors are routine.
    #[must_use]
    pub fn with_ignored_target(mut self, prefix: impl Into<String>) -> Self {
        self.ignored_prefixes.push(prefix.into());
        self
    }

    fn is_ignored(&self, target: &str) -> bool {
        self.ignored_prefixes
            .iter()
            .any(|prefix| target.starts_with(prefix.as_str()))
    }
}

impl<S: Subscriber> Layer<S> for FaultCaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() != Level::ERROR || self.is_ignored(metadata.target()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        if visitor.message.is_empty() {
            return;
        }

        let raw = RawFault::from_diagnostic(metadata.target(), visitor.message);
        let engine = Arc::clone(&self.engine);
        self.runtime.spawn(async move {
            let _ = engine.process(raw).await;
        });
    }
}

/// Extracts the conventional `message` field from an event.
#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_owned();
        }
    }
}
