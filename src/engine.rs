//! Engine wiring and the public surface the host calls.
//!
//! [`Engine::start`] assembles the catalog, orchestrator, sink, and
//! feature gate from one [`EngineConfig`] and spawns the sink consumer.
//! Everything after that goes through [`Engine::process`]: ingress
//! surfaces hand it raw faults and act on the returned outcome.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::fault::RawFault;
use crate::gate::FeatureGate;
use crate::recovery::{
    FaultOutcome, Orchestrator, RestartAdvisory, RuntimeFlags, Statistics, StrategyRegistry,
};
use crate::report::{run_sink, JsonlHandler, ReportHandler, ReportSink, TracingHandler};
use crate::signature::SignatureCatalog;
use crate::stability::StabilitySnapshot;

/// The assembled fault engine.
///
/// Cheap to share behind an [`Arc`]; every method takes `&self`.
pub struct Engine {
    catalog: SignatureCatalog,
    orchestrator: Orchestrator,
    sink: Arc<ReportSink>,
    gate: FeatureGate,
    flags: Arc<RuntimeFlags>,
    shutdown_tx: watch::Sender<bool>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("signatures", &self.catalog.len())
            .field("sink", &self.sink)
            .finish()
    }
}

impl Engine {
    /// Start an engine with the built-in strategies.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured signature pattern does not
    /// compile, the report log cannot be opened, or no Tokio runtime is
    /// running.
    pub fn start(config: &EngineConfig) -> anyhow::Result<Arc<Self>> {
        let catalog = config
            .signature_catalog()
            .context("invalid signature catalog")?;
        Self::start_with(config, catalog, StrategyRegistry::with_defaults())
    }

    /// Start an engine with an explicit catalog and strategy registry.
    ///
    /// This is the seam QA builds and tests drive: swap in counting or
    /// failing strategies without touching the wiring.
    ///
    /// # Errors
    ///
    /// Returns an error if the report log cannot be opened or no Tokio
    /// runtime is running.
    pub fn start_with(
        config: &EngineConfig,
        catalog: SignatureCatalog,
        strategies: StrategyRegistry,
    ) -> anyhow::Result<Arc<Self>> {
        let runtime =
            Handle::try_current().context("fault engine requires a running tokio runtime")?;

        let flags = Arc::new(RuntimeFlags::default());
        let sink = Arc::new(ReportSink::new(config.report.queue_capacity));
        if config.report.tracing_handler {
            sink.add_handler(Arc::new(TracingHandler));
        }
        if let Some(path) = &config.report.log_file {
            let handler = JsonlHandler::create(path).context("failed to open report log")?;
            sink.add_handler(Arc::new(handler));
        }

        let orchestrator = Orchestrator::new(
            config.stability_thresholds(),
            config.recovery_tuning(),
            strategies,
            Arc::clone(&flags),
            Arc::clone(&sink),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let consumer = runtime.spawn(run_sink(Arc::clone(&sink), shutdown_rx));

        info!(
            signatures = catalog.len(),
            queue_capacity = config.report.queue_capacity,
            "fault engine started"
        );

        Ok(Arc::new(Self {
            catalog,
            orchestrator,
            sink,
            gate: config.feature_gate(),
            flags,
            shutdown_tx,
            consumer: Mutex::new(Some(consumer)),
        }))
    }

    /// Classify one fault and run the pipeline on it.
    ///
    /// Returns whether the caller may continue or must let the fault
    /// propagate to the host crash path.
    pub async fn process(&self, raw: RawFault) -> FaultOutcome {
        let classification = self.catalog.classify(&raw);
        self.orchestrator.handle(&raw, &classification).await
    }

    /// Whether a gated feature may run right now.
    ///
    /// Side-effect free; callable at arbitrary frequency.
    pub fn is_allowed(&self, feature: &str) -> bool {
        self.gate.is_allowed(feature, self.orchestrator.stability())
    }

    /// Current derived stability.
    pub fn stability(&self) -> StabilitySnapshot {
        self.orchestrator.stability()
    }

    /// Aggregate counters for diagnostics surfaces.
    pub fn statistics(&self) -> Statistics {
        self.orchestrator.statistics()
    }

    /// Reset ledger, attempt table, and the restart advisory.
    pub fn clear_history(&self) {
        self.orchestrator.clear_history();
    }

    /// The degradation flags strategies toggle and the host reads.
    pub fn flags(&self) -> Arc<RuntimeFlags> {
        Arc::clone(&self.flags)
    }

    /// Register a reporting handler.
    pub fn add_handler(&self, handler: Arc<dyn ReportHandler>) {
        self.sink.add_handler(handler);
    }

    /// Remove every reporting handler with this name.
    pub fn remove_handler(&self, name: &str) -> bool {
        self.sink.remove_handler(name)
    }

    /// Watch the cascade guard's restart advisory.
    pub fn restart_advisory(&self) -> watch::Receiver<RestartAdvisory> {
        self.orchestrator.restart_advisory()
    }

    /// Stop the sink consumer after it flushes the queue.
    ///
    /// Idempotent; later calls return immediately.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let consumer = {
            let mut slot = self
                .consumer
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };
        if let Some(handle) = consumer {
            debug!("waiting for report sink to drain");
            let _ = handle.await;
        }
        info!("fault engine stopped");
    }
}
