//! Supervised task execution.
//!
//! [`supervise`] is the async analogue of a top-level catch: the future
//! runs as its own task, and a panic inside it surfaces as a fault
//! instead of tearing down the caller. The engine decides whether the
//! panic is absorbed or resumed on the caller's thread.

use std::future::Future;

use tracing::{debug, warn};

use crate::engine::Engine;
use crate::fault::RawFault;
use crate::recovery::FaultOutcome;

use super::panic_text;

/// How a supervised task ended.
#[derive(Debug, PartialEq, Eq)]
pub enum SupervisedOutcome<T> {
    /// The task ran to completion.
    Completed(T),
    /// The task panicked and the engine absorbed the fault.
    Faulted,
    /// The task was cancelled before completing.
    Cancelled,
}

impl<T> SupervisedOutcome<T> {
    /// The completion value, if the task finished normally.
    pub fn into_completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Faulted | Self::Cancelled => None,
        }
    }
}

/// Run a future as a supervised task attributed to `component`.
///
/// On panic, the panic payload becomes a fatal task-failure fault and
/// runs through the pipeline. If the engine absorbs it the caller gets
/// [`SupervisedOutcome::Faulted`] and keeps running; if the engine
/// propagates it the original unwind resumes here, preserving the host
/// crash path a plain `tokio::spawn` would have hit.
pub async fn supervise<F, T>(engine: &Engine, component: &str, future: F) -> SupervisedOutcome<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(future).await {
        Ok(value) => SupervisedOutcome::Completed(value),
        Err(error) if error.is_panic() => {
            let payload = error.into_panic();
            let message = panic_text(payload.as_ref());
            warn!(component, message = %message, "supervised task panicked");
            let raw = RawFault::from_task_failure(component, &message);
            match engine.process(raw).await {
                FaultOutcome::Handled => SupervisedOutcome::Faulted,
                FaultOutcome::Propagated => std::panic::resume_unwind(payload),
            }
        }
        Err(_) => {
            debug!(component, "supervised task cancelled");
            SupervisedOutcome::Cancelled
        }
    }
}
