//! Fault capture at the process boundaries.
//!
//! Three surfaces feed the engine: the process panic hook, supervised
//! task joins, and a tracing layer that watches other subsystems' error
//! logs. Each surface is thin glue that builds a [`RawFault`] and hands
//! it to [`Engine::process`]; all policy lives behind that call.
//!
//! [`RawFault`]: crate::fault::RawFault
//! [`Engine::process`]: crate::engine::Engine::process

use std::any::Any;

pub mod diagnostics;
pub mod panic_hook;
pub mod task;

pub use diagnostics::FaultCaptureLayer;
pub use task::{supervise, SupervisedOutcome};

/// Best-effort text of a panic payload.
pub(crate) fn panic_text(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "panic with non-string payload".to_owned()
    }
}
