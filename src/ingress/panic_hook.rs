//! Process-wide panic capture.
//!
//! The installed hook records every panic as a fault and then chains to
//! whatever hook was installed before it, so default stderr output and
//! any host-installed crash reporter keep working. Hooks run while the
//! unwind is already in progress; absorbing a panic is the supervised
//! task boundary's job ([`crate::ingress::task::supervise`]), not the
//! hook's.

use std::backtrace::Backtrace;
use std::panic::{AssertUnwindSafe, PanicHookInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio::runtime::Handle;
use tracing::debug;

use crate::engine::Engine;
use crate::fault::RawFault;

use super::panic_text;

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the fault-capturing panic hook, chaining the previous one.
///
/// Process-global and installable once; later calls are no-ops. The
/// engine passed here is kept alive for the rest of the process.
///
/// # Errors
///
/// Returns an error when called outside a Tokio runtime; the hook needs
/// a handle to spawn pipeline work from the panicking thread.
pub fn install(engine: &Arc<Engine>) -> anyhow::Result<()> {
    let runtime = Handle::try_current().context("panic hook requires a running tokio runtime")?;

    if INSTALLED.swap(true, Ordering::SeqCst) {
        debug!("panic hook already installed");
        return Ok(());
    }

    let engine = Arc::clone(engine);
    let previous = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        let raw = fault_from_panic(info);
        let engine = Arc::clone(&engine);
        // The runtime may already be gone while the process is crashing;
        // losing the report is acceptable, panicking inside a hook is not.
        let spawned = std::panic::catch_unwind(AssertUnwindSafe(|| {
            runtime.spawn(async move {
                let _ = engine.process(raw).await;
            });
        }));
        drop(spawned);
        previous(info);
    }));

    debug!("panic hook installed");
    Ok(())
}

fn fault_from_panic(info: &PanicHookInfo<'_>) -> RawFault {
    let mut message = panic_text(info.payload());
    if let Some(location) = info.location() {
        message.push_str(&format!(" at {}:{}", location.file(), location.line()));
    }
    let backtrace = Backtrace::force_capture().to_string();
    RawFault::from_panic(message, backtrace)
}
