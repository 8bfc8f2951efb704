//! Process and platform facts attached to every outbound report.

use serde::{Deserialize, Serialize};

/// Static runtime facts captured once at engine start.
///
/// Everything here is stable for the life of the process, so capture
/// runs once and reports clone the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeContext {
    /// Operating system name, e.g. `linux` or `android`.
    pub os: String,
    /// CPU architecture, e.g. `aarch64`.
    pub arch: String,
    /// Version of the embedding application.
    pub app_version: String,
    /// Process id.
    pub pid: u32,
}

impl RuntimeContext {
    /// Capture the current process context.
    pub fn capture() -> Self {
        Self {
            os: std::env::consts::OS.to_owned(),
            arch: std::env::consts::ARCH.to_owned(),
            app_version: env!("CARGO_PKG_VERSION").to_owned(),
            pid: std::process::id(),
        }
    }
}
