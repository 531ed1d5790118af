//! Logging initialization.
//!
//! The crate itself only emits `tracing` events; installing a subscriber is
//! the embedding application's call. These helpers cover the two common
//! setups: stderr for interactive use, a rotated file for long-lived
//! sessions.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::errors::{VmboxError, VmboxResult};

/// Environment variable consulted before `RUST_LOG` for filter directives.
pub const LOG_ENV_VAR: &str = "VMBOX_LOG";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a stderr subscriber filtered by `VMBOX_LOG`/`RUST_LOG`.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

/// Install a subscriber writing to a daily-rotated `vmbox.log` in `dir`.
///
/// The returned guard owns the background writer; keep it alive for the
/// lifetime of the process or buffered events are lost.
pub fn init_with_file(dir: &Path) -> VmboxResult<WorkerGuard> {
    let appender = tracing_appender::rolling::daily(dir, "vmbox.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| VmboxError::Internal(format!("failed to install log subscriber: {e}")))?;
    Ok(guard)
}
