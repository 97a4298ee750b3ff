//! Bootstraps `tracing` from the `A2C_SMCP_LOG_*` environment variables
//! instead of a fixed `RUST_LOG`, matching the env surface the rest of the
//! a2c-smcp ecosystem expects a host process to honor.

use std::path::Path;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

fn truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn level_name(raw: &str) -> &'static str {
    match raw.trim().to_ascii_lowercase().as_str() {
        "debug" => "debug",
        "warning" => "warn",
        "error" | "critical" => "error",
        _ => "info",
    }
}

fn split_log_path(raw: &str) -> (PathBuf, std::ffi::OsString) {
    let path = Path::new(raw);
    match (path.parent(), path.file_name()) {
        (Some(dir), Some(name)) if !dir.as_os_str().is_empty() => (dir.to_path_buf(), name.to_os_string()),
        _ => (PathBuf::from("."), path.as_os_str().to_os_string()),
    }
}

/// Returns a guard that must be kept alive for the process lifetime when
/// file logging is active; dropping it stops the background flush thread.
/// `None` either means silent mode or stdout logging (no guard needed).
pub fn init() -> Option<WorkerGuard> {
    if std::env::var("A2C_SMCP_LOG_SILENT").map(|v| truthy(&v)).unwrap_or(false) {
        return None;
    }

    let level = std::env::var("A2C_SMCP_LOG_LEVEL").map(|v| level_name(&v)).unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("smcp_cli={level},smcp_hub={level},smcp_agent={level},smcp_computer={level}")));

    match std::env::var("A2C_SMCP_LOG_FILE") {
        Ok(raw) if !raw.trim().is_empty() => {
            let (dir, file_name) = split_log_path(&raw);
            if let Err(e) = std::fs::create_dir_all(&dir) {
                eprintln!("smcp: failed to create log directory {}: {e}", dir.display());
            }
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry().with(fmt::layer().with_writer(writer).with_ansi(false)).with(filter).init();
            Some(guard)
        }
        _ => {
            tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
            None
        }
    }
}
