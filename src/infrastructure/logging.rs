//! Logging system configuration and initialization
//!
//! - Console and file output, either or both
//! - Optional JSON formatted file logs
//! - Level control from the configuration file, overridable with `RUST_LOG`
//! - One log file per process start; older files are pruned to `max_files`

#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow};
use chrono::Utc;
use lazy_static::lazy_static;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "competitor-sync";

// Keeps the non-blocking writers alive for the life of the process
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

/// UTC timestamps with millisecond precision
struct UtcTimeFormatter;

impl FormatTime for UtcTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

/// Get the log directory relative to the executable location
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Builds the level filter: `RUST_LOG` wins, then the configured level and
/// module filters. Noisy dependencies are held at warn unless tracing.
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut directives = vec![config.level.clone()];
    if config.level != "trace" {
        for (module, level) in [
            ("sqlx", "warn"),
            ("reqwest", "info"),
            ("hyper", "warn"),
            ("h2", "warn"),
            ("tower_http", "warn"),
            ("tokio", "info"),
        ] {
            if !config.module_filters.contains_key(module) {
                directives.push(format!("{module}={level}"));
            }
        }
    }
    let mut modules: Vec<_> = config.module_filters.iter().collect();
    modules.sort();
    for (module, level) in modules {
        directives.push(format!("{module}={level}"));
    }

    EnvFilter::try_new(directives.join(",")).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config);

    if !config.file_output {
        Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .with_timer(UtcTimeFormatter)
                    .with_target(false)
                    .compact(),
            )
            .try_init()
            .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;
        return Ok(());
    }

    let log_dir = config.directory.clone().unwrap_or_else(get_log_directory);
    std::fs::create_dir_all(&log_dir)
        .map_err(|e| anyhow!("Failed to create log directory {}: {}", log_dir.display(), e))?;

    let file_name = format!("{}.{}.log", LOG_FILE_PREFIX, Utc::now().format("%Y%m%dT%H%M%S"));
    let (file_writer, guard) = non_blocking(rolling::never(&log_dir, &file_name));
    if let Ok(mut guards) = LOG_GUARDS.lock() {
        guards.push(guard);
    }

    let file_layer = if config.json_format {
        fmt::layer()
            .with_writer(file_writer)
            .with_timer(UtcTimeFormatter)
            .with_ansi(false)
            .json()
            .boxed()
    } else {
        fmt::layer()
            .with_writer(file_writer)
            .with_timer(UtcTimeFormatter)
            .with_ansi(false)
            .with_target(true)
            .boxed()
    };
    let console_layer = config.console_output.then(|| {
        fmt::layer()
            .with_timer(UtcTimeFormatter)
            .with_target(false)
            .compact()
    });

    Registry::default()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    info!("📝 Logging initialized, writing to {}", log_dir.join(&file_name).display());

    match cleanup_old_logs(&log_dir, config.max_files) {
        Ok(0) => {}
        Ok(removed) => info!("🧹 Removed {} old log files", removed),
        Err(e) => warn!("⚠️  Log cleanup failed: {}", e),
    }

    Ok(())
}

/// Log basic process information at startup
pub fn log_system_info() {
    info!("🚀 competitor-sync v{}", env!("CARGO_PKG_VERSION"));
    info!("   OS: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
    if let Ok(parallelism) = std::thread::available_parallelism() {
        info!("   Available parallelism: {}", parallelism);
    }
}

/// Deletes the oldest log files so at most `max_files` remain.
/// Returns how many files were removed.
pub fn cleanup_old_logs(log_dir: &Path, max_files: u32) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = std::fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with(LOG_FILE_PREFIX) && name.ends_with(".log")
        })
        .filter_map(|entry| {
            let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
            Some((entry.path(), modified))
        })
        .collect();

    if log_files.len() <= max_files as usize {
        return Ok(0);
    }

    // Newest first; names carry the start timestamp so they break ties
    log_files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

    let mut removed = 0;
    for (path, _) in log_files.into_iter().skip(max_files as usize) {
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to delete old log file {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}
