//! Logging infrastructure for instant-req.
//!
//! Provides structured file logging with daily rotation to platform-standard directories.
//! The level filter sits behind a reload layer so config changes apply without a restart.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use directories::ProjectDirs;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, reload};

/// Prefix of every log file name.
const LOG_FILE_PREFIX: &str = "instant-req";

const RETENTION_DAYS: u64 = 7;

/// Handle for swapping the level filter at runtime.
pub type ReloadHandle = reload::Handle<EnvFilter, Registry>;

/// Result of initializing the logging system.
pub struct LoggingContext {
    /// Guard that must be held for the application lifetime to ensure logs are flushed.
    pub _guard: WorkerGuard,
    /// The session ID for this invocation.
    pub session_id: String,
    /// The directory where logs are written.
    pub log_directory: PathBuf,
    pub reload_handle: ReloadHandle,
}

/// Error that occurred during logging initialization.
#[derive(Debug)]
pub struct LoggingError {
    pub message: String,
}

impl std::fmt::Display for LoggingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Generates a 6-character random hex session ID.
fn generate_session_id() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let bytes: [u8; 3] = rng.random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// `RUST_LOG` when set, the configured level otherwise.
fn initial_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes the logging system.
///
/// The returned `WorkerGuard` must be held for the application lifetime.
pub fn init(level: &str) -> Result<LoggingContext, LoggingError> {
    let session_id = generate_session_id();
    let log_dir = log_directory()?;

    fs::create_dir_all(&log_dir).map_err(|e| LoggingError {
        message: format!("Failed to create log directory: {}", e),
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let (filter_layer, reload_handle) = reload::Layer::new(initial_filter(level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_span_events(FmtSpan::NONE)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| LoggingError {
            message: format!("Failed to install log subscriber: {}", e),
        })?;

    info!(session_id = %session_id, version = env!("CARGO_PKG_VERSION"), "session_start");

    Ok(LoggingContext {
        _guard: guard,
        session_id,
        log_directory: log_dir,
        reload_handle,
    })
}

/// Platform log directory.
///
/// macOS: ~/Library/Logs/instant-req/
/// Linux: ~/.local/state/instant-req/
/// Windows: %LocalAppData%\instant-req\
fn log_directory() -> Result<PathBuf, LoggingError> {
    let project_dirs =
        ProjectDirs::from("dev", "instant-req", "instant-req").ok_or_else(|| LoggingError {
            message: "Failed to determine platform directories".to_string(),
        })?;

    let log_dir = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|home| home.join("Library").join("Logs").join(LOG_FILE_PREFIX))
    } else {
        project_dirs
            .state_dir()
            .map(PathBuf::from)
            .or_else(|| Some(project_dirs.data_local_dir().to_path_buf()))
    };

    log_dir.ok_or_else(|| LoggingError {
        message: "Failed to determine log directory".to_string(),
    })
}

/// Swap the active level filter. A set `RUST_LOG` keeps precedence.
pub fn update_log_level(handle: &ReloadHandle, level: &str) -> Result<(), String> {
    if std::env::var_os("RUST_LOG").is_some() {
        debug!(level, "log_level_update_skipped_rust_log");
        return Ok(());
    }
    let filter = EnvFilter::try_new(level).map_err(|e| format!("Invalid log level: {}", e))?;
    handle
        .reload(filter)
        .map_err(|e| format!("Failed to reload log filter: {}", e))
}

/// Cleans up log files older than the retention period.
///
/// Errors are logged at WARN level but don't prevent app startup.
pub fn cleanup_old_logs(log_dir: &Path) {
    let retention = Duration::from_secs(RETENTION_DAYS * 24 * 60 * 60);
    let deleted = remove_logs_older_than(log_dir, retention, SystemTime::now());
    if deleted > 0 {
        debug!(count = deleted, "log_cleanup_completed");
    }
}

fn remove_logs_older_than(log_dir: &Path, retention: Duration, now: SystemTime) -> u32 {
    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "log_cleanup_read_dir_failed");
            return 0;
        }
    };

    let prefix = format!("{}.", LOG_FILE_PREFIX);
    let mut deleted_count = 0u32;

    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();

        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) if name.starts_with(&prefix) => name.to_string(),
            _ => continue,
        };

        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                warn!(file = %file_name, error = %e, "log_metadata_failed");
                continue;
            }
        };

        // Files stamped in the future are left alone.
        let Ok(age) = now.duration_since(modified) else {
            continue;
        };

        if age > retention {
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(file = %file_name, age_days = age.as_secs() / 86400, "old_log_deleted");
                    deleted_count += 1;
                }
                Err(e) => {
                    warn!(file = %file_name, error = %e, "old_log_delete_failed");
                }
            }
        }
    }

    deleted_count
}
