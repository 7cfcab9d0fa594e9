use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use time::macros::format_description;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{self, fmt, prelude::*};

const LOG_RETENTION_DAYS: u64 = 7;

/// Where file logs go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLogging {
    /// Stderr only (tests, one-shot commands)
    Disabled,
    /// A `session-<timestamp>-<pid>.log` file in the user cache directory
    Session,
    /// An explicit file, appended to
    Path(PathBuf),
}

/// Get the log directory path in the user-specific OS cache directory
/// - Linux: ~/.cache/vue-virtual-docs/
/// - macOS: ~/Library/Caches/vue-virtual-docs/
/// - Windows: %LOCALAPPDATA%\vue-virtual-docs\
fn get_log_dir() -> io::Result<PathBuf> {
    let mut log_dir = dirs::cache_dir().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "Unable to determine user cache directory")
    })?;
    log_dir.push("vue-virtual-docs");

    if !log_dir.exists() {
        fs::create_dir_all(&log_dir)?;
    }

    Ok(log_dir)
}

/// Clean up session logs older than LOG_RETENTION_DAYS
fn cleanup_old_logs(log_dir: &Path) {
    let now = std::time::SystemTime::now();
    let retention = std::time::Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);

    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let is_session_log = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with("session-") && name.ends_with(".log"));
        if !metadata.is_file() || !is_session_log {
            continue;
        }
        let expired = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > retention);
        if expired {
            if let Err(e) = fs::remove_file(entry.path()) {
                eprintln!("Failed to remove old log file {:?}: {}", entry.path(), e);
            }
        }
    }
}

fn session_log_path() -> io::Result<PathBuf> {
    let log_dir = get_log_dir()?;
    cleanup_old_logs(&log_dir);

    let timestamp = time::OffsetDateTime::now_utc()
        .format(format_description!("[year][month][day]-[hour][minute][second]"))
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    Ok(log_dir.join(format!("session-{}-{}.log", timestamp, std::process::id())))
}

/// Initialize logger with stderr and optional file output
/// Returns a WorkerGuard that must be kept alive for the duration of the program
///
/// # Arguments
/// * `no_color` - Disable ANSI colors in stderr output
/// * `log_level` - Override log level (otherwise uses RUST_LOG or defaults to "info")
/// * `file_logging` - Where, if anywhere, to write the DEBUG-level file log
///
/// # Logging Behavior
/// - **Stderr**: Logs at the configured level (default "info")
/// - **File**: Logs at DEBUG level, including every parse, eviction and resolution step
pub fn init_logger(
    no_color: bool,
    log_level: Option<&str>,
    file_logging: FileLogging,
) -> io::Result<WorkerGuard> {
    let timer = fmt::time::OffsetTime::new(
        UtcOffset::UTC,
        format_description!("[[[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z]"),
    );

    let stderr_filter = match log_level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer.clone())
        .with_ansi(!no_color)
        .with_filter(stderr_filter);

    let log_path = match file_logging {
        FileLogging::Disabled => None,
        FileLogging::Session => Some(session_log_path()?),
        FileLogging::Path(path) => Some(path),
    };

    let (result, guard) = match &log_path {
        Some(path) => {
            let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let file_layer = fmt::layer()
                .with_writer(non_blocking)
                .with_timer(timer)
                .with_ansi(false)
                .with_filter(tracing_subscriber::EnvFilter::new("debug"));

            // Each layer has its own filter, so no global filter needed
            let result = tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .try_init();
            (result, guard)
        }
        None => {
            let (_, guard) = tracing_appender::non_blocking(std::io::sink());
            let result = tracing_subscriber::registry().with(stderr_layer).try_init();
            (result, guard)
        }
    };

    match result {
        Ok(()) => {}
        // Ignore errors due to the subscriber already being set
        Err(e) if e.to_string().contains("already been set") || e.to_string().contains("SetLoggerError") => {}
        Err(e) => return Err(io::Error::new(io::ErrorKind::Other, e)),
    }
    if let Some(path) = log_path {
        eprintln!("Logging to file: {:?}", path);
    }
    Ok(guard)
}
