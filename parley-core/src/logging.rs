//! Tracing subscriber setup

use std::path::Path;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::schema::LoggingConfig;

pub use tracing_appender::non_blocking::WorkerGuard;

/// Prefix of the daily-rolled log files (`parley.log.YYYY-MM-DD`)
const LOG_FILE_PREFIX: &str = "parley.log";

/// Days a rolled log file is kept
const LOG_RETENTION_DAYS: u64 = 7;

/// HTTP client internals logged at `warn` unless configured otherwise; at
/// `debug` they drown the per-session lifecycle lines
const QUIET_TARGETS: &[&str] = &["hyper", "reqwest", "rustls", "h2"];

/// Per-target directives: quiet HTTP internals, then configured overrides
fn filter_directives(config: &LoggingConfig) -> Vec<String> {
    let mut directives: Vec<String> = QUIET_TARGETS
        .iter()
        .filter(|target| !config.overrides.contains_key(**target))
        .map(|target| format!("{}=warn", target))
        .collect();
    let mut overrides: Vec<_> = config.overrides.iter().collect();
    overrides.sort();
    directives.extend(
        overrides
            .into_iter()
            .map(|(module, level)| format!("{}={}", module, level)),
    );
    directives
}

/// Initialize the logging system
///
/// `RUST_LOG` and `LOG_FORMAT` take precedence over the configured level and
/// format. The returned guard must be held for as long as file logging is
/// wanted.
pub fn init_logging(config: &LoggingConfig) -> WorkerGuard {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.level.clone());
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    for directive in filter_directives(config) {
        match directive.parse() {
            Ok(parsed) => filter = filter.add_directive(parsed),
            Err(_) => eprintln!("Invalid log directive: {}", directive),
        }
    }

    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| config.format.clone());
    let is_json = format.eq_ignore_ascii_case("json");

    let file_appender = tracing_appender::rolling::daily(&config.dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Format is a runtime choice, so both layers are boxed.
    let stdout_layer = if is_json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer().with_target(true).with_thread_ids(true).boxed()
    };

    let file_layer = if is_json {
        fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    Registry::default()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    if let Err(e) = cleanup_old_logs(Path::new(&config.dir), LOG_RETENTION_DAYS) {
        eprintln!("Failed to clean up old logs: {}", e);
    }

    guard
}

/// Remove rolled log files older than `days` days
fn cleanup_old_logs(dir: &Path, days: u64) -> std::io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let now = std::time::SystemTime::now();
    let threshold = std::time::Duration::from_secs(days * 24 * 3600);
    let mut removed = 0;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        if !path.is_file() || !is_log {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > threshold) {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => eprintln!("Failed to remove old log file {:?}: {}", path, e),
            }
        }
    }
    Ok(removed)
}
