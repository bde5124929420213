//! Logging setup
//!
//! Logging is off unless MERIDIAN_LOG is set to a level (e.g. `debug`).
//! One-shot commands log to stderr; `watch` logs to a file so status lines
//! on stdout stay readable.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::info;
use tracing_subscriber::EnvFilter;

use meridian_core::Config;

const LOG_ENV: &str = "MERIDIAN_LOG";

fn env_filter() -> Option<EnvFilter> {
    let level = std::env::var(LOG_ENV).ok()?;
    Some(EnvFilter::new(format!(
        "meridian_core={},meridian_cli={}",
        level, level
    )))
}

/// Log to stderr for one-shot commands
pub fn init_stderr_logging() {
    let Some(env_filter) = env_filter() else {
        return;
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Log to `config.log_file` (default `{data_dir}/debug.log`) for long-running mode
pub fn init_file_logging(config: &Config) {
    let Some(env_filter) = env_filter() else {
        return;
    };

    let log_path = config.log_path();
    let log_file = match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
            return;
        }
    };

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .try_init();

    info!("Logging to {:?}", log_path);
}
