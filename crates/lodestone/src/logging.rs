//! Logging system setup and configuration
//!
//! Human-readable or JSON output on stdout, plus an optional plain-text log
//! file. The file name pattern may contain `%D`, replaced by the current UTC
//! date as `YYYY-MM-DD`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use game_server::ServerConfig;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Replaces every `%D` in `pattern` with the date of `now`.
pub fn expand_log_pattern(pattern: &str, now: DateTime<Utc>) -> String {
    pattern.replace("%D", &now.format("%Y-%m-%d").to_string())
}

fn file_layer(pattern: &str) -> Result<Option<BoxedLayer>> {
    if pattern.trim().is_empty() {
        return Ok(None);
    }
    let path = PathBuf::from(expand_log_pattern(pattern, Utc::now()));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    Ok(Some(
        fmt::layer()
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(Mutex::new(file))
            .boxed(),
    ))
}

/// Initialize the logging system
///
/// # Arguments
/// * `config` - Server configuration; `logging.level`, `logging.json_format`
///   and `console.log_file` are read
///
/// # Returns
/// * `Result<()>` - Fails if the log file cannot be opened or a global
///   subscriber is already installed
///
/// # Environment Variables
/// * `RUST_LOG` - Overrides the configured level filter
pub fn setup_logging(config: &ServerConfig) -> Result<()> {
    let level = config.logging.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout: BoxedLayer = if config.logging.json_format {
        fmt::layer()
            .json()
            .with_file(false)
            .with_line_number(false)
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    } else {
        fmt::layer()
            .with_ansi(true)
            .with_file(false)
            .with_line_number(false)
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    };

    let mut layers = vec![stdout];
    layers.extend(file_layer(&config.console.log_file)?);

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("failed to install the global tracing subscriber")?;

    info!("🔧 Logging initialized with level: {}", level);
    Ok(())
}
