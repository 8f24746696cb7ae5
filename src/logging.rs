//! tracing subscriber setup.
//!
//! Console output always goes to stderr: in stdio mode stdout carries the
//! JSON-RPC stream and must stay clean.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};

/// Log file name prefix inside the log directory
const LOG_FILE_PREFIX: &str = "wordpress-mcp.log";

/// Resolved logging settings
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` wins when set
    pub level: String,
    pub format: LogFormat,
    /// Directory for the daily-rotated log file
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
            log_dir: None,
        }
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.clone(),
            format: config.format,
            log_dir: config.file.clone(),
        }
    }
}

impl LogConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_log_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Keeps the file writer flushing; hold it for the process lifetime
#[derive(Debug, Default)]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber
pub fn init_logging(config: &LogConfig) -> Result<LogGuard> {
    let console = match config.format {
        LogFormat::Plain => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(false)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(false)
            .boxed(),
    };

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            ensure_log_dir(dir)?;
            let appender = rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(config.filter())
        .with(console)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    if let Some(dir) = &config.log_dir {
        tracing::info!("Writing logs to {}", dir.join(LOG_FILE_PREFIX).display());
    }

    Ok(LogGuard { _file: guard })
}

fn ensure_log_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("cannot create log directory {}", dir.display()))
}
