//! Logging setup for the cfglock binary.
//!
//! Console output goes to stderr so it never mixes with the output of the
//! program run under the lock. An optional daily rolling file `cfglock.log`
//! captures the same events.
//!
//! Log files are stored in `~/cfglock/logs` by default.
//! Override with the `CFGLOCK_LOG_DIR` environment variable or `logs.dir` config.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Log file name inside the log directory
const LOG_FILE_NAME: &str = "cfglock.log";

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{}/cfglock/logs", home))
}

/// Logging configuration for the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Base log directory (default: `~/cfglock/logs`)
    pub log_dir: PathBuf,
    /// Enable console output
    pub console_output: bool,
    /// Enable file logging
    pub file_logging: bool,
    /// Default log level, `RUST_LOG` takes precedence
    pub level: Level,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            console_output: true,
            file_logging: false,
            level: Level::INFO,
        }
    }
}

impl LoggingConfig {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        let log_dir = std::env::var("CFGLOCK_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_log_dir());

        let file_logging = std::env::var("CFGLOCK_LOG_FILE")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);

        let level = std::env::var("CFGLOCK_LOG_LEVEL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Level::INFO);

        Self {
            log_dir,
            console_output: true,
            file_logging,
            level,
        }
    }

    /// Create from application configuration.
    pub fn from_config(
        log_dir: Option<String>,
        console_output: bool,
        file_logging: bool,
        level: String,
    ) -> Self {
        let log_dir = log_dir.map(PathBuf::from).unwrap_or_else(default_log_dir);
        let level = level.parse().unwrap_or(Level::INFO);

        Self {
            log_dir,
            console_output,
            file_logging,
            level,
        }
    }
}

/// Guard that keeps the file appender alive.
///
/// When dropped, all buffered log output is flushed.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()))
}

/// Initialize console and optional file logging.
///
/// # Returns
///
/// A [`LoggingGuard`] that must be kept alive for the duration of the application.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut file_guard = None;

    if config.console_output {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true)
            .with_filter(env_filter(config.level));
        layers.push(Box::new(console_layer));
    }

    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;
        let appender = RollingFileAppender::new(Rotation::DAILY, &config.log_dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);

        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_thread_names(true)
            .with_filter(env_filter(config.level));
        layers.push(Box::new(file_layer));
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
