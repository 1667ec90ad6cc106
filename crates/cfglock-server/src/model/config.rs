//! Configuration management for the cfglock binary
//!
//! Settings are layered, lowest precedence first:
//! - `conf/cfglock.yml` (or the file given with `--config`), optional
//! - `CFGLOCK_*` environment variables, `__` separating sections
//!   (e.g. `CFGLOCK_LOCK__DIR=/mnt/datadir/locks`)
//! - command line overrides

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use config::{Config, Environment};

use cfglock_common::{
    DEFAULT_TRY_LOCK_TIMEOUT_MS, GLOBAL_LOCK_NAME, LOCK_DIR_PROPERTY, LOCK_ENABLED_PROPERTY,
    LOCK_NAME_PROPERTY, LOCK_PROVIDER_PROPERTY, LOG_CONSOLE_PROPERTY, LOG_DIR_PROPERTY,
    LOG_FILE_PROPERTY, LOG_LEVEL_PROPERTY, LockError, TRY_LOCK_NON_BLOCKING_PROPERTY,
    TRY_LOCK_TIMEOUT_PROPERTY,
};
use cfglock_consistency::{LockSettings, ProviderKind};

use crate::startup::LoggingConfig;

const DEFAULT_CONFIG_FILE: &str = "conf/cfglock.yml";

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "cfglock", version, about = "Serialize configuration writers across a cluster")]
pub struct Cli {
    /// Configuration file
    #[arg(short = 'c', long = "config", env = "CFGLOCK_CONFIG")]
    pub config_file: Option<PathBuf>,

    /// Shared directory holding lock files
    #[arg(long = "lock-dir")]
    pub lock_dir: Option<PathBuf>,

    /// Lock provider: file or memory
    #[arg(long = "provider")]
    pub provider: Option<String>,

    /// Disable configuration locking (single-node deployments)
    #[arg(long = "disabled")]
    pub disabled: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a program while holding the configuration lock
    Exec(ExecArgs),
    /// Report whether the cluster lock is currently held (file provider only)
    Status,
}

#[derive(Debug, Args)]
pub struct ExecArgs {
    /// Take the local read lock instead of the cluster write lock
    #[arg(long = "read")]
    pub read: bool,

    /// Exit with code 3 instead of waiting when the lock is busy on any node
    #[arg(long = "try")]
    pub try_only: bool,

    /// Program to run, followed by its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub program: Vec<String>,
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load configuration for the given command line
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let file = cli
            .config_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut builder = Config::builder()
            .add_source(config::File::from(file).required(cli.config_file.is_some()))
            .add_source(
                Environment::with_prefix("cfglock")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(dir) = &cli.lock_dir {
            builder = builder.set_override(LOCK_DIR_PROPERTY, dir.to_string_lossy().to_string())?;
        }
        if let Some(provider) = &cli.provider {
            builder = builder.set_override(LOCK_PROVIDER_PROPERTY, provider.clone())?;
        }
        if cli.disabled {
            builder = builder.set_override(LOCK_ENABLED_PROPERTY, false)?;
        }

        Ok(Configuration {
            config: builder.build()?,
        })
    }

    // ========================================================================
    // Lock Configuration
    // ========================================================================

    pub fn lock_enabled(&self) -> bool {
        self.config.get_bool(LOCK_ENABLED_PROPERTY).unwrap_or(true)
    }

    pub fn lock_provider(&self) -> Result<ProviderKind, LockError> {
        match self.config.get_string(LOCK_PROVIDER_PROPERTY) {
            Ok(value) => value.parse().map_err(LockError::Config),
            Err(_) => Ok(ProviderKind::default()),
        }
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.config
            .get_string(LOCK_DIR_PROPERTY)
            .map(PathBuf::from)
            .unwrap_or_else(|_| LockSettings::default().lock_dir)
    }

    pub fn lock_name(&self) -> String {
        self.config
            .get_string(LOCK_NAME_PROPERTY)
            .unwrap_or(GLOBAL_LOCK_NAME.to_string())
    }

    pub fn try_lock_timeout(&self) -> Duration {
        let millis = self
            .config
            .get_int(TRY_LOCK_TIMEOUT_PROPERTY)
            .unwrap_or(DEFAULT_TRY_LOCK_TIMEOUT_MS as i64);
        Duration::from_millis(millis.max(0) as u64)
    }

    pub fn try_lock_non_blocking(&self) -> bool {
        self.config
            .get_bool(TRY_LOCK_NON_BLOCKING_PROPERTY)
            .unwrap_or(false)
    }

    pub fn lock_settings(&self) -> Result<LockSettings, LockError> {
        let settings = LockSettings {
            enabled: self.lock_enabled(),
            provider: self.lock_provider()?,
            lock_dir: self.lock_dir(),
            lock_name: self.lock_name(),
            try_lock_timeout: self.try_lock_timeout(),
            try_lock_non_blocking: self.try_lock_non_blocking(),
        };
        settings.validate()?;
        Ok(settings)
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        let defaults = LoggingConfig::from_env();
        LoggingConfig::from_config(
            self.config
                .get_string(LOG_DIR_PROPERTY)
                .ok()
                .or_else(|| Some(defaults.log_dir.to_string_lossy().to_string())),
            self.config
                .get_bool(LOG_CONSOLE_PROPERTY)
                .unwrap_or(defaults.console_output),
            self.config
                .get_bool(LOG_FILE_PROPERTY)
                .unwrap_or(defaults.file_logging),
            self.config
                .get_string(LOG_LEVEL_PROPERTY)
                .unwrap_or(defaults.level.to_string()),
        )
    }
}
