//! Configuration management for homee-sday.
//!
//! Settings are read from `~/.config/homee-sday/config.toml`. The file is
//! created from a bundled default the first time any command runs, and
//! command-line flags are merged over it into [`Preferences`].

use crate::error::AppError;
use crate::trigger::SleepModel;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bundled default written on first run.
const DEFAULT_CONFIG: &str = include_str!("default_config.toml");

/// Used when neither `-t` nor `timeout_secs` is given.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Largest accepted timeout, the biggest integer a JSON number holds exactly.
pub const MAX_TIMEOUT_SECS: u64 = (1 << 53) - 1;

/// Contents of the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Host name or IP address of the hub.
    #[serde(default = "default_hub_host")]
    pub hub_host: String,
    /// Watchdog timeout, overridden by `-t`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Homeegram whose time trigger marks the s.-day phase start.
    #[serde(default)]
    pub s_day_phase_homeegram_id: Option<i64>,
    #[serde(default)]
    pub average_sleep_hours_per_s_day: Option<f64>,
    #[serde(default)]
    pub wake_time_to_s_day_phase_hours: Option<f64>,
    #[serde(default)]
    pub average_sleep_deviation_weight: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hub_host: default_hub_host(),
            timeout_secs: None,
            s_day_phase_homeegram_id: None,
            average_sleep_hours_per_s_day: None,
            wake_time_to_s_day_phase_hours: None,
            average_sleep_deviation_weight: None,
        }
    }
}

fn default_hub_host() -> String {
    "homee".to_string()
}

impl Config {
    /// Get the config directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join(env!("CARGO_PKG_NAME")))
            .context("Could not determine config directory")
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load the config file, creating it from the bundled default first if needed.
    pub fn load_or_init() -> Result<Self> {
        Self::load_or_init_at(&Self::config_path()?)
    }

    pub fn load_or_init_at(path: &Path) -> Result<Self> {
        Self::init_at(path)?;
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Write the bundled default unless a file already exists at `path`.
    fn init_at(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                file.write_all(DEFAULT_CONFIG.as_bytes())
                    .with_context(|| format!("Failed to write config file: {}", path.display()))?;
                tracing::info!("Created default config at {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to create config file: {}", path.display()))),
        }
    }
}

/// Values given on the command line, before merging.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Command-line flags merged over the config file. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct Preferences {
    pub hub_host: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
    pub config: Config,
}

impl Preferences {
    pub fn merge(cli: CliOverrides, config: Config) -> Result<Self, AppError> {
        let (Some(username), Some(password)) = (cli.username, cli.password) else {
            return Err(AppError::Usage("-u or -p missing.".to_string()));
        };

        let timeout_secs = cli
            .timeout_secs
            .or(config.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs > MAX_TIMEOUT_SECS {
            return Err(AppError::Usage("Incorrect timeout.".to_string()));
        }

        Ok(Self {
            hub_host: config.hub_host.clone(),
            username,
            password,
            timeout: Duration::from_secs(timeout_secs),
            config,
        })
    }
}

/// Validated settings for `update-s-day-phase-start`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseSettings {
    pub homeegram_id: i64,
    pub model: SleepModel,
}

impl PhaseSettings {
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let invalid = || {
            AppError::Config(
                "One or more required entries in config file missing or having incorrect values."
                    .to_string(),
            )
        };

        let homeegram_id = config.s_day_phase_homeegram_id.ok_or_else(invalid)?;
        let model = SleepModel::new(
            config.average_sleep_hours_per_s_day.ok_or_else(invalid)?,
            config.wake_time_to_s_day_phase_hours.ok_or_else(invalid)?,
            config.average_sleep_deviation_weight.ok_or_else(invalid)?,
        )
        .map_err(|_| invalid())?;

        Ok(Self { homeegram_id, model })
    }
}
