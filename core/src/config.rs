//! Intake configuration loading
//!
//! Loads configuration from `~/.config/intake/intake.toml` (or `INTAKE_CONFIG` env).

use crate::catalog::OptionCatalog;
use crate::errors::{IntakeError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize, Clone)]
pub struct IntakeConfig {
    /// Path to the SQLite record store
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Default tracing filter when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Optional TOML file replacing built-in option domains
    #[serde(default)]
    pub catalog_path: Option<String>,

    /// Record store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Analytics settings
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

fn default_db_path() -> String {
    dirs::home_dir()
        .map(|h| {
            h.join(".config")
                .join("intake")
                .join("intake.db")
                .to_string_lossy()
                .into_owned()
        })
        .unwrap_or_else(|| "intake.db".to_string())
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// Record store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Pooled connections (readers run concurrently, writers serialize)
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// How long a writer waits for a conflicting transaction
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_pool_size() -> u32 {
    8
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// How records of one identity contribute to histograms
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CountMode {
    /// Only the most recently created record of each identity counts
    #[default]
    PerIdentity,
    /// Every identity-bearing record counts
    PerRecord,
}

/// Analytics configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub count_mode: CountMode,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_filter: default_log_filter(),
            catalog_path: None,
            store: StoreConfig::default(),
            analytics: AnalyticsConfig::default(),
        }
    }
}

impl IntakeConfig {
    /// Environment variable for config path override
    pub const ENV_CONFIG_PATH: &'static str = "INTAKE_CONFIG";

    /// Default config filename
    pub const DEFAULT_CONFIG_FILENAME: &'static str = "intake.toml";

    /// Load configuration.
    ///
    /// Resolution order:
    /// 1. `INTAKE_CONFIG` environment variable
    /// 2. `~/.config/intake/intake.toml`
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let path = Self::resolve_config_path();

        if !path.exists() {
            tracing::info!(path = %path.display(), "Intake config not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            IntakeError::config_with_source(
                format!("failed to read config at {}", path.display()),
                e,
            )
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let cfg: IntakeConfig = toml::from_str(contents)
            .map_err(|e| IntakeError::config_with_source("failed to parse config", e))?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .map(|h| {
                h.join(".config")
                    .join("intake")
                    .join(Self::DEFAULT_CONFIG_FILENAME)
            })
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILENAME))
    }

    fn validate(&self) -> Result<()> {
        if self.store.pool_size == 0 {
            return Err(IntakeError::config("store.pool_size must be at least 1"));
        }

        if self.store.busy_timeout_ms == 0 {
            tracing::warn!("store.busy_timeout_ms is 0; concurrent writers will fail fast");
        }

        Ok(())
    }

    /// Get the resolved database path (expanding ~ if needed)
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }

    /// Build the option catalog: the configured file, or the built-in one
    pub fn load_catalog(&self) -> Result<OptionCatalog> {
        match &self.catalog_path {
            Some(path) => {
                let path = expand_home(path);
                tracing::info!(path = %path.display(), "Loading option catalog");
                OptionCatalog::load_from_path(&path)
            }
            None => Ok(OptionCatalog::builtin()),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(path)
}
