//! Bootstrap configuration loading
//!
//! Configuration is split in two tiers:
//! 1. **TOML bootstrap**: store path, legacy source URL, logging
//! 2. **Database runtime**: everything else, from the `settings` table
//!
//! # Priority
//!
//! 1. Command-line arguments
//! 2. Environment variables (`PLAN_CONFIG`, `PLAN_DATABASE`, `PLAN_LEGACY_DATABASE_URL`)
//! 3. TOML configuration file
//! 4. OS-dependent compiled default
//!
//! A missing TOML file is not an error: a warning is logged and defaults apply.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "PLAN_CONFIG";
/// Environment variable naming the schedule store file
pub const DATABASE_ENV_VAR: &str = "PLAN_DATABASE";
/// Environment variable holding the legacy source connection URL
pub const LEGACY_URL_ENV_VAR: &str = "PLAN_LEGACY_DATABASE_URL";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Path to the SQLite schedule store
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// sqlx URL of the legacy timetable database (e.g. `mysql://user:pw@host/db`)
    #[serde(default)]
    pub legacy_database_url: Option<String>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path; stderr is always written, the file is added when set
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Read and parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file {:?}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML {:?}: {}", path, e)))
    }

    /// Load the config file if one resolves, falling back to defaults
    ///
    /// Parse errors are still reported: a broken file is a misconfiguration,
    /// an absent file is not. Nothing is logged here since this runs before
    /// tracing is set up; callers log the returned [`ConfigOrigin`] once it is.
    pub fn load_or_default(path: Option<&Path>) -> Result<(Self, ConfigOrigin)> {
        match path {
            Some(path) if path.exists() => {
                let config = Self::load(path)?;
                Ok((config, ConfigOrigin::File(path.to_path_buf())))
            }
            Some(path) => Ok((Self::default(), ConfigOrigin::Missing(path.to_path_buf()))),
            None => Ok((Self::default(), ConfigOrigin::Defaults)),
        }
    }
}

/// Where the bootstrap configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// Parsed from this file
    File(PathBuf),
    /// A path resolved but no file exists there
    Missing(PathBuf),
    /// No config path resolved
    Defaults,
}

impl ConfigOrigin {
    /// Report the origin through tracing
    pub fn log(&self) {
        match self {
            ConfigOrigin::File(path) => info!("Loaded configuration from {}", path.display()),
            ConfigOrigin::Missing(path) => {
                warn!("Config file {} not found, using defaults", path.display())
            }
            ConfigOrigin::Defaults => info!("No config file found, using defaults"),
        }
    }
}

/// Resolve the config file location
///
/// CLI argument, then `PLAN_CONFIG`, then the first existing platform file
/// (`~/.config/plan/scrape.toml`, `/etc/plan/scrape.toml` on Linux).
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    let user_config = dirs::config_dir().map(|d| d.join("plan").join("scrape.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/plan/scrape.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Resolve the schedule store path
pub fn resolve_database_path(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
        return PathBuf::from(path);
    }

    if let Some(path) = &toml_config.database_path {
        return path.clone();
    }

    default_database_path()
}

/// Resolve the legacy source URL
///
/// There is no compiled default: the legacy source is always site-specific.
pub fn resolve_legacy_url(cli_arg: Option<&str>, toml_config: &TomlConfig) -> Result<String> {
    if let Some(url) = cli_arg {
        return Ok(url.to_string());
    }

    if let Ok(url) = std::env::var(LEGACY_URL_ENV_VAR) {
        return Ok(url);
    }

    toml_config.legacy_database_url.clone().ok_or_else(|| {
        Error::Config(format!(
            "Legacy database URL not configured. Use --legacy-url, {} or legacy_database_url in the TOML config",
            LEGACY_URL_ENV_VAR
        ))
    })
}

/// OS-dependent default store location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("plan").join("plan.db"))
        .unwrap_or_else(|| PathBuf::from("./plan_data/plan.db"))
}
