//! Configuration management for calagent.
//!
//! Loads configuration from ${CALAGENT_HOME}/config.toml with sensible defaults.
//! `CALAGENT_API_BASE_URL` and `CALAGENT_LOG` override the file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Env var overriding `api_base_url`.
pub const API_BASE_URL_ENV: &str = "CALAGENT_API_BASE_URL";
/// Env var overriding `logging.filter`.
pub const LOG_FILTER_ENV: &str = "CALAGENT_LOG";

/// Returns the default config template with comments.
///
/// Embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for calagent configuration and data directories.
    //!
    //! CALAGENT_HOME resolution order:
    //! 1. CALAGENT_HOME environment variable (if set)
    //! 2. ~/.config/calagent (default)
    //! 3. ./.calagent when no home directory can be determined

    use std::path::PathBuf;

    /// Returns the calagent home directory.
    pub fn calagent_home() -> PathBuf {
        if let Ok(home) = std::env::var("CALAGENT_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".calagent"),
            |h| h.join(".config").join("calagent"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        calagent_home().join("config.toml")
    }

    /// Returns the path to the durable key/value store.
    pub fn storage_path() -> PathBuf {
        calagent_home().join("storage.json")
    }

    /// Returns the directory for rolling log files.
    pub fn logs_dir() -> PathBuf {
        calagent_home().join("logs")
    }
}

/// Session lifecycle tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Seconds between proactive token expiry checks.
    pub expiry_check_interval_secs: u64,
    /// Clear the session when the profile endpoint fails with a non-401 error.
    pub logout_on_profile_error: bool,
    /// Per-request timeout in seconds; 0 disables the timeout.
    pub request_timeout_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            expiry_check_interval_secs: 60,
            logout_on_profile_error: true,
            request_timeout_secs: 30,
        }
    }
}

impl SessionSettings {
    pub fn expiry_check_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_check_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// Local listener that receives the OAuth redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackSettings {
    pub port: u16,
    pub path: String,
    pub timeout_secs: u64,
}

impl Default for CallbackSettings {
    fn default() -> Self {
        Self {
            port: 5173,
            path: "/".to_string(),
            timeout_secs: 120,
        }
    }
}

impl CallbackSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// tracing `EnvFilter` directive
    pub filter: String,
    /// Also write to a daily-rolling file under `<home>/logs`
    pub file: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "calagent=info,calagent_core=info".to_string(),
            file: false,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend base URL (no trailing slash required)
    pub api_base_url: String,
    /// OAuth provider segment for `GET /auth/<provider>`
    pub provider: String,
    pub session: SessionSettings,
    pub callback: CallbackSettings,
    pub logging: LoggingSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: Self::DEFAULT_API_BASE_URL.to_string(),
            provider: Self::DEFAULT_PROVIDER.to_string(),
            session: SessionSettings::default(),
            callback: CallbackSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Config {
    const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
    const DEFAULT_PROVIDER: &str = "google";

    /// Loads configuration from the default config path, then applies env overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&paths::config_path())?;
        config.apply_env_with(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Applies overrides from a variable lookup (the process env in production).
    pub fn apply_env_with(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(url) = get(API_BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(filter) = get(LOG_FILTER_ENV).filter(|v| !v.trim().is_empty()) {
            self.logging.filter = filter.trim().to_string();
        }
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}
