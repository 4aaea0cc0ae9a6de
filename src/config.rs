use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::appointments::AgendaOptions;
use crate::i18n::Language;
use crate::notifications::{SchedulerSettings, DEFAULT_CLAIM_TTL};
use crate::phone;
use crate::utils;

/// Current configuration version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub default_language: Language,
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_config_version")]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub reminders: ReminderConfig,
}

/// `[reminders]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Max wait on a locked database, in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,
    #[serde(default = "default_claim_ttl_secs")]
    pub claim_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            default_language: Language::default(),
            default_country_code: default_country_code(),
            user_id: default_user_id(),
            config_version: Some(CURRENT_CONFIG_VERSION),
            reminders: ReminderConfig::default(),
        }
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout_ms(),
            poll_interval_secs: default_poll_interval_secs(),
            max_delivery_attempts: default_max_delivery_attempts(),
            claim_ttl_secs: default_claim_ttl_secs(),
        }
    }
}

// Default value functions
fn default_database_path() -> String {
    // Fallback only, the profile decides the real path at load time
    Config::default_database_path_for_profile(utils::Profile::Prod)
}

fn default_country_code() -> String {
    "+55".to_string()
}

fn default_user_id() -> String {
    "local".to_string()
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_max_delivery_attempts() -> u32 {
    3
}

fn default_claim_ttl_secs() -> u64 {
    300
}

fn default_config_version() -> Option<u32> {
    Some(CURRENT_CONFIG_VERSION)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config directory: {0}")]
    ConfigDirError(String),
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
    #[error("Invalid setting: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from the profile's config dir, creating a default file if missing
    pub fn load_with_profile(profile: utils::Profile) -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path(profile)?;

        if config_path.exists() {
            let mut config = Self::load_from_path(&config_path)?;
            // Keep dev and prod data apart even if the file was copied across
            config.database_path = Self::default_database_path_for_profile(profile);
            Ok(config)
        } else {
            let mut config = Config::default();
            config.database_path = Self::default_database_path_for_profile(profile);
            if let Err(e) = config.save_to_path(&config_path) {
                tracing::error!(path = %config_path.display(), error = %e, "Failed to save config file");
                return Err(e);
            }
            Ok(config)
        }
    }

    /// Load an explicit config file (`--config`). Its `database_path` is honoured as written.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_path(&mut self, path: &Path) -> Result<(), ConfigError> {
        self.config_version = Some(CURRENT_CONFIG_VERSION);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::WriteError(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !phone::is_known_country_code(&self.default_country_code) {
            return Err(ConfigError::InvalidValue(format!(
                "default_country_code '{}' is not a supported dialing prefix",
                self.default_country_code
            )));
        }
        if self.reminders.max_delivery_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "reminders.max_delivery_attempts must be at least 1".to_string(),
            ));
        }
        if self.user_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue("user_id must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn get_config_path(profile: utils::Profile) -> Result<PathBuf, ConfigError> {
        let config_dir = utils::get_config_dir(profile).ok_or_else(|| {
            ConfigError::ConfigDirError("Could not determine config directory".to_string())
        })?;
        Ok(config_dir.join("config.toml"))
    }

    fn default_database_path_for_profile(profile: utils::Profile) -> String {
        if let Some(data_dir) = utils::get_data_dir(profile) {
            data_dir.join("salonbook.db").to_string_lossy().to_string()
        } else {
            match profile {
                utils::Profile::Dev => "~/.local/share/salonbook-dev/salonbook.db".to_string(),
                utils::Profile::Prod => "~/.local/share/salonbook/salonbook.db".to_string(),
            }
        }
    }

    /// Get the expanded database path (with ~ expansion)
    pub fn get_database_path(&self) -> PathBuf {
        utils::expand_path(&self.database_path)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.reminders.store_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.reminders.poll_interval_secs)
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            max_attempts: self.reminders.max_delivery_attempts.max(1),
            claim_ttl: i64::try_from(self.reminders.claim_ttl_secs)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .unwrap_or(DEFAULT_CLAIM_TTL),
        }
    }

    pub fn agenda_options(&self) -> AgendaOptions {
        AgendaOptions {
            user_id: self.user_id.clone(),
            default_language: self.default_language,
            default_country_code: self.default_country_code.clone(),
            scheduler: self.scheduler_settings(),
        }
    }
}
