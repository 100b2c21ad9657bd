use anyhow::{Context, Result};
use dirs::home_dir;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::auth::{AuthTokens, TokenRefreshCallback};

fn default_scan_interval_secs() -> u64 {
    300
}

/// Configuration data stored in ~/.airthings.yml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Config {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn tokens(&self) -> AuthTokens {
        AuthTokens {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self.expires_at,
        }
    }

    pub fn set_tokens(&mut self, tokens: &AuthTokens) {
        self.access_token = tokens.access_token.clone();
        self.refresh_token = tokens.refresh_token.clone();
        self.expires_at = tokens.expires_at;
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(anyhow::anyhow!("client_id must not be empty"));
        }
        if self.client_secret.trim().is_empty() {
            return Err(anyhow::anyhow!("client_secret must not be empty"));
        }
        if self.refresh_token.trim().is_empty() {
            return Err(anyhow::anyhow!("refresh_token must not be empty"));
        }
        if self.scan_interval_secs == 0 {
            return Err(anyhow::anyhow!("scan_interval_secs must be greater than zero"));
        }
        Ok(())
    }
}

/// Get the path to the configuration file (~/.airthings.yml)
pub fn get_config_path() -> Result<PathBuf> {
    let home = home_dir().context("Failed to determine home directory")?;
    Ok(home.join(".airthings.yml"))
}

/// Load configuration from ~/.airthings.yml
pub fn load_config() -> Result<Config> {
    load_config_from(&get_config_path()?)
}

pub fn load_config_from(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        return Err(anyhow::anyhow!(
            "Not logged in. Please run 'airthings login' first."
        ));
    }

    let content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

    let config: Config = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

    debug!("Loaded configuration for client: {}", config.client_id);
    Ok(config)
}

/// Save configuration to ~/.airthings.yml
pub fn save_config(config: &Config) -> Result<()> {
    save_config_to(&get_config_path()?, config)
}

pub fn save_config_to(config_path: &Path, config: &Config) -> Result<()> {
    let content = serde_yaml::to_string(config).context("Failed to serialize configuration")?;

    fs::write(config_path, content)
        .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

    debug!("Saved configuration for client: {}", config.client_id);
    Ok(())
}

/// Clear the configuration file (logout)
pub fn clear_config() -> Result<()> {
    clear_config_at(&get_config_path()?)
}

pub fn clear_config_at(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        fs::remove_file(config_path)
            .with_context(|| format!("Failed to remove config file: {}", config_path.display()))?;
        debug!("Configuration file cleared");
    } else {
        warn!("Configuration file does not exist, nothing to clear");
    }

    Ok(())
}

/// Writes refreshed tokens back to the config file
pub struct ConfigTokenStore {
    path: PathBuf,
    config: Mutex<Config>,
}

impl ConfigTokenStore {
    pub fn new(path: PathBuf, config: Config) -> Self {
        Self {
            path,
            config: Mutex::new(config),
        }
    }

    pub fn config(&self) -> Config {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TokenRefreshCallback for ConfigTokenStore {
    fn on_tokens_refreshed(&self, tokens: &AuthTokens) {
        let mut config = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        config.set_tokens(tokens);

        if let Err(e) = save_config_to(&self.path, &config) {
            warn!("Failed to persist refreshed tokens: {:#}", e);
        }
    }
}
