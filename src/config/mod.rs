//! Configuration management for gitvault

pub mod schema;

pub use schema::{Backend, Config};

use crate::error::{VaultError, VaultResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Environment variables that override the `[remote]` section
pub const OWNER_ENV: &str = "GITHUB_REPO_OWNER";
pub const REPO_ENV: &str = "GITHUB_REPO_NAME";
pub const BRANCH_ENV: &str = "GITHUB_BRANCH";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gitvault")
            .join("config.toml")
    }

    /// Load configuration, falling back to defaults if the file is missing.
    ///
    /// Repository coordinates from the environment win over the file.
    pub async fn load(&self) -> VaultResult<Config> {
        let mut config = if self.config_path.exists() {
            self.load_from_file(&self.config_path).await?
        } else {
            debug!("Config file not found, using defaults");
            Config::default()
        };

        apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> VaultResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| VaultError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| VaultError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> VaultResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            VaultError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> VaultResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| VaultError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Some(owner) = non_empty_env(OWNER_ENV) {
        config.remote.owner = Some(owner);
    }
    if let Some(repo) = non_empty_env(REPO_ENV) {
        config.remote.repo = Some(repo);
    }
    if let Some(branch) = non_empty_env(BRANCH_ENV) {
        config.remote.branch = branch;
    }
}

/// Read an environment variable, treating empty values as unset
pub fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
