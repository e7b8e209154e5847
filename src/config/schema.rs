//! Configuration schema for gitvault
//!
//! Configuration is stored at `~/.config/gitvault/config.toml`

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Well-known data paths mirrored by the vault
pub const DATABASE_PATH: &str = "data/database.json";
pub const SESSIONS_PATH: &str = "data/sessions.json";
pub const MEMORY_PATH: &str = "data/memory.json";
pub const USERS_PATH: &str = "data/users.json";

const MIB: u64 = 1024 * 1024;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Remote repository settings
    pub remote: RemoteConfig,

    /// Request retry settings
    pub client: ClientConfig,

    /// Write-back cache settings
    pub cache: CacheConfig,

    /// Large object settings
    pub large: LargeConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Which remote store backs the vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// GitHub contents API
    Github,
    /// Process-local store, nothing survives exit
    Memory,
}

/// Remote repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Remote store backend
    pub backend: Backend,

    /// API base URL (for GitHub Enterprise)
    pub api_url: String,

    /// Repository owner
    pub owner: Option<String>,

    /// Repository name
    pub repo: Option<String>,

    /// Branch holding the data
    pub branch: String,

    /// Environment variable holding the access token
    pub token_env: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Github,
            api_url: "https://api.github.com".to_string(),
            owner: None,
            repo: None,
            branch: "main".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
        }
    }
}

/// Request retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Attempts per request before giving up
    pub max_attempts: u32,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Pause before refreshing a stale fingerprint
    pub conflict_pause_ms: u64,

    /// Pause after a timeout or network failure
    pub transient_pause_ms: u64,

    /// Wait used when a rate-limited reply carries no reset time
    pub rate_limit_fallback_secs: u64,

    /// Longest single rate-limit wait
    pub rate_limit_cap_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            request_timeout_secs: 30,
            conflict_pause_ms: 1000,
            transient_pause_ms: 2000,
            rate_limit_fallback_secs: 60,
            rate_limit_cap_secs: 60,
        }
    }
}

/// Write-back cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Background flush period in seconds
    pub flush_interval_secs: u64,

    /// Paths loaded (and created if absent) at startup
    pub preload: Vec<String>,
}

impl CacheConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: 30,
            preload: vec![
                DATABASE_PATH.to_string(),
                SESSIONS_PATH.to_string(),
                MEMORY_PATH.to_string(),
                USERS_PATH.to_string(),
            ],
        }
    }
}

/// Large object configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LargeConfig {
    /// Directory holding large objects and their chunks
    pub prefix: String,

    /// Payloads at or above this size are chunked
    pub single_object_max_bytes: u64,

    /// Size of each chunk (the last one may be shorter)
    pub chunk_size_bytes: u64,
}

impl Default for LargeConfig {
    fn default() -> Self {
        Self {
            prefix: "data/large".to_string(),
            single_object_max_bytes: 50 * MIB,
            chunk_size_bytes: 40 * MIB,
        }
    }
}
