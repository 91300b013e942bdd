//! Configuration loader for sessiontier.
//!
//! Reads `config.toml` from the data directory (`~/.sessiontier/` by default)
//! and deserializes it into [`AppConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sessiontier_types::config::SessionConfig;

use crate::sqlite::pool::database_url_for;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "SESSIONTIER_DATA_DIR";

/// Which cache tier implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

/// `[cache]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub backend: CacheBackend,

    /// Only read when `backend = "redis"`.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            redis_url: default_redis_url(),
        }
    }
}

/// `[database]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite URL. Defaults to `{data_dir}/sessiontier.db`.
    #[serde(default)]
    pub url: Option<String>,
}

/// Storage backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfraConfig {
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
}

impl InfraConfig {
    pub fn database_url(&self, data_dir: &Path) -> String {
        self.database
            .url
            .clone()
            .unwrap_or_else(|| database_url_for(data_dir))
    }
}

/// Full contents of `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(flatten)]
    pub infra: InfraConfig,
}

/// Resolve the data directory.
///
/// Priority:
/// 1. `SESSIONTIER_DATA_DIR` environment variable
/// 2. `~/.sessiontier` under the platform home directory
/// 3. `.sessiontier` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    data_dir_from(std::env::var(DATA_DIR_ENV).ok(), dirs::home_dir())
}

fn data_dir_from(env_dir: Option<String>, home: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = env_dir.filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    match home {
        Some(home) => home.join(".sessiontier"),
        None => PathBuf::from(".sessiontier"),
    }
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`AppConfig::default()`].
/// - If the file exists but fails to read or parse, logs a warning and returns the default.
pub async fn load_config(data_dir: &Path) -> AppConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return AppConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return AppConfig::default();
        }
    };

    match toml::from_str::<AppConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            AppConfig::default()
        }
    }
}
