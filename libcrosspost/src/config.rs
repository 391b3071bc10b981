//! Configuration management for Crosspost

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub instagram: InstagramConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub posting: PostingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/crosspost/crosspost.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Directory holding persisted MTProto session files
    pub session_dir: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            session_dir: "~/.local/share/crosspost/sessions".to_string(),
        }
    }
}

impl TelegramConfig {
    pub fn expand_session_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.session_dir).to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramConfig {
    /// Base URL of the Graph API, including the version segment
    pub graph_api_url: String,
    /// Multipart image upload endpoint
    pub image_host_url: String,
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            graph_api_url: "https://graph.facebook.com/v21.0".to_string(),
            image_host_url: "https://api.imgbb.com/1/upload".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("crosspost/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingConfig {
    /// Upper bound for a single provider's create-post call
    pub provider_timeout_secs: u64,
}

impl Default for PostingConfig {
    fn default() -> Self {
        // Telegram logins may wait on a human typing a verification code
        Self {
            provider_timeout_secs: 300,
        }
    }
}

impl PostingConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default_config());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self::default()
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSPOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosspost").join("config.toml"))
}

/// Resolve the database path, expanding `~`
///
/// Falls back to the XDG data directory when no path is configured.
pub fn resolve_db_path(configured: Option<&str>) -> Result<PathBuf> {
    match configured {
        Some(path) if !path.trim().is_empty() => {
            Ok(PathBuf::from(shellexpand::tilde(path).to_string()))
        }
        _ => {
            let data_dir = dirs::data_dir()
                .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;
            Ok(data_dir.join("crosspost").join("crosspost.db"))
        }
    }
}
