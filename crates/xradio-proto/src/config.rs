use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub hotkeys: HotkeysConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Channel catalog cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Age after which the cached catalog is regenerated from the station.
    #[serde(default = "default_cache_expiry_secs")]
    pub expiry_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Initial mpv volume, 0.0 - 1.0.
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// Extra arguments passed to mpv on spawn.
    #[serde(default = "default_mpv_args")]
    pub mpv_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// How long before the end of a chunk window the token gets refreshed.
    #[serde(default = "default_token_margin_secs")]
    pub token_margin_secs: u64,
}

/// Local HTTP bridge through which an external hotkey grabber delivers keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotkeysConfig {
    #[serde(default = "default_http_enabled")]
    pub http_enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the download tree: `<downloads_dir>/<station>/<channel>/`.
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expiry_secs: default_cache_expiry_secs(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            mpv_args: default_mpv_args(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            token_margin_secs: default_token_margin_secs(),
        }
    }
}

impl Default for HotkeysConfig {
    fn default() -> Self {
        Self {
            http_enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            downloads_dir: default_downloads_dir(),
        }
    }
}

fn default_cache_expiry_secs() -> u64 {
    7 * 24 * 3600
}

fn default_volume() -> f32 {
    0.8
}

fn default_mpv_args() -> Vec<String> {
    vec!["--no-video".to_string(), "--quiet".to_string()]
}

fn default_token_margin_secs() -> u64 {
    5
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_downloads_dir() -> PathBuf {
    platform::default_downloads_dir()
}

impl CacheConfig {
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_secs)
    }
}

impl RetrievalConfig {
    pub fn token_margin(&self) -> Duration {
        Duration::from_secs(self.token_margin_secs)
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
