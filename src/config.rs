//! Configuration file handling for reel-composer.
//!
//! Loads configuration from `~/.config/reel-composer/config.toml` or a custom
//! path. Every setting is optional; missing files fall back to defaults, but
//! an explicitly named file that cannot be read or parsed is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::gemini::{DEFAULT_SCRIPT_MODEL, DEFAULT_VIDEO_MODEL, GEMINI_API_BASE_URL};

/// Configuration file structure for reel-composer.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub script_model: Option<String>,
    pub video_model: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub initial_delay_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct GenerationConfig {
    pub poll_interval_secs: Option<u64>,
    /// "16:9" or "9:16".
    pub aspect_ratio: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct StorageConfig {
    /// Root directory for wallet/history records. Defaults to the platform
    /// data directory.
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default path, falling back to defaults
    /// when no file exists.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_path(&default_path(), false)
    }

    /// Load configuration from an explicitly named file, which must exist.
    pub fn load_from_explicit(path: &Path) -> Result<Self, ConfigError> {
        Self::load_path(path, true)
    }

    fn load_path(path: &Path, required: bool) -> Result<Self, ConfigError> {
        if !path.exists() {
            if required {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "config file not found",
                    ),
                });
            }
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn base_url(&self) -> String {
        self.api
            .base_url
            .clone()
            .unwrap_or_else(|| GEMINI_API_BASE_URL.to_string())
    }

    pub fn script_model(&self) -> String {
        self.api
            .script_model
            .clone()
            .unwrap_or_else(|| DEFAULT_SCRIPT_MODEL.to_string())
    }

    pub fn video_model(&self) -> String {
        self.api
            .video_model
            .clone()
            .unwrap_or_else(|| DEFAULT_VIDEO_MODEL.to_string())
    }

    pub fn retry_policy(&self) -> crate::gemini::RetryPolicy {
        let defaults = crate::gemini::RetryPolicy::default();
        crate::gemini::RetryPolicy {
            max_attempts: self.retry.max_attempts.unwrap_or(defaults.max_attempts),
            initial_delay: self
                .retry
                .initial_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.initial_delay),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.generation
            .poll_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(crate::gemini::DEFAULT_POLL_INTERVAL)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config")
        })
        .join("reel-composer")
        .join("config.toml")
}
