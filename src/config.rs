//! Client configuration management.
//!
//! Configuration is stored at `~/.config/medibook/config.json` and can be
//! overridden per-process through environment variables (a `.env` file is
//! honored when present):
//!
//! - `MEDIBOOK_API_URL`: backend base URL
//! - `MEDIBOOK_TIMEOUT_SECS`: HTTP request timeout

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for the config directory path
const APP_NAME: &str = "medibook";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Production backend
const DEFAULT_API_URL: &str = "https://api.medibook.health";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load from the well-known path, with environment overrides applied.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Ok(Self::apply_env(Self::load_from(&path)?))
    }

    /// Load from an explicit path. No environment overrides.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn apply_env(mut config: Self) -> Self {
        let _ = dotenvy::dotenv();
        if let Ok(url) = std::env::var("MEDIBOOK_API_URL") {
            if !url.trim().is_empty() {
                config.api_base_url = url;
            }
        }
        if let Some(secs) = std::env::var("MEDIBOOK_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.request_timeout_secs = secs;
        }
        config
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}
