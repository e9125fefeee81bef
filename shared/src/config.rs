use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::brand::DEFAULT_BRANDS;
use crate::cache::manifest::DEFAULT_ASSETS;
use crate::capabilities::MAX_VALUE_SIZE;

pub const DEFAULT_STATE_KEY: &str = "clt_data";
pub const DEFAULT_THEME_KEY: &str = "clt_theme";
pub const DEFAULT_CACHE_VERSION: &str = "clt-v1";
pub const DEFAULT_SCOPE: &str = "https://localhost/";
pub const DEFAULT_TOP_N: usize = 3;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
pub const MIN_TICK_INTERVAL_MS: u64 = 100;
pub const MIN_STATE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Settings for the trip counter core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub default_brands: Vec<String>,
    pub top_n: usize,
    pub confirmation_tone: bool,
    pub state_key: String,
    pub theme_key: String,
    pub tick_interval_ms: u64,
    /// Upper bound for the encoded trip blob.
    pub max_state_bytes: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            default_brands: DEFAULT_BRANDS.iter().map(|b| (*b).to_string()).collect(),
            top_n: DEFAULT_TOP_N,
            confirmation_tone: true,
            state_key: DEFAULT_STATE_KEY.to_string(),
            theme_key: DEFAULT_THEME_KEY.to_string(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            max_state_bytes: MAX_VALUE_SIZE,
        }
    }
}

impl TrackerConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_n == 0 {
            return Err(ConfigError::Validation("top_n must be > 0".into()));
        }
        if self.state_key.trim().is_empty() || self.theme_key.trim().is_empty() {
            return Err(ConfigError::Validation("storage keys cannot be empty".into()));
        }
        if self.state_key == self.theme_key {
            return Err(ConfigError::Validation(
                "state_key and theme_key must differ".into(),
            ));
        }
        if self.tick_interval_ms < MIN_TICK_INTERVAL_MS {
            return Err(ConfigError::Validation(format!(
                "tick_interval_ms should be at least {MIN_TICK_INTERVAL_MS}ms"
            )));
        }
        if !(MIN_STATE_BYTES..=MAX_VALUE_SIZE).contains(&self.max_state_bytes) {
            return Err(ConfigError::Validation(format!(
                "max_state_bytes must be between {MIN_STATE_BYTES} and {MAX_VALUE_SIZE}"
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for brand in &self.default_brands {
            let trimmed = brand.trim();
            if trimmed.is_empty() || trimmed != brand {
                return Err(ConfigError::Validation(format!(
                    "default brand '{brand}' must be non-empty and trimmed"
                )));
            }
            if !seen.insert(trimmed.to_lowercase()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate default brand '{brand}'"
                )));
            }
        }
        Ok(())
    }
}

/// Settings for the offline asset cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub version: String,
    pub scope: String,
    pub assets: Vec<String>,
    pub skip_waiting: bool,
    pub max_asset_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_CACHE_VERSION.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            assets: DEFAULT_ASSETS.iter().map(|a| (*a).to_string()).collect(),
            skip_waiting: true,
            max_asset_bytes: 20 * 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::Validation("version tag cannot be empty".into()));
        }
        let scope = Url::parse(&self.scope)
            .map_err(|e| ConfigError::Validation(format!("invalid scope '{}': {e}", self.scope)))?;
        if scope.cannot_be_a_base() {
            return Err(ConfigError::Validation(format!(
                "scope '{}' cannot be used as a base URL",
                self.scope
            )));
        }
        if self.assets.is_empty() {
            return Err(ConfigError::Validation("manifest cannot be empty".into()));
        }
        if self.max_asset_bytes == 0 {
            return Err(ConfigError::Validation("max_asset_bytes must be > 0".into()));
        }
        Ok(())
    }
}
