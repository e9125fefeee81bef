use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::brand::{BrandName, CustomBrand};
use crate::config::{ConfigError, TrackerConfig};
use crate::report::Report;
use crate::trip::TripStore;

/// Persisted trip blob. `counts` values are unsigned, so a count can never be negative.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TripState {
    #[serde(default)]
    pub active: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub counts: BTreeMap<BrandName, u32>,
    #[serde(rename = "custom", default)]
    pub custom_brands: Vec<CustomBrand>,
}

impl TripState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            active: false,
            start_time: now,
            counts: BTreeMap::new(),
            custom_brands: Vec::new(),
        }
    }

    pub fn count(&self, brand: &str) -> u32 {
        self.counts.get(brand).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().map(|c| u64::from(*c)).sum()
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "dark" => Ok(Self::Dark),
            "light" => Ok(Self::Light),
            other => Err(format!("unknown theme '{other}'")),
        }
    }
}

/// Everything the core owns. The shell never reaches into it directly.
#[derive(Debug)]
pub struct Model {
    pub config: TrackerConfig,
    pub store: TripStore,
    pub theme: Theme,
    /// Clock as of the last stamped event; `view` reads it so it stays pure.
    pub now: DateTime<Utc>,
    /// Report from the last `EndTrip`, shown until dismissed.
    pub report: Option<Report>,
    pub state_loaded: bool,
}

impl Model {
    pub fn new(config: TrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: TrackerConfig) -> Self {
        let now = DateTime::<Utc>::default();
        Self {
            store: TripStore::new(&config, now),
            config,
            theme: Theme::default(),
            now,
            report: None,
            state_loaded: false,
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::with_config(TrackerConfig::default())
    }
}
