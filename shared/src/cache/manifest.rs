use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use super::request::AssetRequest;
use super::CacheError;
use crate::config::CacheConfig;

pub const DEFAULT_ASSETS: &[&str] = &[
    "./",
    "./index.html",
    "./styles.css",
    "./script.js",
    "./manifest.json",
    "./assets/icons/icon-192.png",
    "./assets/icons/icon-512.png",
    "./assets/logos/toyota.svg",
    "./assets/logos/honda.svg",
    "./assets/logos/ford.svg",
    "./assets/logos/bmw.svg",
    "./assets/logos/mercedes.svg",
    "./assets/logos/audi.svg",
    "./assets/logos/tesla.svg",
    "./assets/logos/chevrolet.svg",
    "./assets/logos/nissan.svg",
    "./assets/logos/hyundai.svg",
    "./assets/logos/kia.svg",
    "./assets/logos/volkswagen.svg",
    "./assets/logos/subaru.svg",
    "./assets/logos/lexus.svg",
    "./assets/logos/jeep.svg",
];

/// Tag naming one generation of cached assets, e.g. `clt-v1`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct CacheVersion(String);

impl CacheVersion {
    pub fn new(tag: impl Into<String>) -> Result<Self, CacheError> {
        let tag = tag.into();
        if tag.trim().is_empty() || tag.trim() != tag || tag.chars().any(char::is_control) {
            return Err(CacheError::InvalidVersion(tag));
        }
        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Asset list resolved to absolute URLs. Order is kept, duplicates dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheManifest {
    scope: Url,
    entries: Vec<Url>,
}

impl CacheManifest {
    pub fn resolve(scope: &str, assets: &[String]) -> Result<Self, CacheError> {
        let scope = Url::parse(scope).map_err(|e| CacheError::InvalidAsset {
            entry: scope.to_string(),
            reason: e.to_string(),
        })?;

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(assets.len());
        for asset in assets {
            let mut url = scope.join(asset).map_err(|e| CacheError::InvalidAsset {
                entry: asset.clone(),
                reason: e.to_string(),
            })?;
            url.set_fragment(None);
            if seen.insert(url.clone()) {
                entries.push(url);
            }
        }

        Ok(Self { scope, entries })
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        Self::resolve(&config.scope, &config.assets)
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn entries(&self) -> &[Url] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn requests(&self) -> impl Iterator<Item = AssetRequest> + '_ {
        self.entries.iter().cloned().map(AssetRequest::from_url)
    }
}
