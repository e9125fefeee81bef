use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};

use super::fetch::Fetcher;
use super::interceptor::{CacheFirst, InterceptorChain, NetworkPassThrough};
use super::manifest::{CacheManifest, CacheVersion};
use super::request::{AssetRequest, AssetResponse, FetchError};
use super::storage::{CacheStorage, StoredAsset};
use super::CacheError;
use crate::config::CacheConfig;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed and no earlier version is active.
    Redundant,
}

/// Installs one cache version, activates it, and answers requests cache-first.
pub struct OfflineCacheManager {
    config: CacheConfig,
    version: CacheVersion,
    manifest: CacheManifest,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    state: RwLock<LifecycleState>,
    active: Arc<RwLock<Option<CacheVersion>>>,
    chain: InterceptorChain,
    install_lock: Mutex<()>,
}

impl OfflineCacheManager {
    pub fn new(
        config: CacheConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, CacheError> {
        config.validate()?;
        let version = CacheVersion::new(config.version.clone())?;
        let manifest = CacheManifest::from_config(&config)?;
        let active = Arc::new(RwLock::new(None));

        let mut chain = InterceptorChain::new();
        chain.push(Arc::new(CacheFirst::new(storage.clone(), active.clone())));
        chain.push(Arc::new(NetworkPassThrough::new(fetcher.clone())));

        Ok(Self {
            config,
            version,
            manifest,
            storage,
            fetcher,
            state: RwLock::new(LifecycleState::Parsed),
            active,
            chain,
            install_lock: Mutex::new(()),
        })
    }

    pub fn version(&self) -> &CacheVersion {
        &self.version
    }

    pub fn manifest(&self) -> &CacheManifest {
        &self.manifest
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    pub async fn active_version(&self) -> Option<CacheVersion> {
        self.active.read().await.clone()
    }

    /// Keeps serving a version activated earlier (e.g. by a previous run)
    /// until this manager's own version is activated.
    pub async fn resume(&self, version: &CacheVersion) -> Result<bool, CacheError> {
        if !self.storage.has_version(version).await? {
            return Ok(false);
        }
        let mut active = self.active.write().await;
        if active.is_none() {
            info!(%version, "resuming previously active cache");
            *active = Some(version.clone());
        }
        Ok(true)
    }

    /// Fetches every manifest asset and stores them under this version.
    /// Any failure aborts without touching storage.
    #[instrument(skip(self), fields(version = %self.version, assets = self.manifest.len()))]
    pub async fn install(&self) -> Result<usize, CacheError> {
        let _guard = self.install_lock.lock().await;
        let previous = self.state().await;
        self.set_state(LifecycleState::Installing).await;

        match self.fetch_all().await {
            Ok(assets) => {
                let count = assets.len();
                if let Err(e) = self.storage.put_all(&self.version, assets).await {
                    self.install_failed(previous, &e).await;
                    return Err(e);
                }
                self.set_state(LifecycleState::Installed).await;
                info!(count, "cache installed");
                Ok(count)
            }
            Err(e) => {
                self.install_failed(previous, &e).await;
                Err(e)
            }
        }
    }

    /// Drops every other stored version, then starts serving this one.
    #[instrument(skip(self), fields(version = %self.version))]
    pub async fn activate(&self) -> Result<Vec<CacheVersion>, CacheError> {
        let _guard = self.install_lock.lock().await;
        match self.state().await {
            LifecycleState::Installed | LifecycleState::Activated => {}
            other => return Err(CacheError::NotInstalled(other)),
        }
        self.set_state(LifecycleState::Activating).await;

        let mut deleted = Vec::new();
        for version in self.storage.versions().await? {
            if version != self.version && self.storage.delete_version(&version).await? {
                deleted.push(version);
            }
        }

        *self.active.write().await = Some(self.version.clone());
        self.set_state(LifecycleState::Activated).await;
        info!(deleted = deleted.len(), "cache activated");
        Ok(deleted)
    }

    /// Install, then activate right away when `skip_waiting` is set.
    pub async fn install_and_activate(&self) -> Result<LifecycleState, CacheError> {
        self.install().await?;
        if self.config.skip_waiting {
            self.activate().await?;
        }
        Ok(self.state().await)
    }

    /// Cache-first lookup, falling back to the network. Misses are not stored.
    pub async fn handle_fetch(&self, request: &AssetRequest) -> Result<AssetResponse, FetchError> {
        self.chain.handle(request).await
    }

    async fn fetch_all(&self) -> Result<Vec<StoredAsset>, CacheError> {
        let fetches = self.manifest.requests().map(|request| async move {
            let result = self.fetcher.fetch(&request).await;
            (request, result)
        });

        let mut assets = Vec::with_capacity(self.manifest.len());
        for (request, result) in join_all(fetches).await {
            let url = request.url().to_string();
            let response = result.map_err(|source| CacheError::Fetch {
                url: url.clone(),
                source,
            })?;
            if !response.is_success() {
                return Err(CacheError::BadStatus {
                    url,
                    status: response.status(),
                });
            }
            if response.body().len() > self.config.max_asset_bytes {
                return Err(CacheError::AssetTooLarge {
                    url,
                    size: response.body().len(),
                    max: self.config.max_asset_bytes,
                });
            }
            assets.push(StoredAsset::new(request.key(), url, response));
        }
        Ok(assets)
    }

    async fn install_failed(&self, previous: LifecycleState, error: &CacheError) {
        warn!(error = %error, "cache install failed");
        let next = if self.active.read().await.is_some() {
            previous
        } else {
            LifecycleState::Redundant
        };
        self.set_state(next).await;
    }

    async fn set_state(&self, state: LifecycleState) {
        *self.state.write().await = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::storage::MemoryCacheStorage;
    use async_trait::async_trait;

    struct StaticFetcher;

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, FetchError> {
            Ok(AssetResponse::ok(request.url().to_string()))
        }
    }

    fn config(skip_waiting: bool) -> CacheConfig {
        CacheConfig {
            assets: vec!["./".into(), "./index.html".into()],
            skip_waiting,
            ..CacheConfig::default()
        }
    }

    fn manager(skip_waiting: bool) -> OfflineCacheManager {
        OfflineCacheManager::new(
            config(skip_waiting),
            Arc::new(MemoryCacheStorage::new()),
            Arc::new(StaticFetcher),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn starts_parsed() {
        let manager = manager(true);
        assert_eq!(manager.state().await, LifecycleState::Parsed);
        assert_eq!(manager.version().as_str(), "clt-v1");
        assert!(manager.active_version().await.is_none());
    }

    #[tokio::test]
    async fn activate_requires_install() {
        let manager = manager(true);
        assert!(matches!(
            manager.activate().await,
            Err(CacheError::NotInstalled(LifecycleState::Parsed))
        ));
    }

    #[tokio::test]
    async fn skip_waiting_activates_immediately() {
        let manager = manager(true);
        assert_eq!(
            manager.install_and_activate().await.unwrap(),
            LifecycleState::Activated
        );
    }

    #[tokio::test]
    async fn without_skip_waiting_stays_installed() {
        let manager = manager(false);
        assert_eq!(
            manager.install_and_activate().await.unwrap(),
            LifecycleState::Installed
        );
        assert!(manager.active_version().await.is_none());
    }

    #[tokio::test]
    async fn invalid_config_rejected() {
        let result = OfflineCacheManager::new(
            CacheConfig {
                version: String::new(),
                ..CacheConfig::default()
            },
            Arc::new(MemoryCacheStorage::new()),
            Arc::new(StaticFetcher),
        );
        assert!(matches!(result, Err(CacheError::Config(_))));
    }
}
