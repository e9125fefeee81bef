//! Offline asset cache: versioned install, activation with cleanup of stale
//! versions, and cache-first request interception.

pub mod fetch;
pub mod interceptor;
pub mod manager;
pub mod manifest;
pub mod request;
pub mod storage;

use thiserror::Error;

use crate::config::ConfigError;

pub use self::fetch::Fetcher;
pub use self::interceptor::{CacheFirst, Interceptor, InterceptorChain, NetworkPassThrough};
pub use self::manager::{LifecycleState, OfflineCacheManager};
pub use self::manifest::{CacheManifest, CacheVersion, DEFAULT_ASSETS};
pub use self::request::{AssetRequest, AssetResponse, FetchError, Headers, Method, RequestKey};
#[cfg(not(target_arch = "wasm32"))]
pub use self::storage::SqliteCacheStorage;
pub use self::storage::{CacheStorage, MemoryCacheStorage, StoredAsset};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid cache version '{0}'")]
    InvalidVersion(String),

    #[error("invalid manifest entry '{entry}': {reason}")]
    InvalidAsset { entry: String, reason: String },

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("fetching {url} returned status {status}")]
    BadStatus { url: String, status: u16 },

    #[error("asset {url} too large: {size} bytes, max {max}")]
    AssetTooLarge { url: String, size: usize, max: usize },

    #[error("cannot activate from state {0:?}")]
    NotInstalled(LifecycleState),

    #[error("storage error: {0}")]
    Storage(String),

    #[cfg(not(target_arch = "wasm32"))]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl CacheError {
    /// Install failures caused by the network rather than by local state.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::BadStatus { .. } | Self::AssetTooLarge { .. }
        )
    }
}
