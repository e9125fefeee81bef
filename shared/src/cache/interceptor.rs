use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::fetch::Fetcher;
use super::manifest::CacheVersion;
use super::request::{AssetRequest, AssetResponse, FetchError};
use super::storage::CacheStorage;

/// One stage of request handling. Returning `Ok(None)` passes the request on.
#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower runs first.
    fn priority(&self) -> i32;

    async fn intercept(&self, request: &AssetRequest) -> Result<Option<AssetResponse>, FetchError>;
}

/// Serves from the active cache version; misses fall through.
pub struct CacheFirst {
    storage: Arc<dyn CacheStorage>,
    active: Arc<RwLock<Option<CacheVersion>>>,
}

impl CacheFirst {
    pub const PRIORITY: i32 = 0;

    pub fn new(storage: Arc<dyn CacheStorage>, active: Arc<RwLock<Option<CacheVersion>>>) -> Self {
        Self { storage, active }
    }
}

#[async_trait]
impl Interceptor for CacheFirst {
    fn name(&self) -> &'static str {
        "cache_first"
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    async fn intercept(&self, request: &AssetRequest) -> Result<Option<AssetResponse>, FetchError> {
        let Some(version) = self.active.read().await.clone() else {
            return Ok(None);
        };

        match self.storage.lookup(&version, &request.key()).await {
            Ok(Some(response)) => {
                debug!(key = %request.key(), %version, "served from cache");
                Ok(Some(response))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(key = %request.key(), error = %e, "cache lookup failed, using network");
                Ok(None)
            }
        }
    }
}

/// Hands the request to the network unchanged. Responses are never cached here.
pub struct NetworkPassThrough {
    fetcher: Arc<dyn Fetcher>,
}

impl NetworkPassThrough {
    pub const PRIORITY: i32 = 100;

    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Interceptor for NetworkPassThrough {
    fn name(&self) -> &'static str {
        "network"
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    async fn intercept(&self, request: &AssetRequest) -> Result<Option<AssetResponse>, FetchError> {
        self.fetcher.fetch(request).await.map(Some)
    }
}

#[derive(Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the chain sorted by priority; equal priorities keep insertion order.
    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
        self.interceptors.sort_by_key(|i| i.priority());
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    pub async fn handle(&self, request: &AssetRequest) -> Result<AssetResponse, FetchError> {
        for interceptor in &self.interceptors {
            if let Some(response) = interceptor.intercept(request).await? {
                return Ok(response);
            }
        }
        Err(FetchError::Unhandled {
            url: request.url().to_string(),
        })
    }
}
