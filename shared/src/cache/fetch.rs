use async_trait::async_trait;

use super::request::{AssetRequest, AssetResponse, FetchError};

/// Network boundary supplied by the host.
///
/// Non-2xx statuses are returned as responses, not errors; only transport
/// failures produce a [`FetchError`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, FetchError>;
}
