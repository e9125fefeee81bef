use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::warn;

use super::manifest::CacheVersion;
use super::request::{AssetResponse, Headers, RequestKey};
use super::CacheError;

/// A cached response plus the BLAKE3 digest of its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub key: RequestKey,
    pub url: String,
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
    pub digest: String,
}

impl StoredAsset {
    pub fn new(key: RequestKey, url: impl Into<String>, response: AssetResponse) -> Self {
        let (status, headers, body) = response.into_parts();
        Self {
            digest: digest(&body),
            key,
            url: url.into(),
            status,
            headers,
            body,
        }
    }

    pub fn verify(&self) -> bool {
        digest(&self.body) == self.digest
    }

    /// The stored response, or `None` (logged) when the body no longer matches its digest.
    pub fn into_verified_response(self) -> Option<AssetResponse> {
        if !self.verify() {
            warn!(key = %self.key, "cached body failed integrity check");
            return None;
        }
        Some(AssetResponse::new(self.status, self.headers, self.body))
    }
}

fn digest(body: &[u8]) -> String {
    hex::encode(blake3::hash(body).as_bytes())
}

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Replaces everything stored under `version` in one step.
    async fn put_all(&self, version: &CacheVersion, assets: Vec<StoredAsset>)
        -> Result<(), CacheError>;

    async fn lookup(
        &self,
        version: &CacheVersion,
        key: &RequestKey,
    ) -> Result<Option<AssetResponse>, CacheError>;

    /// Stored versions, sorted by tag.
    async fn versions(&self) -> Result<Vec<CacheVersion>, CacheError>;

    async fn delete_version(&self, version: &CacheVersion) -> Result<bool, CacheError>;

    async fn has_version(&self, version: &CacheVersion) -> Result<bool, CacheError> {
        Ok(self.versions().await?.contains(version))
    }
}

#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    versions: RwLock<BTreeMap<CacheVersion, BTreeMap<RequestKey, StoredAsset>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    async fn corrupt(&self, version: &CacheVersion, key: &RequestKey) {
        let mut versions = self.versions.write().await;
        if let Some(asset) = versions.get_mut(version).and_then(|v| v.get_mut(key)) {
            asset.body = Bytes::from_static(b"tampered");
        }
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn put_all(
        &self,
        version: &CacheVersion,
        assets: Vec<StoredAsset>,
    ) -> Result<(), CacheError> {
        let entries = assets
            .into_iter()
            .map(|asset| (asset.key.clone(), asset))
            .collect();
        self.versions.write().await.insert(version.clone(), entries);
        Ok(())
    }

    async fn lookup(
        &self,
        version: &CacheVersion,
        key: &RequestKey,
    ) -> Result<Option<AssetResponse>, CacheError> {
        let versions = self.versions.read().await;
        Ok(versions
            .get(version)
            .and_then(|v| v.get(key))
            .cloned()
            .and_then(StoredAsset::into_verified_response))
    }

    async fn versions(&self) -> Result<Vec<CacheVersion>, CacheError> {
        Ok(self.versions.read().await.keys().cloned().collect())
    }

    async fn delete_version(&self, version: &CacheVersion) -> Result<bool, CacheError> {
        Ok(self.versions.write().await.remove(version).is_some())
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use self::sqlite::SqliteCacheStorage;

#[cfg(not(target_arch = "wasm32"))]
mod sqlite {
    use std::path::Path;

    use async_trait::async_trait;
    use chrono::Utc;
    use rusqlite::{params, Connection, OptionalExtension};
    use tokio::sync::Mutex;

    use super::{CacheStorage, StoredAsset};
    use crate::cache::manifest::CacheVersion;
    use crate::cache::request::{AssetResponse, Headers, RequestKey};
    use crate::cache::CacheError;

    const SCHEMA: &str = r"
        CREATE TABLE IF NOT EXISTS cache_versions (
            version TEXT PRIMARY KEY NOT NULL,
            asset_count INTEGER NOT NULL,
            stored_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cache_entries (
            version TEXT NOT NULL,
            request_key TEXT NOT NULL,
            url TEXT NOT NULL,
            status INTEGER NOT NULL,
            headers TEXT NOT NULL,
            body BLOB NOT NULL,
            digest TEXT NOT NULL,
            stored_at INTEGER NOT NULL,
            PRIMARY KEY (version, request_key)
        );

        CREATE INDEX IF NOT EXISTS idx_cache_version ON cache_entries(version);
    ";

    /// SQLite-backed cache; each version is written inside one transaction.
    pub struct SqliteCacheStorage {
        conn: Mutex<Connection>,
    }

    impl SqliteCacheStorage {
        pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
            Self::with_connection(Connection::open(path)?)
        }

        pub fn open_in_memory() -> Result<Self, CacheError> {
            Self::with_connection(Connection::open_in_memory()?)
        }

        fn with_connection(conn: Connection) -> Result<Self, CacheError> {
            conn.execute_batch(SCHEMA)?;
            Ok(Self {
                conn: Mutex::new(conn),
            })
        }
    }

    fn write_version(
        conn: &mut Connection,
        version: &CacheVersion,
        assets: &[StoredAsset],
    ) -> Result<(), CacheError> {
        let stored_at = Utc::now().timestamp_millis();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM cache_entries WHERE version = ?1",
            params![version.as_str()],
        )?;
        let asset_count = i64::try_from(assets.len())
            .map_err(|_| CacheError::Storage("too many assets".to_string()))?;
        // a version exists even when it holds no assets
        tx.execute(
            "INSERT OR REPLACE INTO cache_versions (version, asset_count, stored_at)
             VALUES (?1, ?2, ?3)",
            params![version.as_str(), asset_count, stored_at],
        )?;
        for asset in assets {
            let headers = serde_json::to_string(&asset.headers)
                .map_err(|e| CacheError::Storage(e.to_string()))?;
            tx.execute(
                "INSERT INTO cache_entries
                    (version, request_key, url, status, headers, body, digest, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    version.as_str(),
                    asset.key.as_str(),
                    asset.url,
                    i64::from(asset.status),
                    headers,
                    asset.body.as_ref(),
                    asset.digest,
                    stored_at,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn read_asset(
        conn: &Connection,
        version: &CacheVersion,
        key: &RequestKey,
    ) -> Result<Option<StoredAsset>, CacheError> {
        let row = conn
            .query_row(
                "SELECT url, status, headers, body, digest FROM cache_entries
                 WHERE version = ?1 AND request_key = ?2",
                params![version.as_str(), key.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((url, status, headers, body, digest)) = row else {
            return Ok(None);
        };
        let status = u16::try_from(status)
            .map_err(|_| CacheError::Storage(format!("invalid stored status {status}")))?;
        let headers: Headers =
            serde_json::from_str(&headers).map_err(|e| CacheError::Storage(e.to_string()))?;

        Ok(Some(StoredAsset {
            key: key.clone(),
            url,
            status,
            headers,
            body: body.into(),
            digest,
        }))
    }

    #[async_trait]
    impl CacheStorage for SqliteCacheStorage {
        async fn put_all(
            &self,
            version: &CacheVersion,
            assets: Vec<StoredAsset>,
        ) -> Result<(), CacheError> {
            let mut conn = self.conn.lock().await;
            write_version(&mut conn, version, &assets)
        }

        async fn lookup(
            &self,
            version: &CacheVersion,
            key: &RequestKey,
        ) -> Result<Option<AssetResponse>, CacheError> {
            let conn = self.conn.lock().await;
            Ok(read_asset(&conn, version, key)?.and_then(StoredAsset::into_verified_response))
        }

        async fn versions(&self) -> Result<Vec<CacheVersion>, CacheError> {
            let conn = self.conn.lock().await;
            let mut stmt = conn.prepare("SELECT version FROM cache_versions ORDER BY version")?;
            let tags = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            tags.into_iter().map(CacheVersion::new).collect()
        }

        async fn delete_version(&self, version: &CacheVersion) -> Result<bool, CacheError> {
            let mut conn = self.conn.lock().await;
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM cache_entries WHERE version = ?1",
                params![version.as_str()],
            )?;
            let removed = tx.execute(
                "DELETE FROM cache_versions WHERE version = ?1",
                params![version.as_str()],
            )?;
            tx.commit()?;
            Ok(removed > 0)
        }
    }
}
