use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use shared::cache::{
    AssetRequest, AssetResponse, CacheError, CacheStorage, CacheVersion, FetchError, Fetcher,
    Headers, LifecycleState, MemoryCacheStorage, OfflineCacheManager, SqliteCacheStorage,
};
use shared::CacheConfig;
use tokio::sync::Mutex;

/// Serves `"{tag}:{path}"` bodies; selected paths fail or return 404.
struct ScriptedFetcher {
    tag: &'static str,
    unreachable: Mutex<HashSet<String>>,
    missing: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    fn new(tag: &'static str) -> Self {
        Self {
            tag,
            unreachable: Mutex::new(HashSet::new()),
            missing: Mutex::new(HashSet::new()),
            calls: AtomicUsize::new(0),
        }
    }

    async fn fail(&self, path: &str) {
        self.unreachable.lock().await.insert(path.to_string());
    }

    async fn heal(&self, path: &str) {
        self.unreachable.lock().await.remove(path);
    }

    async fn not_found(&self, path: &str) {
        self.missing.lock().await.insert(path.to_string());
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let path = request.url().path().to_string();
        if self.unreachable.lock().await.contains(&path) {
            return Err(FetchError::Network {
                url: request.url().to_string(),
                message: "connection reset".into(),
            });
        }
        if self.missing.lock().await.contains(&path) {
            return Ok(AssetResponse::new(404, Headers::new(), "not found"));
        }
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/plain").unwrap();
        Ok(AssetResponse::new(200, headers, format!("{}:{path}", self.tag)))
    }
}

const FIVE_ASSETS: &[&str] = &[
    "./index.html",
    "./styles.css",
    "./script.js",
    "./manifest.json",
    "./assets/logos/kia.svg",
];

fn config(version: &str) -> CacheConfig {
    CacheConfig {
        version: version.into(),
        scope: "https://tracker.test/".into(),
        assets: FIVE_ASSETS.iter().map(|a| (*a).to_string()).collect(),
        ..CacheConfig::default()
    }
}

fn version(tag: &str) -> CacheVersion {
    CacheVersion::new(tag).unwrap()
}

fn get(path: &str) -> AssetRequest {
    AssetRequest::get(&format!("https://tracker.test{path}")).unwrap()
}

async fn body_of(manager: &OfflineCacheManager, path: &str) -> String {
    let response = manager.handle_fetch(&get(path)).await.unwrap();
    String::from_utf8(response.body().to_vec()).unwrap()
}

#[tokio::test]
async fn install_activate_then_serve_offline() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let fetcher = Arc::new(ScriptedFetcher::new("v1"));
    let manager =
        OfflineCacheManager::new(config("clt-v1"), storage.clone(), fetcher.clone()).unwrap();

    assert_eq!(
        manager.install_and_activate().await.unwrap(),
        LifecycleState::Activated
    );
    assert_eq!(fetcher.calls(), 5);

    // network goes away; cached assets still load
    for asset in FIVE_ASSETS {
        fetcher.fail(&asset[1..]).await;
    }
    assert_eq!(body_of(&manager, "/styles.css").await, "v1:/styles.css");
    assert_eq!(body_of(&manager, "/index.html#section").await, "v1:/index.html");
    assert_eq!(fetcher.calls(), 5);
}

#[tokio::test]
async fn one_failed_fetch_aborts_the_install() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let fetcher = Arc::new(ScriptedFetcher::new("v2"));
    fetcher.fail("/script.js").await;
    let manager = OfflineCacheManager::new(config("clt-v2"), storage.clone(), fetcher).unwrap();

    let err = manager.install_and_activate().await.unwrap_err();
    assert!(matches!(err, CacheError::Fetch { ref url, .. } if url.ends_with("/script.js")));
    assert!(err.is_fetch_failure());
    assert_eq!(manager.state().await, LifecycleState::Redundant);
    assert!(manager.active_version().await.is_none());
    assert!(storage.versions().await.unwrap().is_empty());
}

#[tokio::test]
async fn non_success_status_aborts_the_install() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let fetcher = Arc::new(ScriptedFetcher::new("v1"));
    fetcher.not_found("/manifest.json").await;
    let manager = OfflineCacheManager::new(config("clt-v1"), storage.clone(), fetcher).unwrap();

    assert!(matches!(
        manager.install().await,
        Err(CacheError::BadStatus { status: 404, .. })
    ));
    assert!(storage.versions().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_upgrade_keeps_old_version_serving() {
    let storage = Arc::new(MemoryCacheStorage::new());

    let v1 = OfflineCacheManager::new(
        config("clt-v1"),
        storage.clone(),
        Arc::new(ScriptedFetcher::new("v1")),
    )
    .unwrap();
    v1.install_and_activate().await.unwrap();

    let fetcher = Arc::new(ScriptedFetcher::new("v2"));
    fetcher.fail("/assets/logos/kia.svg").await;
    let v2 = OfflineCacheManager::new(config("clt-v2"), storage.clone(), fetcher.clone()).unwrap();
    assert!(v2.resume(&version("clt-v1")).await.unwrap());

    assert!(v2.install_and_activate().await.is_err());
    assert_eq!(storage.versions().await.unwrap(), vec![version("clt-v1")]);
    assert_eq!(v2.active_version().await, Some(version("clt-v1")));

    let calls_before = fetcher.calls();
    assert_eq!(body_of(&v2, "/index.html").await, "v1:/index.html");
    assert_eq!(fetcher.calls(), calls_before);
    assert_eq!(body_of(&v1, "/index.html").await, "v1:/index.html");
}

#[tokio::test]
async fn activation_deletes_every_other_version() {
    let storage = Arc::new(MemoryCacheStorage::new());
    OfflineCacheManager::new(
        config("clt-v1"),
        storage.clone(),
        Arc::new(ScriptedFetcher::new("v1")),
    )
    .unwrap()
    .install()
    .await
    .unwrap();

    let v2 = OfflineCacheManager::new(
        config("clt-v2"),
        storage.clone(),
        Arc::new(ScriptedFetcher::new("v2")),
    )
    .unwrap();
    v2.install().await.unwrap();
    assert_eq!(
        storage.versions().await.unwrap(),
        vec![version("clt-v1"), version("clt-v2")]
    );

    let deleted = v2.activate().await.unwrap();
    assert_eq!(deleted, vec![version("clt-v1")]);
    assert_eq!(storage.versions().await.unwrap(), vec![version("clt-v2")]);
    assert!(storage
        .lookup(&version("clt-v1"), &get("/index.html").key())
        .await
        .unwrap()
        .is_none());
    assert_eq!(body_of(&v2, "/index.html").await, "v2:/index.html");
}

#[tokio::test]
async fn misses_go_to_network_and_are_not_cached() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let fetcher = Arc::new(ScriptedFetcher::new("v1"));
    let manager =
        OfflineCacheManager::new(config("clt-v1"), storage.clone(), fetcher.clone()).unwrap();
    manager.install_and_activate().await.unwrap();

    assert_eq!(body_of(&manager, "/api/extra.json").await, "v1:/api/extra.json");
    assert_eq!(body_of(&manager, "/api/extra.json").await, "v1:/api/extra.json");
    assert_eq!(fetcher.calls(), 7);
    assert!(storage
        .lookup(&version("clt-v1"), &get("/api/extra.json").key())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn network_failure_on_miss_propagates() {
    let fetcher = Arc::new(ScriptedFetcher::new("v1"));
    let manager = OfflineCacheManager::new(
        config("clt-v1"),
        Arc::new(MemoryCacheStorage::new()),
        fetcher.clone(),
    )
    .unwrap();
    manager.install_and_activate().await.unwrap();

    fetcher.fail("/offline.html").await;
    let result = manager.handle_fetch(&get("/offline.html")).await;
    assert!(matches!(result, Err(ref e) if e.is_network()));
}

#[tokio::test]
async fn reinstall_after_failure_succeeds() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let fetcher = Arc::new(ScriptedFetcher::new("v1"));
    fetcher.fail("/styles.css").await;
    let manager =
        OfflineCacheManager::new(config("clt-v1"), storage.clone(), fetcher.clone()).unwrap();
    assert!(manager.install().await.is_err());

    fetcher.heal("/styles.css").await;
    assert_eq!(manager.install().await.unwrap(), 5);
    assert_eq!(manager.state().await, LifecycleState::Installed);
}

#[tokio::test]
async fn concurrent_installs_are_serialized() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let fetcher = Arc::new(ScriptedFetcher::new("v1"));
    let manager =
        Arc::new(OfflineCacheManager::new(config("clt-v1"), storage.clone(), fetcher.clone()).unwrap());

    let (a, b) = tokio::join!(manager.install(), manager.install());
    assert_eq!(a.unwrap(), 5);
    assert_eq!(b.unwrap(), 5);
    assert_eq!(fetcher.calls(), 10);
    assert_eq!(manager.state().await, LifecycleState::Installed);
    assert_eq!(storage.versions().await.unwrap(), vec![version("clt-v1")]);
}

#[tokio::test]
async fn sqlite_backend_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("assets.db");

    {
        let storage = Arc::new(SqliteCacheStorage::open(&path).unwrap());
        let manager = OfflineCacheManager::new(
            config("clt-v1"),
            storage,
            Arc::new(ScriptedFetcher::new("v1")),
        )
        .unwrap();
        manager.install_and_activate().await.unwrap();
    }

    let storage = Arc::new(SqliteCacheStorage::open(&path).unwrap());
    let fetcher = Arc::new(ScriptedFetcher::new("offline"));
    for asset in FIVE_ASSETS {
        fetcher.fail(&asset[1..]).await;
    }
    let manager = OfflineCacheManager::new(config("clt-v1"), storage, fetcher).unwrap();
    assert!(manager.resume(&version("clt-v1")).await.unwrap());

    let response = manager.handle_fetch(&get("/script.js")).await.unwrap();
    assert_eq!(response.body().as_ref(), b"v1:/script.js");
    assert_eq!(response.header("content-type"), Some("text/plain"));
}
