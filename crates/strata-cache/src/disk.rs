//! Disk cache tier with TTL expiration
//!
//! Blobs live flat under one directory: `/` in logical names is replaced by
//! a marker so nested names never need directories. Every open, read and
//! write touches the name in an `ExpiringIndex`, and a background task
//! evicts names that have not been touched within the TTL.

use crate::config::{DiskCacheConfig, EvictionMode, WriteRule};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use expiring_index::ExpiringIndex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use strata_fs::{FileInfo, FsError, OpenFlags, OpenOptions, OsStore, Result, Store, StoreFile};
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Stands in for `/` in stored blob names. The mapping is not reversible:
/// `a/b` and `a_slash_b` name the same blob.
pub const SLASH_MARKER: &str = "_slash_";

/// Prefix of the temp files a write stages next to its blob
const STAGING_PREFIX: &str = ".strata-staging-";

const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);

/// Logical name to flat blob name
pub fn flat_name(name: &str) -> String {
    name.replace('/', SLASH_MARKER)
}

/// Oldest touch time that survives a sweep at `now`
fn expiry_threshold(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_sub_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// State shared between the tier and its sweep task
struct Shared {
    backend: Arc<dyn Store>,
    index: ExpiringIndex,
    ttl: Duration,
    eviction: EvictionMode,
    /// Held shared by every access that touches the index and exclusively
    /// by a deleting sweep, so expiry and blob deletion form one step
    access: RwLock<()>,
}

impl Shared {
    async fn sweep(&self) -> Vec<String> {
        // Accesses wait out a deleting pass, so a name touched after its
        // expiry keeps its bytes.
        let _exclusive = match self.eviction {
            EvictionMode::DeleteBlobs => Some(self.access.write().await),
            EvictionMode::IndexOnly => None,
        };

        let threshold = expiry_threshold(Utc::now(), self.ttl);
        let expired = self.index.expire_before(threshold).await;

        if self.eviction == EvictionMode::DeleteBlobs {
            for name in &expired {
                match self.backend.remove_file(name).await {
                    Ok(()) => debug!(name = %name, "Deleted expired blob"),
                    Err(e) if e.is_not_found() => {}
                    Err(e) => warn!(name = %name, error = %e, "Failed to delete expired blob"),
                }
            }
        }

        if !expired.is_empty() {
            info!(
                evicted = expired.len(),
                mode = ?self.eviction,
                "Disk cache sweep evicted entries"
            );
        }
        expired
    }
}

/// A cache tier over a flat byte store that forgets entries after a TTL.
/// Call `close` to stop the sweep task; dropping the tier also stops it
/// without waiting.
pub struct DiskCacheTier {
    shared: Arc<Shared>,
    location: Option<PathBuf>,
    write_rules: Vec<WriteRule>,
    shutdown: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl DiskCacheTier {
    /// Create a tier storing blobs on local disk at `config.location`
    pub async fn new(config: DiskCacheConfig) -> Result<Self> {
        let location = match &config.location {
            Some(location) => {
                let metadata = tokio::fs::metadata(location)
                    .await
                    .map_err(|e| FsError::from_io(e, &location.display().to_string()))?;
                if !metadata.is_dir() {
                    return Err(FsError::NotADirectory(location.display().to_string()));
                }
                location.clone()
            }
            None => tempfile::Builder::new()
                .prefix("diskcache_")
                .tempdir()?
                .keep(),
        };

        let backend = Arc::new(OsStore::new(&location));
        let mut tier = Self::with_backend(backend, config).await?;
        tier.location = Some(location);
        Ok(tier)
    }

    /// Create a tier over an externally supplied store. The index is seeded
    /// from the store's root listing so blobs left by an earlier process
    /// still expire.
    pub async fn with_backend(backend: Arc<dyn Store>, config: DiskCacheConfig) -> Result<Self> {
        let shared = Arc::new(Shared {
            backend,
            index: ExpiringIndex::new(),
            ttl: config.ttl,
            eviction: config.eviction,
            access: RwLock::new(()),
        });

        let existing = shared.backend.read_dir("").await?;
        let mut seeded = 0;
        for entry in existing
            .into_iter()
            .filter(|e| !e.is_dir && !e.name.starts_with(STAGING_PREFIX))
        {
            shared.index.touch_at(&entry.name, entry.mod_time).await;
            seeded += 1;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let sweeper = spawn_sweeper(shared.clone(), config.check_interval, shutdown_rx);

        info!(
            location = ?config.location,
            seeded,
            ttl_secs = config.ttl.as_secs(),
            check_interval_ms = config.check_interval.as_millis() as u64,
            "Disk cache tier started"
        );

        Ok(Self {
            shared,
            location: config.location,
            write_rules: config.write_rules,
            shutdown,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Directory holding the blobs, when backed by local disk
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    pub fn index(&self) -> &ExpiringIndex {
        &self.shared.index
    }

    pub fn ttl(&self) -> Duration {
        self.shared.ttl
    }

    /// Run one eviction pass now. Returns the evicted (flat) names.
    pub async fn sweep_now(&self) -> Vec<String> {
        self.shared.sweep().await
    }

    /// Stop the sweep task, letting a pass in progress finish. Safe to call
    /// more than once.
    pub async fn close(&self) {
        let Some(handle) = self.sweeper.lock().await.take() else {
            return;
        };

        let _ = self.shutdown.send(true);
        if let Err(e) = handle.await {
            warn!(error = %e, "Disk cache sweep task ended abnormally");
        }
        info!("Disk cache tier closed");
    }

    /// Options from the first rule matching `name`
    fn options_for(&self, name: &str) -> OpenOptions {
        self.write_rules
            .iter()
            .find(|rule| rule.matches(name))
            .map(|rule| rule.options)
            .unwrap_or_default()
    }
}

fn spawn_sweeper(
    shared: Arc<Shared>,
    check_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(check_interval.max(MIN_CHECK_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                // Also fires when the tier is dropped.
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    shared.sweep().await;
                }
            }
        }
        debug!("Disk cache sweep task stopped");
    })
}

/// Stage `content` in a temp file beside the blob, then rename it over
/// `dir/name`
async fn replace_blob(dir: &Path, name: &str, content: Bytes, mode: u32) -> Result<()> {
    let dir = dir.to_path_buf();
    let name = name.to_string();

    tokio::task::spawn_blocking(move || -> Result<()> {
        use std::io::Write;

        let mut staged = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(&dir)
            .map_err(|e| FsError::from_io(e, &name))?;
        staged
            .write_all(&content)
            .map_err(|e| FsError::from_io(e, &name))?;
        set_mode(staged.as_file(), mode).map_err(|e| FsError::from_io(e, &name))?;
        staged
            .persist(dir.join(&name))
            .map_err(|e| FsError::from_io(e.error, &name))?;
        Ok(())
    })
    .await
    .map_err(|e| FsError::Internal(format!("blob write task failed: {}", e)))?
}

#[cfg(unix)]
fn set_mode(file: &std::fs::File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &std::fs::File, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl Store for DiskCacheTier {
    async fn open(&self, path: &str) -> Result<Box<dyn StoreFile>> {
        self.open_file(path, OpenFlags::empty(), &OpenOptions::default())
            .await
    }

    async fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        options: &OpenOptions,
    ) -> Result<Box<dyn StoreFile>> {
        let name = flat_name(path);
        let _access = self.shared.access.read().await;
        let file = self.shared.backend.open_file(&name, flags, options).await?;
        self.shared.index.touch(&name).await;
        Ok(file)
    }

    async fn read_file(&self, path: &str) -> Result<Bytes> {
        let name = flat_name(path);
        let _access = self.shared.access.read().await;
        let content = self.shared.backend.read_file(&name).await?;
        self.shared.index.touch(&name).await;
        debug!(name = %name, size = content.len(), "Disk cache read");
        Ok(content)
    }

    /// Replaces any previous blob using the options of the first matching
    /// write rule. On local disk the new bytes are renamed into place, so
    /// concurrent readers never see a partial blob. The name is touched once
    /// the write has landed.
    async fn write_file(&self, path: &str, content: Bytes) -> Result<()> {
        let name = flat_name(path);
        let options = self.options_for(path);
        let size = content.len();

        let _access = self.shared.access.read().await;
        match &self.location {
            Some(location) => replace_blob(location, &name, content, options.mode).await?,
            None => {
                let mut file = self
                    .shared
                    .backend
                    .open_file(
                        &name,
                        OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                        &options,
                    )
                    .await?;
                file.write_all(&content).await?;
                file.shutdown().await?;
            }
        }
        self.shared.index.touch(&name).await;

        debug!(path = %path, size, mode = options.mode, "Disk cache write");
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<FileInfo> {
        self.shared.backend.stat(&flat_name(path)).await
    }

    /// Lists stored blobs under their flat names
    async fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>> {
        self.shared.backend.read_dir(&flat_name(path)).await
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        let name = flat_name(path);
        let _access = self.shared.access.read().await;
        self.shared.backend.remove_file(&name).await?;
        self.shared.index.remove(&name).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use strata_fs::TreeStore;
    use tempfile::tempdir;
    use tokio::sync::{Notify, Semaphore};

    /// OS store whose removals announce themselves and then wait for a permit
    struct GatedRemoveStore {
        inner: OsStore,
        removing: Notify,
        gate: Semaphore,
    }

    impl GatedRemoveStore {
        fn new(root: &Path) -> Self {
            Self {
                inner: OsStore::new(root),
                removing: Notify::new(),
                gate: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl Store for GatedRemoveStore {
        async fn open(&self, path: &str) -> Result<Box<dyn StoreFile>> {
            self.inner.open(path).await
        }

        async fn open_file(
            &self,
            path: &str,
            flags: OpenFlags,
            options: &OpenOptions,
        ) -> Result<Box<dyn StoreFile>> {
            self.inner.open_file(path, flags, options).await
        }

        async fn read_file(&self, path: &str) -> Result<Bytes> {
            self.inner.read_file(path).await
        }

        async fn write_file(&self, path: &str, content: Bytes) -> Result<()> {
            self.inner.write_file(path, content).await
        }

        async fn stat(&self, path: &str) -> Result<FileInfo> {
            self.inner.stat(path).await
        }

        async fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>> {
            self.inner.read_dir(path).await
        }

        async fn remove_file(&self, path: &str) -> Result<()> {
            self.removing.notify_one();
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| FsError::Internal(e.to_string()))?;
            self.inner.remove_file(path).await
        }
    }

    fn config_at(dir: &Path) -> DiskCacheConfig {
        DiskCacheConfig {
            location: Some(dir.to_path_buf()),
            ..DiskCacheConfig::default()
        }
    }

    async fn backdate(tier: &DiskCacheTier, name: &str, by: chrono::Duration) {
        tier.index()
            .touch_at(&flat_name(name), Utc::now() - by)
            .await;
    }

    #[test]
    fn test_flat_name() {
        assert_eq!(flat_name("/a/b.txt"), "_slash_a_slash_b.txt");
        assert_eq!(flat_name("plain"), "plain");
        assert_eq!(flat_name("a/b"), flat_name("a_slash_b"));
    }

    #[test]
    fn test_expiry_threshold_saturates() {
        let now = Utc::now();
        assert_eq!(
            expiry_threshold(now, Duration::from_secs(60)),
            now - chrono::Duration::seconds(60)
        );
        assert_eq!(
            expiry_threshold(now, Duration::MAX),
            DateTime::<Utc>::MIN_UTC
        );
    }

    #[tokio::test]
    async fn test_write_read_stores_flat_and_touches() {
        let dir = tempdir().unwrap();
        let tier = DiskCacheTier::new(config_at(dir.path())).await.unwrap();

        tier.write_file("/a/b.txt", Bytes::from_static(b"cached"))
            .await
            .unwrap();
        assert!(dir.path().join("_slash_a_slash_b.txt").is_file());

        assert_eq!(tier.read_file("/a/b.txt").await.unwrap(), Bytes::from("cached"));
        assert!(tier
            .index()
            .last_touched("_slash_a_slash_b.txt")
            .await
            .is_some());

        let info = tier.stat("/a/b.txt").await.unwrap();
        assert_eq!(info.size, 6);

        // Overwrites are allowed
        tier.write_file("/a/b.txt", Bytes::from_static(b"v2"))
            .await
            .unwrap();
        assert_eq!(tier.read_file("/a/b.txt").await.unwrap(), Bytes::from("v2"));

        tier.close().await;
    }

    #[tokio::test]
    async fn test_missing_is_not_touched() {
        let dir = tempdir().unwrap();
        let tier = DiskCacheTier::new(config_at(dir.path())).await.unwrap();

        assert!(tier.read_file("missing").await.unwrap_err().is_not_found());
        assert!(tier.index().is_empty().await);
        tier.close().await;
    }

    #[tokio::test]
    async fn test_index_only_eviction_keeps_bytes() {
        let dir = tempdir().unwrap();
        let tier = DiskCacheTier::new(config_at(dir.path())).await.unwrap();
        tier.write_file("old", Bytes::from_static(b"1")).await.unwrap();
        tier.write_file("new", Bytes::from_static(b"2")).await.unwrap();
        backdate(&tier, "old", chrono::Duration::hours(1)).await;

        let evicted = tier.sweep_now().await;
        assert_eq!(evicted, vec!["old"]);
        assert!(tier.index().last_touched("old").await.is_none());
        assert!(tier.index().last_touched("new").await.is_some());
        assert!(dir.path().join("old").is_file());
        tier.close().await;
    }

    #[tokio::test]
    async fn test_delete_eviction_removes_bytes() {
        let dir = tempdir().unwrap();
        let config = DiskCacheConfig {
            eviction: EvictionMode::DeleteBlobs,
            ..config_at(dir.path())
        };
        let tier = DiskCacheTier::new(config).await.unwrap();
        tier.write_file("x/old", Bytes::from_static(b"1")).await.unwrap();
        backdate(&tier, "x/old", chrono::Duration::hours(1)).await;

        assert_eq!(tier.sweep_now().await, vec!["x_slash_old"]);
        assert!(!dir.path().join("x_slash_old").exists());
        assert!(tier.read_file("x/old").await.unwrap_err().is_not_found());
        tier.close().await;
    }

    #[tokio::test]
    async fn test_delete_failure_still_drops_index_entry() {
        // The tree store cannot remove files.
        let backend = Arc::new(TreeStore::default());
        let config = DiskCacheConfig {
            eviction: EvictionMode::DeleteBlobs,
            ..DiskCacheConfig::default()
        };
        let tier = DiskCacheTier::with_backend(backend.clone(), config)
            .await
            .unwrap();
        tier.write_file("k", Bytes::from_static(b"v")).await.unwrap();
        backdate(&tier, "k", chrono::Duration::hours(1)).await;

        assert_eq!(tier.sweep_now().await, vec!["k"]);
        assert!(tier.index().is_empty().await);
        assert_eq!(backend.read_file("k").unwrap(), Bytes::from("v"));
        assert!(tier.location().is_none());
        tier.close().await;
    }

    #[tokio::test]
    async fn test_background_sweep_evicts() {
        let dir = tempdir().unwrap();
        let config = DiskCacheConfig {
            check_interval: Duration::from_millis(20),
            ..config_at(dir.path())
        };
        let tier = DiskCacheTier::new(config).await.unwrap();
        tier.write_file("stale", Bytes::from_static(b"s")).await.unwrap();
        backdate(&tier, "stale", chrono::Duration::hours(2)).await;

        for _ in 0..200 {
            if tier.index().is_empty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(tier.index().is_empty().await);
        tier.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_stops_sweeping() {
        let dir = tempdir().unwrap();
        let config = DiskCacheConfig {
            check_interval: Duration::from_millis(10),
            ..config_at(dir.path())
        };
        let tier = DiskCacheTier::new(config).await.unwrap();
        tier.close().await;
        tier.close().await;

        tier.write_file("kept", Bytes::from_static(b"k")).await.unwrap();
        backdate(&tier, "kept", chrono::Duration::hours(2)).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(tier.index().last_touched("kept").await.is_some());
    }

    #[tokio::test]
    async fn test_drop_stops_sweep_task() {
        let dir = tempdir().unwrap();
        let tier = DiskCacheTier::new(config_at(dir.path())).await.unwrap();
        let handle = tier.sweeper.lock().await.take().unwrap();
        drop(tier);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweep task should stop when the tier is dropped")
            .unwrap();
    }

    #[tokio::test]
    async fn test_index_seeded_from_existing_blobs() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("left"), b"over").unwrap();
        std::fs::write(dir.path().join("behind"), b"too").unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        std::fs::write(dir.path().join(".strata-staging-abc123"), b"torn").unwrap();

        let tier = DiskCacheTier::new(config_at(dir.path())).await.unwrap();
        assert_eq!(tier.index().len().await, 2);
        assert!(tier.index().last_touched("left").await.is_some());
        tier.close().await;
    }

    #[tokio::test]
    async fn test_location_must_be_directory() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();

        let err = DiskCacheTier::new(config_at(&file)).await.err().unwrap();
        assert!(matches!(err, FsError::NotADirectory(_)));

        let err = DiskCacheTier::new(config_at(&dir.path().join("missing")))
            .await
            .err()
            .unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_default_location_is_temp_dir() {
        let tier = DiskCacheTier::new(DiskCacheConfig::default()).await.unwrap();
        let location = tier.location().unwrap().to_path_buf();
        assert!(location.is_dir());
        let name = location.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("diskcache_"));

        tier.close().await;
        std::fs::remove_dir_all(location).unwrap();
    }

    #[tokio::test]
    async fn test_first_matching_write_rule_wins() {
        let dir = tempdir().unwrap();
        let config = DiskCacheConfig {
            write_rules: vec![
                WriteRule::new(Regex::new(r"\.secret$").unwrap(), OpenOptions { mode: 0o600 }),
                WriteRule::new(Regex::new(r"secret").unwrap(), OpenOptions { mode: 0o640 }),
                WriteRule::fallback(OpenOptions { mode: 0o644 }),
                WriteRule::new(Regex::new(r"never").unwrap(), OpenOptions { mode: 0o400 }),
            ],
            ..config_at(dir.path())
        };
        let tier = DiskCacheTier::new(config).await.unwrap();

        assert_eq!(tier.options_for("keys/api.secret").mode, 0o600);
        assert_eq!(tier.options_for("secrets/readme").mode, 0o640);
        assert_eq!(tier.options_for("never/reached").mode, 0o644);

        #[cfg(unix)]
        {
            tier.write_file("keys/api.secret", Bytes::from_static(b"s"))
                .await
                .unwrap();
            tier.write_file("plain", Bytes::from_static(b"p")).await.unwrap();
            assert_eq!(tier.stat("keys/api.secret").await.unwrap().mode, 0o600);
            assert_eq!(tier.stat("plain").await.unwrap().mode, 0o644);
        }
        tier.close().await;
    }

    #[tokio::test]
    async fn test_no_rules_uses_default_options() {
        let tier = DiskCacheTier::with_backend(
            Arc::new(TreeStore::default()),
            DiskCacheConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(tier.options_for("anything"), OpenOptions::default());
        tier.close().await;
    }

    #[tokio::test]
    async fn test_remove_file_drops_index_entry() {
        let dir = tempdir().unwrap();
        let tier = DiskCacheTier::new(config_at(dir.path())).await.unwrap();
        tier.write_file("a/b", Bytes::from_static(b"x")).await.unwrap();
        tier.remove_file("a/b").await.unwrap();
        assert!(tier.index().is_empty().await);
        assert!(!dir.path().join("a_slash_b").exists());
        tier.close().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reads_never_see_a_partial_rewrite() {
        let dir = tempdir().unwrap();
        let tier = Arc::new(DiskCacheTier::new(config_at(dir.path())).await.unwrap());
        let full = Bytes::from(vec![b'x'; 256 * 1024]);
        tier.write_file("k", full.clone()).await.unwrap();

        let writer = {
            let tier = tier.clone();
            let full = full.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    tier.write_file("k", full.clone()).await.unwrap();
                }
            })
        };
        while !writer.is_finished() {
            let read = tier.read_file("k").await.unwrap();
            assert_eq!(read.len(), full.len());
        }
        writer.await.unwrap();

        // Only the blob itself remains once the writes have landed.
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["k"]);
        tier.close().await;
    }

    #[tokio::test]
    async fn test_failed_write_is_not_touched() {
        let dir = tempdir().unwrap();
        let location = dir.path().join("cache");
        std::fs::create_dir(&location).unwrap();
        let tier = DiskCacheTier::new(config_at(&location)).await.unwrap();
        std::fs::remove_dir(&location).unwrap();

        assert!(tier.write_file("k", Bytes::from_static(b"v")).await.is_err());
        assert!(tier.index().is_empty().await);
        tier.close().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_write_during_deleting_sweep_survives() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(GatedRemoveStore::new(dir.path()));
        let config = DiskCacheConfig {
            eviction: EvictionMode::DeleteBlobs,
            ..DiskCacheConfig::default()
        };
        let tier = Arc::new(
            DiskCacheTier::with_backend(backend.clone(), config)
                .await
                .unwrap(),
        );
        tier.write_file("k", Bytes::from_static(b"stale")).await.unwrap();
        backdate(&tier, "k", chrono::Duration::hours(1)).await;

        let sweep = {
            let tier = tier.clone();
            tokio::spawn(async move { tier.sweep_now().await })
        };
        backend.removing.notified().await;

        let write = {
            let tier = tier.clone();
            tokio::spawn(async move { tier.write_file("k", Bytes::from_static(b"fresh")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!write.is_finished());

        backend.gate.add_permits(1);
        assert_eq!(sweep.await.unwrap(), vec!["k"]);
        write.await.unwrap().unwrap();

        assert!(tier.index().last_touched("k").await.is_some());
        assert_eq!(tier.read_file("k").await.unwrap(), Bytes::from("fresh"));
        tier.close().await;
    }
}
