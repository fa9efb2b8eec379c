//! Waterfall coordinator over a cache tier and a backing store
//!
//! Reads try the cache first and fall back to the store. A read served by
//! the store schedules a background write of the same bytes into the cache
//! so later reads hit the faster tier. Writes go to the store only.

use crate::config::CoordinatorConfig;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use strata_fs::{FileInfo, OpenFlags, OpenOptions, Result, Store, StoreFile};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Composes two tiers into one logical store. Holds no entries of its own,
/// so tiers can be shared between coordinators and coordinators can be
/// stacked as tiers of other coordinators.
pub struct CacheCoordinator {
    cache: Arc<dyn Store>,
    store: Arc<dyn Store>,
    backfill_permits: Arc<Semaphore>,
}

impl CacheCoordinator {
    pub fn new(cache: Arc<dyn Store>, store: Arc<dyn Store>) -> Self {
        Self::with_config(cache, store, CoordinatorConfig::default())
    }

    pub fn with_config(
        cache: Arc<dyn Store>,
        store: Arc<dyn Store>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            cache,
            store,
            backfill_permits: Arc::new(Semaphore::new(config.max_inflight_backfills)),
        }
    }

    /// The faster tier
    pub fn cache(&self) -> &Arc<dyn Store> {
        &self.cache
    }

    /// The backing tier
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Copy `content` into the cache in the background. Skipped when too
    /// many backfills are already running.
    fn schedule_backfill(&self, path: &str, content: Bytes) {
        let permit = match self.backfill_permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(path = %path, "Backfill skipped, too many in flight");
                return;
            }
        };

        let cache = self.cache.clone();
        let path = path.to_string();
        tokio::spawn(async move {
            let _permit = permit;
            match cache.write_file(&path, content).await {
                Ok(()) => debug!(path = %path, "Backfilled cache"),
                // A concurrent backfill of the same name got there first.
                Err(e) if e.is_already_exists() => {
                    debug!(path = %path, "Backfill target already cached")
                }
                Err(e) => warn!(path = %path, error = %e, "Failed to backfill cache"),
            }
        });
    }
}

#[async_trait]
impl Store for CacheCoordinator {
    /// Opening does not imply a full read, so it never backfills
    async fn open(&self, path: &str) -> Result<Box<dyn StoreFile>> {
        match self.cache.open(path).await {
            Ok(file) => Ok(file),
            Err(e) => {
                debug!(path = %path, error = %e, "Cache open missed");
                self.store.open(path).await
            }
        }
    }

    async fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        options: &OpenOptions,
    ) -> Result<Box<dyn StoreFile>> {
        if flags.is_read_only() {
            return self.open(path).await;
        }
        self.store.open_file(path, flags, options).await
    }

    async fn read_file(&self, path: &str) -> Result<Bytes> {
        match self.cache.read_file(path).await {
            Ok(content) => {
                debug!(path = %path, "Cache hit");
                return Ok(content);
            }
            Err(e) => debug!(path = %path, error = %e, "Cache miss"),
        }

        let content = self.store.read_file(path).await?;
        self.schedule_backfill(path, content.clone());
        Ok(content)
    }

    /// Writes bypass the cache; an entry already cached for `path` stays
    /// stale until it is evicted
    async fn write_file(&self, path: &str, content: Bytes) -> Result<()> {
        self.store.write_file(path, content).await
    }

    async fn stat(&self, path: &str) -> Result<FileInfo> {
        match self.cache.stat(path).await {
            Ok(info) => Ok(info),
            Err(_) => self.store.stat(path).await,
        }
    }

    /// The cache only holds a partial view, so listings come from the store
    async fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>> {
        self.store.read_dir(path).await
    }
}
