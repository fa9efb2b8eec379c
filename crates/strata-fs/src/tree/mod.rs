//! In-memory tree store
//!
//! A writable virtual filesystem of named nodes that doubles as the fastest
//! cache tier. Writes are linearized by the tree's write lock. Once frozen
//! the store is read-only, and with `fast_lookup` enabled a flat table keyed
//! by a Pearson hash of the full path answers file lookups in O(1).
//!
//! The frozen table keeps one entry per slot, so two paths that land in the
//! same slot leave only the later one (in ascending walk order) in the
//! table. Lookups that miss the table fall back to walking the read-only
//! tree, which keeps every file reachable; `freeze` reports the collisions.

mod file;
mod node;
mod pearson;

pub use file::{TreeFile, TreeFileWriter};

use crate::error::{FsError, Result};
use crate::store::{Store, StoreFile};
use crate::types::{FileInfo, OpenFlags, OpenOptions};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use node::{Node, NodeKind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Configuration for a `TreeStore`
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeStoreConfig {
    /// Build the O(1) lookup table when the store is frozen. Paths are
    /// hashed byte-wise, so callers should stick to ASCII names.
    pub fast_lookup: bool,
}

/// Two paths that hashed to the same frozen-table slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotCollision {
    pub slot: usize,
    /// Path that lost the slot; still reachable through the tree walk
    pub evicted: String,
    /// Path that owns the slot
    pub kept: String,
}

/// Outcome of `TreeStore::freeze`
#[derive(Debug, Clone, Default)]
pub struct FreezeReport {
    /// False if the store was already frozen
    pub newly_frozen: bool,
    /// Number of slots in the lookup table (0 without fast lookup)
    pub table_size: usize,
    pub collisions: Vec<SlotCollision>,
}

#[derive(Debug)]
struct FrozenEntry {
    path: String,
    info: FileInfo,
    content: Bytes,
}

#[derive(Debug)]
struct FrozenTable {
    slots: Vec<Option<FrozenEntry>>,
}

impl FrozenTable {
    fn get(&self, path: &str) -> Option<&FrozenEntry> {
        let idx = pearson::slot(path, self.slots.len() - 1);
        self.slots
            .get(idx)
            .and_then(Option::as_ref)
            .filter(|entry| entry.path == path)
    }
}

#[derive(Debug)]
pub(crate) struct TreeInner {
    root: RwLock<Node>,
    frozen: AtomicBool,
    fast_lookup: bool,
    table: OnceLock<FrozenTable>,
    files: AtomicUsize,
}

impl TreeInner {
    fn read_root(&self) -> RwLockReadGuard<'_, Node> {
        self.root.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_root(&self) -> RwLockWriteGuard<'_, Node> {
        self.root.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve `path` to (metadata, content), using the frozen table first
    fn resolve(&self, path: &str) -> Result<(FileInfo, Bytes)> {
        let segments = split_path(path)?;
        let normalized = segments.join("/");

        if let Some(entry) = self.table.get().and_then(|t| t.get(&normalized)) {
            return Ok((entry.info.clone(), entry.content.clone()));
        }

        let root = self.read_root();
        // A file in the middle of the path means the target does not exist.
        let node = walk(&root, &segments).map_err(|e| match e {
            FsError::NotADirectory(_) => FsError::NotFound(normalized.clone()),
            e => e,
        })?;
        Ok((node.info(), node.content()))
    }

    /// Swap in new content for an existing file (write handle commit)
    pub(crate) fn replace_content(&self, path: &str, content: Bytes) -> Result<()> {
        let segments = split_path(path)?;
        let mut root = self.write_root();
        if self.frozen.load(Ordering::Acquire) {
            return Err(FsError::Locked);
        }

        let mut node = &mut *root;
        for segment in &segments {
            node = node.search_mut(segment).ok_or_else(|| {
                FsError::Internal(format!("open write handle lost its file: {}", path))
            })?;
        }
        if node.is_dir() {
            return Err(FsError::Internal(format!(
                "open write handle points at a directory: {}",
                path
            )));
        }

        node.kind = NodeKind::File(content);
        node.mod_time = Utc::now();
        Ok(())
    }
}

/// In-memory hierarchical store. Cloning shares the same tree.
#[derive(Debug, Clone)]
pub struct TreeStore {
    inner: Arc<TreeInner>,
}

impl Default for TreeStore {
    fn default() -> Self {
        Self::new(TreeStoreConfig::default())
    }
}

impl TreeStore {
    pub fn new(config: TreeStoreConfig) -> Self {
        Self {
            inner: Arc::new(TreeInner {
                root: RwLock::new(Node::root()),
                frozen: AtomicBool::new(false),
                fast_lookup: config.fast_lookup,
                table: OnceLock::new(),
                files: AtomicUsize::new(0),
            }),
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::Acquire)
    }

    /// Number of files written so far
    pub fn file_count(&self) -> usize {
        self.inner.files.load(Ordering::Relaxed)
    }

    /// Open a read cursor. `""`, `"."` and `"/"` resolve to the root.
    pub fn open(&self, path: &str) -> Result<TreeFile> {
        let (info, content) = self.inner.resolve(path)?;
        Ok(TreeFile::new(info, content))
    }

    /// Content of the file at `path`. The returned buffer is shared with
    /// the store.
    pub fn read_file(&self, path: &str) -> Result<Bytes> {
        let (info, content) = self.inner.resolve(path)?;
        if info.is_dir {
            return Err(FsError::IsDirectory(path.to_string()));
        }
        Ok(content)
    }

    pub fn stat(&self, path: &str) -> Result<FileInfo> {
        self.inner.resolve(path).map(|(info, _)| info)
    }

    /// Children of the directory at `path`, ascending by name
    pub fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>> {
        let segments = split_path(path)?;
        let root = self.inner.read_root();
        let dir = walk(&root, &segments)?;
        let children = dir
            .children()
            .ok_or_else(|| FsError::NotADirectory(path.to_string()))?;
        Ok(children.iter().map(Node::info).collect())
    }

    /// Create a file at `path`, materializing missing parent directories.
    /// Existing paths are never overwritten.
    pub fn write_file(&self, path: &str, content: impl Into<Bytes>) -> Result<()> {
        let segments = split_write_path(path)?;
        let (name, parents) = segments
            .split_last()
            .ok_or_else(|| FsError::InvalidArgument("cannot write to the root".to_string()))?;

        let mut root = self.inner.write_root();
        if self.inner.frozen.load(Ordering::Acquire) {
            return Err(FsError::Locked);
        }

        let now = Utc::now();
        let mut dir = &mut *root;
        for (i, segment) in parents.iter().enumerate() {
            let prefix = segments[..=i].join("/");
            dir = dir.get_or_create_dir(segment, &prefix, now)?;
        }
        dir.insert(Node::file(name, content.into(), now), &segments.join("/"))?;
        drop(root);

        self.inner.files.fetch_add(1, Ordering::Relaxed);
        debug!(path = %path, "Wrote file");
        Ok(())
    }

    /// Open `path` for writing. Existing files need `TRUNCATE` (and must not
    /// be opened `EXCLUSIVE`); missing files need `CREATE`.
    pub fn open_writer(&self, path: &str, flags: OpenFlags) -> Result<TreeFileWriter> {
        if flags.is_read_only() {
            return Err(FsError::InvalidArgument(
                "open_writer needs the WRITE flag".to_string(),
            ));
        }
        if self.is_frozen() {
            return Err(FsError::Locked);
        }

        let normalized = split_write_path(path)?.join("/");
        match self.stat(&normalized) {
            Ok(info) => {
                if info.is_dir {
                    return Err(FsError::IsDirectory(path.to_string()));
                }
                if flags.contains(OpenFlags::EXCLUSIVE) {
                    return Err(FsError::AlreadyExists(path.to_string()));
                }
                if !flags.contains(OpenFlags::TRUNCATE) {
                    return Err(FsError::InvalidArgument(format!(
                        "existing file {} can only be opened for writing with TRUNCATE",
                        path
                    )));
                }
            }
            Err(FsError::NotFound(_)) => {
                if !flags.contains(OpenFlags::CREATE) {
                    return Err(FsError::NotFound(path.to_string()));
                }
                self.write_file(&normalized, Bytes::new())?;
            }
            Err(e) => return Err(e),
        }

        Ok(TreeFileWriter::new(self.inner.clone(), normalized))
    }

    /// Lock the store from writing. With fast lookup enabled this builds
    /// the frozen table. Freezing twice is a no-op.
    pub fn freeze(&self) -> FreezeReport {
        let root = self.inner.write_root();
        if self.inner.frozen.swap(true, Ordering::AcqRel) {
            return FreezeReport::default();
        }

        let mut report = FreezeReport {
            newly_frozen: true,
            ..FreezeReport::default()
        };

        if self.inner.fast_lookup {
            let mut files = Vec::new();
            root.collect_files("", &mut files);

            let entries = files.len();
            let mut slots: Vec<Option<FrozenEntry>> = (0..=entries).map(|_| None).collect();
            for (path, node) in files {
                let slot = pearson::slot(&path, entries);
                let entry = FrozenEntry {
                    info: node.info(),
                    content: node.content(),
                    path,
                };
                if let Some(previous) = slots[slot].replace(entry) {
                    let kept = slots[slot]
                        .as_ref()
                        .map(|e| e.path.clone())
                        .unwrap_or_default();
                    warn!(
                        slot,
                        evicted = %previous.path,
                        kept = %kept,
                        "Frozen lookup collision, evicted path falls back to tree walk"
                    );
                    report.collisions.push(SlotCollision {
                        slot,
                        evicted: previous.path,
                        kept,
                    });
                }
            }

            report.table_size = slots.len();
            // The frozen flag is set under the write lock, so this runs once.
            let _ = self.inner.table.set(FrozenTable { slots });
        }

        info!(
            files = self.file_count(),
            table_size = report.table_size,
            collisions = report.collisions.len(),
            "Tree store frozen"
        );
        report
    }

    /// Look `path` up in the frozen table only, without the tree-walk
    /// fallback. `None` before freezing, without fast lookup, or when the
    /// path lost its slot to a collision.
    pub fn fast_lookup(&self, path: &str) -> Option<Bytes> {
        let normalized = split_path(path).ok()?.join("/");
        self.inner
            .table
            .get()
            .and_then(|t| t.get(&normalized))
            .map(|entry| entry.content.clone())
    }
}

#[async_trait]
impl Store for TreeStore {
    async fn open(&self, path: &str) -> Result<Box<dyn StoreFile>> {
        Ok(Box::new(TreeStore::open(self, path)?))
    }

    async fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        _options: &OpenOptions,
    ) -> Result<Box<dyn StoreFile>> {
        if flags.is_read_only() {
            return Ok(Box::new(TreeStore::open(self, path)?));
        }
        Ok(Box::new(self.open_writer(path, flags)?))
    }

    async fn read_file(&self, path: &str) -> Result<Bytes> {
        TreeStore::read_file(self, path)
    }

    async fn write_file(&self, path: &str, content: Bytes) -> Result<()> {
        TreeStore::write_file(self, path, content)
    }

    async fn stat(&self, path: &str) -> Result<FileInfo> {
        TreeStore::stat(self, path)
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>> {
        TreeStore::read_dir(self, path)
    }
}

/// Split a lookup path into segments; the root yields no segments
fn split_path(path: &str) -> Result<Vec<&str>> {
    let trimmed = path
        .strip_prefix("./")
        .or_else(|| path.strip_prefix('/'))
        .unwrap_or(path);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() || trimmed == "." {
        return Ok(Vec::new());
    }

    let segments: Vec<&str> = trimmed.split('/').collect();
    if let Some(bad) = segments
        .iter()
        .find(|s| s.is_empty() || **s == "." || **s == "..")
    {
        return Err(FsError::InvalidArgument(format!(
            "path {} contains invalid segment {:?}",
            path, bad
        )));
    }
    Ok(segments)
}

/// Like `split_path`, but rejects the root and directory-style paths
fn split_write_path(path: &str) -> Result<Vec<&str>> {
    if path.ends_with('/') {
        return Err(FsError::InvalidArgument(format!(
            "cannot write a file at directory path {}",
            path
        )));
    }
    let segments = split_path(path)?;
    if segments.is_empty() {
        return Err(FsError::InvalidArgument(format!(
            "cannot write a file at the root ({:?})",
            path
        )));
    }
    Ok(segments)
}

fn walk<'a>(root: &'a Node, segments: &[&str]) -> Result<&'a Node> {
    let mut node = root;
    for (i, segment) in segments.iter().enumerate() {
        if !node.is_dir() {
            return Err(FsError::NotADirectory(segments[..i].join("/")));
        }
        node = node
            .search(segment)
            .ok_or_else(|| FsError::NotFound(segments[..=i].join("/")))?;
    }
    Ok(node)
}
