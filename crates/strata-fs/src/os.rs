//! Store backed by the local filesystem

use crate::error::{FsError, Result};
use crate::store::{Store, StoreFile};
use crate::types::{FileInfo, OpenFlags, OpenOptions};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Named blobs under a root directory, accessed through `tokio::fs`
#[derive(Debug, Clone)]
pub struct OsStore {
    root: PathBuf,
}

impl OsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join `name` below the root. Parent components are rejected.
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = name.trim_start_matches('/');
        if relative.split('/').any(|segment| segment == "..") {
            return Err(FsError::InvalidArgument(format!(
                "path {} escapes the store root",
                name
            )));
        }
        if relative.is_empty() || relative == "." {
            return Ok(self.root.clone());
        }
        Ok(self.root.join(relative))
    }
}

fn file_info(name: &str, metadata: &Metadata) -> FileInfo {
    let mod_time = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    FileInfo {
        name: name.to_string(),
        size: metadata.len(),
        mod_time,
        is_dir: metadata.is_dir(),
        mode: mode_bits(metadata),
    }
}

#[cfg(unix)]
fn mode_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn mode_bits(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        crate::types::DEFAULT_MODE
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string())
}

#[async_trait]
impl Store for OsStore {
    async fn open(&self, path: &str) -> Result<Box<dyn StoreFile>> {
        let file = fs::File::open(self.resolve(path)?)
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        Ok(Box::new(file))
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

        let full = self.resolve(path)?;
        let mut opts = fs::OpenOptions::new();
        opts.write(true);
        if flags.contains(OpenFlags::EXCLUSIVE) {
            opts.create_new(true);
        } else if flags.contains(OpenFlags::CREATE) {
            opts.create(true);
        }
        if flags.contains(OpenFlags::TRUNCATE) {
            opts.truncate(true);
        }
        #[cfg(unix)]
        opts.mode(options.mode);

        debug!(path = ?full, mode = options.mode, "Opening file for write");
        let file = opts
            .open(&full)
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        Ok(Box::new(file))
    }

    async fn read_file(&self, path: &str) -> Result<Bytes> {
        let full = self.resolve(path)?;
        match fs::read(&full).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) => {
                if fs::metadata(&full).await.map(|m| m.is_dir()).unwrap_or(false) {
                    return Err(FsError::IsDirectory(path.to_string()));
                }
                Err(FsError::from_io(e, path))
            }
        }
    }

    /// Creates or truncates the blob; parent directories must exist
    async fn write_file(&self, path: &str, content: Bytes) -> Result<()> {
        let full = self.resolve(path)?;
        fs::write(&full, &content)
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<FileInfo> {
        let full = self.resolve(path)?;
        let metadata = fs::metadata(&full)
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        Ok(file_info(&base_name(&full), &metadata))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>> {
        let full = self.resolve(path)?;
        let metadata = fs::metadata(&full)
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        if !metadata.is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }

        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&full)
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(file_info(&name, &metadata));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        fs::remove_file(self.resolve(path)?)
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        Ok(())
    }
}
