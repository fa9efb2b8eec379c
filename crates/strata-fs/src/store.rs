//! The store contract every cache tier implements

use crate::error::{FsError, Result};
use crate::types::{FileInfo, OpenFlags, OpenOptions};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite};

/// An open file handle. Read handles reject writes and write handles
/// reject reads; a write handle commits its content on shutdown.
pub trait StoreFile: AsyncRead + AsyncWrite + AsyncSeek + Send + Unpin {}

impl<T> StoreFile for T where T: AsyncRead + AsyncWrite + AsyncSeek + Send + Unpin {}

/// A hierarchical byte store usable as one tier of a cache stack
#[async_trait]
pub trait Store: Send + Sync {
    /// Open `path` for reading
    async fn open(&self, path: &str) -> Result<Box<dyn StoreFile>>;

    /// Open `path` with explicit flags. Empty flags behave like `open`.
    async fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        options: &OpenOptions,
    ) -> Result<Box<dyn StoreFile>>;

    /// Read the whole content of the file at `path`
    async fn read_file(&self, path: &str) -> Result<Bytes>;

    /// Write `content` to `path`. Write-once stores return `AlreadyExists`
    /// when the path is taken.
    async fn write_file(&self, path: &str, content: Bytes) -> Result<()>;

    async fn stat(&self, path: &str) -> Result<FileInfo>;

    /// List a directory, ordered by name
    async fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>>;

    /// Delete the file at `path`
    async fn remove_file(&self, path: &str) -> Result<()> {
        Err(FsError::InvalidArgument(format!(
            "remove is not supported by this store: {}",
            path
        )))
    }
}
