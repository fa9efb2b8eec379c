//! Read cursors and buffered write handles over tree nodes

use super::TreeInner;
use crate::error::FsError;
use crate::types::FileInfo;
use bytes::Bytes;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};

/// A read cursor with its own offset. The content buffer is shared with
/// the store, not copied.
#[derive(Debug, Clone)]
pub struct TreeFile {
    info: FileInfo,
    content: Bytes,
    pos: u64,
}

impl TreeFile {
    pub(crate) fn new(info: FileInfo, content: Bytes) -> Self {
        Self {
            info,
            content,
            pos: 0,
        }
    }

    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl AsyncRead for TreeFile {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.info.is_dir {
            return Poll::Ready(Err(FsError::IsDirectory(self.info.name.clone()).into()));
        }

        let len = self.content.len();
        let start = usize::try_from(self.pos).unwrap_or(usize::MAX);
        if start >= len {
            return Poll::Ready(Ok(()));
        }

        let n = buf.remaining().min(len - start);
        buf.put_slice(&self.content[start..start + n]);
        self.pos += n as u64;
        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for TreeFile {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let (base, offset) = match position {
            SeekFrom::Start(offset) => {
                self.pos = offset;
                return Ok(());
            }
            SeekFrom::Current(offset) => (self.pos as i64, offset),
            SeekFrom::End(offset) => (self.content.len() as i64, offset),
        };

        let target = base
            .checked_add(offset)
            .filter(|target| *target >= 0)
            .ok_or_else(|| {
                io::Error::from(FsError::InvalidArgument(
                    "cannot seek before the start of the file".to_string(),
                ))
            })?;
        self.pos = target as u64;
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.pos))
    }
}

impl AsyncWrite for TreeFile {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(FsError::InvalidArgument(format!(
            "{} was opened read-only",
            self.info.name
        ))
        .into()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Buffers written bytes; shutting the handle down replaces the node's
/// content with the buffer in one step.
#[derive(Debug)]
pub struct TreeFileWriter {
    inner: Arc<TreeInner>,
    path: String,
    buf: Vec<u8>,
    committed: bool,
}

impl TreeFileWriter {
    pub(crate) fn new(inner: Arc<TreeInner>, path: String) -> Self {
        Self {
            inner,
            path,
            buf: Vec::new(),
            committed: false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn commit(&mut self) -> io::Result<()> {
        if self.committed {
            return Ok(());
        }
        let content = Bytes::from(std::mem::take(&mut self.buf));
        self.inner.replace_content(&self.path, content)?;
        self.committed = true;
        Ok(())
    }
}

impl AsyncWrite for TreeFileWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.committed {
            return Poll::Ready(Err(FsError::InvalidArgument(format!(
                "{} was already committed",
                self.path
            ))
            .into()));
        }
        self.buf.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(self.commit())
    }
}

impl AsyncRead for TreeFileWriter {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(FsError::InvalidArgument(format!(
            "{} was opened write-only",
            self.path
        ))
        .into()))
    }
}

impl AsyncSeek for TreeFileWriter {
    fn start_seek(self: Pin<&mut Self>, _position: SeekFrom) -> io::Result<()> {
        Err(FsError::InvalidArgument(format!("{} does not support seeking", self.path)).into())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.buf.len() as u64))
    }
}
