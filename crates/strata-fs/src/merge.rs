//! Copy every file of one store into another

use crate::error::{FsError, Result};
use crate::store::Store;
use bytes::Bytes;
use tracing::debug;

/// Receives a file's base name and content, returns the content to write
pub type FileTransform = Box<dyn Fn(&str, Bytes) -> Result<Bytes> + Send + Sync>;

#[derive(Default)]
pub struct MergeOptions {
    /// Applied to every file before it is written to the destination
    pub transform: Option<FileTransform>,
}

impl MergeOptions {
    pub fn with_transform<F>(transform: F) -> Self
    where
        F: Fn(&str, Bytes) -> Result<Bytes> + Send + Sync + 'static,
    {
        Self {
            transform: Some(Box::new(transform)),
        }
    }
}

/// Walk `from` from its root and write each file into `into` at
/// `prepend + relative_path`. `prepend` must end with `/` unless it is empty
/// or `/`. Stops at the first error, leaving a partial copy behind.
/// Returns the number of files written.
pub async fn merge(
    into: &dyn Store,
    from: &dyn Store,
    prepend: &str,
    options: &MergeOptions,
) -> Result<usize> {
    let prefix = normalize_prefix(prepend)?;

    let mut pending = vec![String::new()];
    let mut written = 0;
    while let Some(dir) = pending.pop() {
        let entries = from.read_dir(&dir).await?;
        let mut subdirs = Vec::new();
        for entry in entries {
            let relative = if dir.is_empty() {
                entry.name.clone()
            } else {
                format!("{}/{}", dir, entry.name)
            };

            if entry.is_dir {
                subdirs.push(relative);
                continue;
            }

            let mut content = from.read_file(&relative).await?;
            if let Some(transform) = &options.transform {
                content = transform(&entry.name, content)?;
            }

            let destination = format!("{}{}", prefix, relative);
            into.write_file(&destination, content).await?;
            debug!(from = %relative, to = %destination, "Merged file");
            written += 1;
        }
        // Reversed so the stack pops subdirectories in ascending order.
        pending.extend(subdirs.into_iter().rev());
    }

    Ok(written)
}

fn normalize_prefix(prepend: &str) -> Result<String> {
    if prepend.is_empty() || prepend == "/" {
        return Ok(String::new());
    }
    if !prepend.ends_with('/') {
        return Err(FsError::InvalidArgument(format!(
            "prepend({}) does not end with '/'",
            prepend
        )));
    }
    let trimmed = prepend.strip_prefix('.').unwrap_or(prepend);
    let trimmed = trimmed.strip_prefix('/').unwrap_or(trimmed);
    Ok(trimmed.to_string())
}
