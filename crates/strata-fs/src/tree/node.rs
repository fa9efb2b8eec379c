//! Tree nodes. Directory children stay sorted by name.

use crate::error::{FsError, Result};
use crate::types::{FileInfo, DEFAULT_MODE};
use bytes::Bytes;
use chrono::{DateTime, Utc};

#[derive(Debug)]
pub(crate) enum NodeKind {
    File(Bytes),
    Dir(Vec<Node>),
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) mod_time: DateTime<Utc>,
    pub(crate) kind: NodeKind,
}

impl Node {
    pub(crate) fn root() -> Self {
        Self::dir(".", Utc::now())
    }

    pub(crate) fn dir(name: &str, mod_time: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            mod_time,
            kind: NodeKind::Dir(Vec::new()),
        }
    }

    pub(crate) fn file(name: &str, content: Bytes, mod_time: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            mod_time,
            kind: NodeKind::File(content),
        }
    }

    pub(crate) fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir(_))
    }

    /// File content, empty for directories
    pub(crate) fn content(&self) -> Bytes {
        match &self.kind {
            NodeKind::File(content) => content.clone(),
            NodeKind::Dir(_) => Bytes::new(),
        }
    }

    pub(crate) fn children(&self) -> Option<&[Node]> {
        match &self.kind {
            NodeKind::Dir(children) => Some(children),
            NodeKind::File(_) => None,
        }
    }

    pub(crate) fn info(&self) -> FileInfo {
        let size = match &self.kind {
            NodeKind::File(content) => content.len() as u64,
            NodeKind::Dir(_) => 0,
        };
        FileInfo {
            name: self.name.clone(),
            size,
            mod_time: self.mod_time,
            is_dir: self.is_dir(),
            mode: DEFAULT_MODE,
        }
    }

    /// Binary search among children. `None` if absent or if this is a file.
    pub(crate) fn search(&self, name: &str) -> Option<&Node> {
        let children = self.children()?;
        children
            .binary_search_by(|child| child.name.as_str().cmp(name))
            .ok()
            .map(|idx| &children[idx])
    }

    pub(crate) fn search_mut(&mut self, name: &str) -> Option<&mut Node> {
        let children = match &mut self.kind {
            NodeKind::Dir(children) => children,
            NodeKind::File(_) => return None,
        };
        match children.binary_search_by(|child| child.name.as_str().cmp(name)) {
            Ok(idx) => Some(&mut children[idx]),
            Err(_) => None,
        }
    }

    /// Return the child directory `name`, creating it if missing
    pub(crate) fn get_or_create_dir(
        &mut self,
        name: &str,
        path: &str,
        now: DateTime<Utc>,
    ) -> Result<&mut Node> {
        let children = match &mut self.kind {
            NodeKind::Dir(children) => children,
            NodeKind::File(_) => return Err(FsError::NotADirectory(path.to_string())),
        };

        let idx = match children.binary_search_by(|child| child.name.as_str().cmp(name)) {
            Ok(idx) if children[idx].is_dir() => idx,
            Ok(_) => return Err(FsError::NotADirectory(path.to_string())),
            Err(idx) => {
                children.insert(idx, Node::dir(name, now));
                idx
            }
        };
        Ok(&mut children[idx])
    }

    /// Insert `node` at its sorted position
    pub(crate) fn insert(&mut self, node: Node, path: &str) -> Result<()> {
        let children = match &mut self.kind {
            NodeKind::Dir(children) => children,
            NodeKind::File(_) => {
                return Err(FsError::Internal(format!(
                    "cannot add {} to a non-directory",
                    path
                )))
            }
        };

        match children.binary_search_by(|child| child.name.as_str().cmp(&node.name)) {
            Ok(_) => Err(FsError::AlreadyExists(path.to_string())),
            Err(idx) => {
                children.insert(idx, node);
                Ok(())
            }
        }
    }

    /// Every file below this node as (path relative to the root, node)
    pub(crate) fn collect_files<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a Node)>) {
        if let Some(children) = self.children() {
            for child in children {
                let path = if prefix.is_empty() {
                    child.name.clone()
                } else {
                    format!("{}/{}", prefix, child.name)
                };
                if child.is_dir() {
                    child.collect_files(&path, out);
                } else {
                    out.push((path, child));
                }
            }
        }
    }
}
