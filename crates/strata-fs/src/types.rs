//! Metadata and open-option types shared by every store

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single fixed mode reported for in-memory entries
pub const DEFAULT_MODE: u32 = 0o644;

/// Metadata for a file or directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub mod_time: DateTime<Utc>,
    pub is_dir: bool,
    pub mode: u32,
}

bitflags! {
    /// Flags for `Store::open_file`. The empty set opens read-only.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const WRITE = 1 << 0;
        const CREATE = 1 << 1;
        /// Fail with `AlreadyExists` if the file exists (requires `CREATE` on OS stores)
        const EXCLUSIVE = 1 << 2;
        const TRUNCATE = 1 << 3;
    }
}

impl OpenFlags {
    pub fn is_read_only(&self) -> bool {
        !self.contains(OpenFlags::WRITE)
    }
}

/// Implementation-defined options for `Store::open_file`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Permission bits applied when a file is created. Stores without a
    /// permission model ignore this.
    pub mode: u32,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self { mode: DEFAULT_MODE }
    }
}
