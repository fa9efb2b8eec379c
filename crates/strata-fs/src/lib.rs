//! Store abstraction for layered read-through caches
//!
//! Every cache tier implements [`Store`]: open, read, write, stat and list
//! named byte blobs in a hierarchy. This crate provides the in-memory
//! [`TreeStore`] (the fastest tier, with an optional frozen O(1) lookup
//! table), the OS-backed [`OsStore`], and [`merge`] for copying one store
//! into another.

pub mod error;
pub mod merge;
pub mod os;
pub mod store;
pub mod tree;
pub mod types;

pub use error::{FsError, Result};
pub use merge::{merge, FileTransform, MergeOptions};
pub use os::OsStore;
pub use store::{Store, StoreFile};
pub use tree::{FreezeReport, SlotCollision, TreeFile, TreeFileWriter, TreeStore, TreeStoreConfig};
pub use types::{FileInfo, OpenFlags, OpenOptions, DEFAULT_MODE};
