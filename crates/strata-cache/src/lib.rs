//! Layered read-through caching over [`strata_fs::Store`] tiers
//!
//! [`CacheCoordinator`] composes a fast tier and a backing tier into one
//! store with background backfill on misses. [`DiskCacheTier`] keeps blobs
//! on local disk and forgets entries that have not been touched within a
//! TTL.

mod config;
mod coordinator;
mod disk;

pub use config::{CoordinatorConfig, DiskCacheConfig, EvictionMode, WriteRule};
pub use coordinator::CacheCoordinator;
pub use disk::{flat_name, DiskCacheTier, SLASH_MARKER};
