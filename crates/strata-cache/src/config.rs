//! Configuration for the cache coordinator and the disk tier

use regex::Regex;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use strata_fs::OpenOptions;

const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);
const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_MAX_INFLIGHT_BACKFILLS: usize = 64;

/// What happens to a blob when its index entry expires
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictionMode {
    /// Drop the index entry only; bytes stay on disk
    #[default]
    IndexOnly,
    /// Drop the index entry and delete the backing blob
    DeleteBlobs,
}

impl FromStr for EvictionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "index-only" | "index_only" | "soft" => Ok(EvictionMode::IndexOnly),
            "delete" | "delete-blobs" | "hard" => Ok(EvictionMode::DeleteBlobs),
            other => Err(format!("unknown eviction mode: {}", other)),
        }
    }
}

/// Open options applied by `write_file` to names matching `pattern`.
/// A rule without a pattern matches every name.
#[derive(Debug, Clone)]
pub struct WriteRule {
    pub pattern: Option<Regex>,
    pub options: OpenOptions,
}

impl WriteRule {
    pub fn new(pattern: Regex, options: OpenOptions) -> Self {
        Self {
            pattern: Some(pattern),
            options,
        }
    }

    /// Catch-all rule; place it last
    pub fn fallback(options: OpenOptions) -> Self {
        Self {
            pattern: None,
            options,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.pattern
            .as_ref()
            .map(|pattern| pattern.is_match(name))
            .unwrap_or(true)
    }
}

/// Configuration for `DiskCacheTier`
#[derive(Debug, Clone)]
pub struct DiskCacheConfig {
    /// Directory holding the blobs. `None` creates a `diskcache_` temp
    /// directory that the caller is responsible for removing.
    pub location: Option<PathBuf>,
    /// Entries not touched for this long are evicted
    pub ttl: Duration,
    /// How often the sweep task runs
    pub check_interval: Duration,
    pub eviction: EvictionMode,
    /// Checked in order by `write_file`; first match wins
    pub write_rules: Vec<WriteRule>,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            location: None,
            ttl: DEFAULT_TTL,
            check_interval: DEFAULT_CHECK_INTERVAL,
            eviction: EvictionMode::default(),
            write_rules: Vec::new(),
        }
    }
}

impl DiskCacheConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let location = lookup("DISK_CACHE_DIR").map(PathBuf::from);

        let ttl = lookup("DISK_CACHE_TTL_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.ttl);

        let check_interval = lookup("DISK_CACHE_CHECK_INTERVAL_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.check_interval);

        let eviction = lookup("DISK_CACHE_EVICTION")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.eviction);

        Self {
            location,
            ttl,
            check_interval,
            eviction,
            write_rules: defaults.write_rules,
        }
    }
}

/// Configuration for `CacheCoordinator`
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    /// Backfills allowed to run at once; further misses skip backfilling.
    /// Zero turns backfill off, leaving the cache to be filled by other
    /// writers.
    pub max_inflight_backfills: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_inflight_backfills: DEFAULT_MAX_INFLIGHT_BACKFILLS,
        }
    }
}
