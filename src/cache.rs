//! Per-instance score cache.
//!
//! Entries are keyed by `(metric, collection filename, instance id)` and hold
//! one per-instance score dict. A missing entry only means "not computed
//! yet". Implementations must tolerate concurrent readers and concurrent
//! writers on distinct keys.

use crate::error::{Error, Result};
use crate::score::Scores;
use dashmap::DashMap;
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub metric: String,
    pub filename: String,
    pub id: String,
}

impl CacheKey {
    pub fn new(metric: &str, filename: &str, id: &str) -> Self {
        Self {
            metric: metric.to_string(),
            filename: filename.to_string(),
            id: id.to_string(),
        }
    }

    /// Stable file-system name. The readable prefix is sanitized, the hash
    /// keeps keys that sanitize to the same prefix apart.
    pub fn to_file_stem(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        format!(
            "{}_{}_{}_{:016x}",
            sanitize(&self.metric),
            sanitize(&self.filename),
            sanitize(&self.id),
            hasher.finish()
        )
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .take(48)
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

pub trait ScoreCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Scores>;
    fn set(&self, key: CacheKey, value: Scores) -> Result<()>;
    fn contains(&self, key: &CacheKey) -> bool {
        self.get(key).is_some()
    }
}

/// In-memory cache, safe to share across worker threads.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<CacheKey, Scores>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl ScoreCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Scores> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: CacheKey, value: Scores) -> Result<()> {
        self.entries.insert(key, value);
        Ok(())
    }

    fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One JSON file per entry under a cache directory.
pub struct DiskCache {
    cache_dir: PathBuf,
}

impl DiskCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn key_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key.to_file_stem()))
    }

    pub fn clear(&self) -> Result<()> {
        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

impl ScoreCache for DiskCache {
    fn get(&self, key: &CacheKey) -> Option<Scores> {
        let path = self.key_path(key);
        let raw = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(scores) => Some(scores),
            Err(err) => {
                // Unreadable entries count as misses and get recomputed
                tracing::warn!(path = %path.display(), error = %err, "corrupt cache entry");
                None
            }
        }
    }

    fn set(&self, key: CacheKey, value: Scores) -> Result<()> {
        let path = self.key_path(&key);
        // unique per writer, concurrent sets of one key must not share it
        let tmp = path.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let raw = serde_json::to_string(&value)?;
        fs::write(&tmp, raw).map_err(|e| Error::Cache(format!("{}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &path).map_err(|e| Error::Cache(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    fn contains(&self, key: &CacheKey) -> bool {
        self.get(key).is_some()
    }
}
