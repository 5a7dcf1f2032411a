//! Result cache: maps a fingerprint to a previously computed model result.
//!
//! One blob per fingerprint. Reads never fail the caller: anything unreadable,
//! stale or mismatched is a miss and gets logged.

pub mod fingerprint;
pub mod handlers;

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::storage::{BlobStore, StorageError};

pub use fingerprint::{fingerprint, normalize_text, FingerprintInput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub fingerprint: String,
    pub result: T,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum CacheReadError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("undecodable cache entry: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("entry was written for fingerprint {found}")]
    FingerprintMismatch { found: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub fresh_entries: usize,
    pub stale_entries: usize,
    pub corrupt_entries: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
}

pub struct ResultCache<T> {
    store: Arc<dyn BlobStore>,
    ttl: Option<Duration>,
    _result: PhantomData<fn() -> T>,
}

impl<T> Clone for ResultCache<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ttl: self.ttl,
            _result: PhantomData,
        }
    }
}

impl<T> ResultCache<T>
where
    T: Serialize + DeserializeOwned + PartialEq,
{
    /// `ttl = None` keeps entries until purged.
    pub fn new(store: Arc<dyn BlobStore>, ttl: Option<Duration>) -> Self {
        Self {
            store,
            ttl,
            _result: PhantomData,
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn get(&self, fingerprint: &str) -> Option<CacheEntry<T>> {
        match self.read(fingerprint) {
            Ok(Some(entry)) if self.is_stale(&entry, Utc::now()) => {
                debug!(fingerprint, "Cache entry is stale, treating as miss");
                None
            }
            Ok(entry) => entry,
            Err(e) => {
                warn!(fingerprint, "Cache read failed, treating as miss: {e}");
                None
            }
        }
    }

    /// Stores `result`. A fresh entry holding an equal result is left untouched.
    pub fn put(&self, fingerprint: &str, result: T) -> Result<CacheEntry<T>, StorageError> {
        if let Some(existing) = self.get(fingerprint) {
            if existing.result == result {
                debug!(fingerprint, "Cache already holds this result");
                return Ok(existing);
            }
        }

        let entry = CacheEntry {
            fingerprint: fingerprint.to_string(),
            result,
            created_at: Utc::now(),
        };
        let bytes = serde_json::to_vec_pretty(&entry).map_err(|e| StorageError::Corrupt {
            key: fingerprint.to_string(),
            reason: e.to_string(),
        })?;
        self.store.put(fingerprint, &bytes)?;
        debug!(fingerprint, "Cache entry written");
        Ok(entry)
    }

    /// Deletes entries older than `age`, plus any that can no longer be read.
    pub fn purge_older_than(&self, age: Duration) -> Result<usize, StorageError> {
        let cutoff = Utc::now() - age;
        let mut removed = 0;
        for key in self.store.keys()? {
            let expired = match self.read(&key) {
                Ok(Some(entry)) => entry.created_at < cutoff,
                Ok(None) => false,
                Err(e) => {
                    warn!(fingerprint = %key, "Purging unreadable cache entry: {e}");
                    true
                }
            };
            if expired && self.store.delete(&key)? {
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Purged {removed} cache entries");
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<usize, StorageError> {
        let mut removed = 0;
        for key in self.store.keys()? {
            if self.store.delete(&key)? {
                removed += 1;
            }
        }
        info!("Cleared {removed} cache entries");
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CacheStats, StorageError> {
        let now = Utc::now();
        let mut stats = CacheStats::default();
        for key in self.store.keys()? {
            stats.total_entries += 1;
            match self.read(&key) {
                Ok(Some(entry)) => {
                    if self.is_stale(&entry, now) {
                        stats.stale_entries += 1;
                    } else {
                        stats.fresh_entries += 1;
                    }
                    stats.oldest_entry = Some(match stats.oldest_entry {
                        Some(t) if t <= entry.created_at => t,
                        _ => entry.created_at,
                    });
                }
                Ok(None) => {}
                Err(_) => stats.corrupt_entries += 1,
            }
        }
        Ok(stats)
    }

    fn read(&self, fingerprint: &str) -> Result<Option<CacheEntry<T>>, CacheReadError> {
        let Some(bytes) = self.store.get(fingerprint)? else {
            return Ok(None);
        };
        let entry: CacheEntry<T> = serde_json::from_slice(&bytes)?;
        if entry.fingerprint != fingerprint {
            return Err(CacheReadError::FingerprintMismatch {
                found: entry.fingerprint,
            });
        }
        Ok(Some(entry))
    }

    fn is_stale(&self, entry: &CacheEntry<T>, now: DateTime<Utc>) -> bool {
        self.ttl
            .map(|ttl| now - entry.created_at > ttl)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStore, MemoryStore};
    use tempfile::tempdir;

    type TestCache = ResultCache<Vec<String>>;

    fn memory_cache(ttl: Option<Duration>) -> (Arc<MemoryStore>, TestCache) {
        let store = Arc::new(MemoryStore::new());
        let cache = ResultCache::new(store.clone() as Arc<dyn BlobStore>, ttl);
        (store, cache)
    }

    fn result(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn write_raw(store: &MemoryStore, key: &str, created_at: DateTime<Utc>) {
        let entry = CacheEntry {
            fingerprint: key.to_string(),
            result: result(&["old"]),
            created_at,
        };
        store
            .put(key, &serde_json::to_vec(&entry).unwrap())
            .unwrap();
    }

    #[test]
    fn test_get_after_put_returns_result() {
        let (_, cache) = memory_cache(None);
        cache.put("fp1", result(&["Acme", "Globex"])).unwrap();
        let entry = cache.get("fp1").unwrap();
        assert_eq!(entry.result, result(&["Acme", "Globex"]));
        assert_eq!(entry.fingerprint, "fp1");
    }

    #[test]
    fn test_put_twice_is_idempotent() {
        let (_, cache) = memory_cache(None);
        let first = cache.put("fp1", result(&["Acme"])).unwrap();
        let second = cache.put("fp1", result(&["Acme"])).unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(cache.get("fp1").unwrap().result, result(&["Acme"]));
    }

    #[test]
    fn test_put_different_result_replaces() {
        let (_, cache) = memory_cache(None);
        cache.put("fp1", result(&["Acme"])).unwrap();
        cache.put("fp1", result(&["Globex"])).unwrap();
        assert_eq!(cache.get("fp1").unwrap().result, result(&["Globex"]));
    }

    #[test]
    fn test_missing_entry_is_miss() {
        let (_, cache) = memory_cache(None);
        assert!(cache.get("nope").is_none());
    }

    #[test]
    fn test_corrupt_entry_is_miss() {
        let (store, cache) = memory_cache(None);
        store.put("fp1", b"{ not json").unwrap();
        assert!(cache.get("fp1").is_none());
    }

    #[test]
    fn test_mismatched_fingerprint_is_miss() {
        let (store, cache) = memory_cache(None);
        write_raw(&store, "fp-other", Utc::now());
        let bytes = store.get("fp-other").unwrap().unwrap();
        store.put("fp1", &bytes).unwrap();
        assert!(cache.get("fp1").is_none());
        assert!(cache.get("fp-other").is_some());
    }

    #[test]
    fn test_stale_entry_is_miss() {
        let (store, cache) = memory_cache(Some(Duration::hours(1)));
        write_raw(&store, "old", Utc::now() - Duration::hours(2));
        write_raw(&store, "new", Utc::now());
        assert!(cache.get("old").is_none());
        assert!(cache.get("new").is_some());
    }

    #[test]
    fn test_purge_older_than_removes_old_and_corrupt() {
        let (store, cache) = memory_cache(None);
        write_raw(&store, "old", Utc::now() - Duration::days(3));
        write_raw(&store, "new", Utc::now());
        store.put("broken", b"garbage").unwrap();

        let removed = cache.purge_older_than(Duration::days(1)).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.keys().unwrap(), vec!["new".to_string()]);
    }

    #[test]
    fn test_stats_counts_entries() {
        let (store, cache) = memory_cache(Some(Duration::hours(1)));
        let old = Utc::now() - Duration::hours(5);
        write_raw(&store, "old", old);
        write_raw(&store, "new", Utc::now());
        store.put("broken", b"garbage").unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.fresh_entries, 1);
        assert_eq!(stats.stale_entries, 1);
        assert_eq!(stats.corrupt_entries, 1);
        assert_eq!(stats.oldest_entry, Some(old));
    }

    #[test]
    fn test_clear_removes_everything() {
        let (store, cache) = memory_cache(None);
        cache.put("a", result(&["x"])).unwrap();
        cache.put("b", result(&["y"])).unwrap();
        assert_eq!(cache.clear().unwrap(), 2);
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_file_backed_cache_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = Arc::new(FileStore::open(dir.path()).unwrap());
            let cache: TestCache = ResultCache::new(store, None);
            cache.put("fp1", result(&["Acme"])).unwrap();
        }
        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let cache: TestCache = ResultCache::new(store, None);
        assert_eq!(cache.get("fp1").unwrap().result, result(&["Acme"]));
    }
}
