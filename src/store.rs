//! Persistent HTTP response cache.
//!
//! [`CacheStore`] is a durable, thread-safe key→entry store of prior HTTP
//! responses, bounded by an optional TTL and an optional maximum entry count.
//! One logical table, one row per key: the serialized response text, the HTTP
//! status observed at write time, and a unix-epoch timestamp.
//!
//! # On-disk format
//!
//! A single versioned JSON document, written atomically (tmp file + rename):
//!
//! ```json
//! { "version": 1, "entries": { "<key>": { "response": "...", "status": 200, "timestamp": 1.7e9 } } }
//! ```
//!
//! A corrupt or unreadable file degrades to an empty store with a warning —
//! cache loss is always preferable to failing the ingestion pipeline.
//!
//! # Concurrency
//!
//! Every operation takes a single coarse lock around its read-modify-write
//! sequence, so callers never observe a partially-written entry and
//! interleaved writers are last-writer-wins per key. This is deliberate: the
//! expected scale is a local developer-run cache, not a shared service.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{HuginnError, Result};
use crate::telemetry;

/// Current on-disk format version.
const CACHE_FORMAT_VERSION: u32 = 1;

/// Wall-clock time as unix epoch seconds.
pub(crate) fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Configuration for a [`CacheStore`].
///
/// ```rust
/// # use huginn::StoreConfig;
/// # use std::time::Duration;
/// let config = StoreConfig::new()
///     .ttl(Duration::from_secs(24 * 3600))
///     .max_entries(10_000);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Entries older than this are logically absent and purged on the next
    /// read or write. `None` disables TTL eviction.
    pub ttl: Option<Duration>,
    /// Maximum entry count after any write completes; the oldest entries (by
    /// write timestamp, not access recency) are evicted first. `None`
    /// disables size eviction.
    pub max_entries: Option<usize>,
}

impl StoreConfig {
    /// Create a config with no TTL and no size bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the time-to-live for entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set the maximum number of entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = Some(n);
        self
    }
}

/// One stored row: serialized response text, status, write timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    response: String,
    status: u16,
    timestamp: f64,
}

/// Versioned on-disk payload wrapper.
#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: HashMap<String, StoredEntry>,
}

/// A cache read result: the parsed response body plus stored metadata.
///
/// `response` is the JSON value stored at write time; stored text that fails
/// JSON parsing degrades to `Value::String(raw)` rather than failing the read.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub response: Value,
    pub status: u16,
    pub timestamp: f64,
}

/// Key metadata returned by [`CacheStore::list()`].
#[derive(Debug, Clone, PartialEq)]
pub struct KeySummary {
    pub key: String,
    pub status: u16,
    pub timestamp: f64,
}

/// Aggregate statistics over current (non-evicted) entries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub count: usize,
    pub oldest: Option<f64>,
    pub newest: Option<f64>,
}

#[derive(Debug)]
struct StoreInner {
    entries: HashMap<String, StoredEntry>,
    path: Option<PathBuf>,
    closed: bool,
}

/// Durable, thread-safe store of HTTP response records.
///
/// Created once per process (or test), bound to a file path via
/// [`open()`](Self::open) or ephemeral via [`in_memory()`](Self::in_memory),
/// and explicitly closed by its owner. All operations take `&self`; the store
/// owns its own lock.
#[derive(Debug)]
pub struct CacheStore {
    inner: Mutex<StoreInner>,
    ttl: Option<f64>,
    max_entries: Option<usize>,
}

impl CacheStore {
    /// Open (or create) a store backed by `path`.
    ///
    /// A missing file starts empty; a corrupt file is discarded with a
    /// warning and also starts empty. Returns an error only when the file
    /// exists but cannot be read at all.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<CacheFile>(&content) {
                Ok(file) if file.version <= CACHE_FORMAT_VERSION => file.entries,
                Ok(file) => {
                    warn!(
                        path = %path.display(),
                        version = file.version,
                        "cache file from a newer format, starting empty"
                    );
                    HashMap::new()
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt cache file, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(HuginnError::Io(e)),
        };
        Ok(Self {
            inner: Mutex::new(StoreInner {
                entries,
                path: Some(path),
                closed: false,
            }),
            ttl: config.ttl.map(|d| d.as_secs_f64()),
            max_entries: config.max_entries,
        })
    }

    /// Open a store at the default location
    /// (`~/.cache/huginn/http_cache.json`).
    pub fn open_default(config: StoreConfig) -> Result<Self> {
        Self::open(Self::default_path(), config)
    }

    /// Create an ephemeral store that never touches disk.
    pub fn in_memory(config: StoreConfig) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                entries: HashMap::new(),
                path: None,
                closed: false,
            }),
            ttl: config.ttl.map(|d| d.as_secs_f64()),
            max_entries: config.max_entries,
        }
    }

    /// Default on-disk location: `~/.cache/huginn/http_cache.json`.
    pub fn default_path() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("huginn")
            .join("http_cache.json")
    }

    /// Look up `key`.
    ///
    /// Returns `None` when the entry is missing, the store is closed, or the
    /// entry has exceeded the configured TTL — expired entries are deleted as
    /// a side effect. Stored payloads that fail JSON parsing degrade to the
    /// raw text rather than failing the read.
    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut inner = self.lock();
        if inner.closed {
            return None;
        }
        let timestamp = inner.entries.get(key)?.timestamp;
        if self.expired(timestamp) {
            inner.entries.remove(key);
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "ttl").increment(1);
            if let Err(e) = flush(&inner) {
                warn!(key, error = %e, "failed to persist expired-entry removal");
            }
            return None;
        }
        inner.entries.get(key).map(decode)
    }

    /// Upsert `key` with the current timestamp, then run one atomic
    /// maintenance pass (TTL sweep, then size eviction) and persist.
    ///
    /// A value that cannot be serialized degrades to its string form rather
    /// than failing the write. Only a persistence I/O failure is an error.
    pub fn set(&self, key: &str, response: &Value, status: u16) -> Result<()> {
        let payload =
            serde_json::to_string(response).unwrap_or_else(|_| response.to_string());
        let mut inner = self.lock();
        if inner.closed {
            return Err(HuginnError::Store("store is closed".into()));
        }
        inner.entries.insert(
            key.to_string(),
            StoredEntry {
                response: payload,
                status,
                timestamp: now_epoch(),
            },
        );
        self.prune(&mut inner);
        flush(&inner)
    }

    /// Delete `key`. Returns 1 if an entry was removed, 0 otherwise.
    pub fn delete(&self, key: &str) -> usize {
        let mut inner = self.lock();
        if inner.closed || inner.entries.remove(key).is_none() {
            return 0;
        }
        if let Err(e) = flush(&inner) {
            warn!(key, error = %e, "failed to persist deletion");
        }
        1
    }

    /// Remove all entries unconditionally.
    pub fn clear(&self) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.entries.clear();
        if let Err(e) = flush(&inner) {
            warn!(error = %e, "failed to persist clear");
        }
    }

    /// List key metadata, newest first, bounded by `limit`.
    pub fn list(&self, limit: usize) -> Vec<KeySummary> {
        let inner = self.lock();
        let mut items: Vec<KeySummary> = inner
            .entries
            .iter()
            .map(|(key, entry)| KeySummary {
                key: key.clone(),
                status: entry.status,
                timestamp: entry.timestamp,
            })
            .collect();
        items.sort_by(|a, b| {
            b.timestamp
                .partial_cmp(&a.timestamp)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        items.truncate(limit);
        items
    }

    /// Aggregate statistics over current entries.
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let mut oldest: Option<f64> = None;
        let mut newest: Option<f64> = None;
        for entry in inner.entries.values() {
            oldest = Some(oldest.map_or(entry.timestamp, |o: f64| o.min(entry.timestamp)));
            newest = Some(newest.map_or(entry.timestamp, |n: f64| n.max(entry.timestamp)));
        }
        CacheStats {
            count: inner.entries.len(),
            oldest,
            newest,
        }
    }

    /// Flush and release the store.
    ///
    /// Idempotent and safe under concurrent use: the lock is held for the
    /// whole flush, so in-flight operations complete first. Operations on a
    /// closed store behave as absent/no-op.
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        if let Err(e) = flush(&inner) {
            warn!(error = %e, "failed to flush cache on close");
        }
        inner.closed = true;
        debug!("cache store closed");
    }

    fn expired(&self, timestamp: f64) -> bool {
        match self.ttl {
            Some(ttl) => now_epoch() - timestamp > ttl,
            None => false,
        }
    }

    /// TTL sweep, then size eviction (oldest write timestamp first). Runs
    /// under the caller's lock so the pass is atomic with the triggering
    /// write.
    fn prune(&self, inner: &mut StoreInner) {
        if let Some(ttl) = self.ttl {
            let cutoff = now_epoch() - ttl;
            let before = inner.entries.len();
            inner.entries.retain(|_, entry| entry.timestamp >= cutoff);
            let swept = before - inner.entries.len();
            if swept > 0 {
                metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "ttl")
                    .increment(swept as u64);
            }
        }
        if let Some(max) = self.max_entries {
            if inner.entries.len() > max {
                let mut by_age: Vec<(String, f64)> = inner
                    .entries
                    .iter()
                    .map(|(key, entry)| (key.clone(), entry.timestamp))
                    .collect();
                by_age.sort_by(|a, b| {
                    a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)
                });
                let excess = inner.entries.len() - max;
                for (key, _) in by_age.into_iter().take(excess) {
                    inner.entries.remove(&key);
                }
                metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "size")
                    .increment(excess as u64);
            }
        }
    }

    /// The store must stay usable even if a writer panicked mid-operation.
    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for CacheStore {
    fn drop(&mut self) {
        self.close();
    }
}

fn decode(entry: &StoredEntry) -> CachedResponse {
    let response = serde_json::from_str(&entry.response)
        .unwrap_or_else(|_| Value::String(entry.response.clone()));
    CachedResponse {
        response,
        status: entry.status,
        timestamp: entry.timestamp,
    }
}

/// Atomic write via tmp + rename, matching the read format in [`CacheStore::open`].
fn flush(inner: &StoreInner) -> Result<()> {
    let Some(path) = &inner.path else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = CacheFile {
        version: CACHE_FORMAT_VERSION,
        entries: inner.entries.clone(),
    };
    let json = serde_json::to_string(&file)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_falls_back_to_raw_text() {
        let entry = StoredEntry {
            response: "not valid json {".into(),
            status: 200,
            timestamp: 1.0,
        };
        assert_eq!(decode(&entry).response, Value::String("not valid json {".into()));
    }

    #[test]
    fn decode_parses_stored_json() {
        let entry = StoredEntry {
            response: r#"{"a": 1}"#.into(),
            status: 200,
            timestamp: 1.0,
        };
        assert_eq!(decode(&entry).response, json!({"a": 1}));
    }

    #[test]
    fn upsert_replaces_same_key() {
        let store = CacheStore::in_memory(StoreConfig::new());
        store.set("k", &json!(1), 200).unwrap();
        store.set("k", &json!(2), 200).unwrap();
        assert_eq!(store.stats().count, 1);
        assert_eq!(store.get("k").unwrap().response, json!(2));
    }

    #[test]
    fn size_eviction_is_oldest_first() {
        let store = CacheStore::in_memory(StoreConfig::new().max_entries(2));
        store.set("a", &json!("a"), 200).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        store.set("b", &json!("b"), 200).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        store.set("c", &json!("c"), 200).unwrap();
        assert_eq!(store.stats().count, 2);
        assert!(store.get("a").is_none());
        assert!(store.get("b").is_some());
        assert!(store.get("c").is_some());
    }

    #[test]
    fn closed_store_reads_as_absent() {
        let store = CacheStore::in_memory(StoreConfig::new());
        store.set("k", &json!(1), 200).unwrap();
        store.close();
        store.close(); // idempotent
        assert!(store.get("k").is_none());
        assert!(store.set("k", &json!(2), 200).is_err());
        assert_eq!(store.delete("k"), 0);
    }

    #[test]
    fn stats_on_empty_store() {
        let store = CacheStore::in_memory(StoreConfig::new());
        let stats = store.stats();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.oldest, None);
        assert_eq!(stats.newest, None);
    }
}
