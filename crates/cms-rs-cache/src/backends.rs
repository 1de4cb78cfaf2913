//! Cache backends.
//!
//! - [`InMemoryCache`] - Thread-safe in-memory cache with TTL support
//! - [`FileCache`] - Filesystem cache, shareable between processes on one host
//! - [`DummyCache`] - Stores nothing; every lookup misses
//!
//! Backends are synchronous: rendering is strictly call/return and a cache
//! lookup happens in the middle of it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use cms_rs_core::settings::CacheSettings;
use cms_rs_core::CmsError;

/// A value that can be stored in a cache backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheValue {
    /// Rendered markup.
    String(String),
    /// A content-version counter.
    Integer(i64),
}

impl CacheValue {
    /// Consumes the value, returning the string it holds.
    pub fn into_string(self) -> Option<String> {
        match self {
            Self::String(s) => Some(s),
            Self::Integer(_) => None,
        }
    }
}

/// A backend for storing and retrieving cached values.
///
/// Writers overwrite whole values; readers never observe a partial write.
/// Concurrent writers to one key race and the last one wins.
pub trait CacheBackend: Send + Sync {
    /// Returns `None` if the key does not exist or has expired.
    fn get(&self, key: &str) -> Result<Option<CacheValue>, CmsError>;

    /// Stores a value. `ttl = None` means the entry does not expire.
    fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<(), CmsError>;

    /// Increments an integer value by `delta`, starting from zero when the
    /// key is missing. Fails if the stored value is not an integer.
    fn incr(&self, key: &str, delta: i64) -> Result<i64, CmsError>;
}

/// Builds the backend named by `settings.backend`.
///
/// # Errors
///
/// Returns a configuration error for an unknown backend name, or for the
/// `file` backend without a location.
pub fn backend_from_settings(settings: &CacheSettings) -> Result<Arc<dyn CacheBackend>, CmsError> {
    match settings.backend.as_str() {
        "locmem" | "memory" => Ok(Arc::new(InMemoryCache::new())),
        "file" => {
            if settings.location.trim().is_empty() {
                return Err(CmsError::Configuration(
                    "The file cache backend requires cache.location".to_string(),
                ));
            }
            Ok(Arc::new(FileCache::new(PathBuf::from(&settings.location))))
        }
        "dummy" => Ok(Arc::new(DummyCache)),
        other => Err(CmsError::Configuration(format!(
            "Unknown cache backend: {other}"
        ))),
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CacheValue,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() > exp)
    }
}

/// A thread-safe in-memory cache backend with TTL support.
///
/// Expired entries are purged lazily on the next write.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        self.store
            .read()
            .expect("cache lock poisoned")
            .values()
            .filter(|e| !e.is_expired())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheBackend for InMemoryCache {
    fn get(&self, key: &str) -> Result<Option<CacheValue>, CmsError> {
        let store = self.store.read().expect("cache lock poisoned");
        Ok(store
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone()))
    }

    fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<(), CmsError> {
        let mut store = self.store.write().expect("cache lock poisoned");
        store.retain(|_, entry| !entry.is_expired());
        let expires_at = ttl.map(|d| Instant::now() + d);
        store.insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    fn incr(&self, key: &str, delta: i64) -> Result<i64, CmsError> {
        let mut store = self.store.write().expect("cache lock poisoned");
        let entry = store
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry {
                value: CacheValue::Integer(0),
                expires_at: None,
            });

        if entry.is_expired() {
            *entry = CacheEntry {
                value: CacheValue::Integer(0),
                expires_at: None,
            };
        }

        match &entry.value {
            CacheValue::Integer(current) => {
                let new_value = current + delta;
                entry.value = CacheValue::Integer(new_value);
                Ok(new_value)
            }
            _ => Err(CmsError::CacheBackend(format!(
                "Cache key '{key}' is not an integer"
            ))),
        }
    }
}

/// A filesystem cache backend.
///
/// Each entry is one JSON file named after a hash of its key. Writes go to a
/// temporary file first and are renamed into place, so readers see either
/// the old or the new value, never a torn one.
#[derive(Debug, Clone)]
pub struct FileCache {
    /// The directory where cache files are stored.
    pub dir: PathBuf,
}

impl FileCache {
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        let hash = hasher.finish();
        self.dir.join(format!("{hash:016x}.cache"))
    }
}

#[derive(Serialize, Deserialize)]
struct FileCacheEntry {
    key: String,
    value: CacheValue,
    expires_at_ms: Option<u128>,
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

impl CacheBackend for FileCache {
    fn get(&self, key: &str) -> Result<Option<CacheValue>, CmsError> {
        let path = self.key_path(key);
        match std::fs::read(&path) {
            Ok(data) => {
                let entry: FileCacheEntry = serde_json::from_slice(&data)
                    .map_err(|e| CmsError::CacheBackend(format!("Corrupt cache file: {e}")))?;

                // Hash collision: treat as a miss rather than serve another key's value.
                if entry.key != key {
                    return Ok(None);
                }

                if entry.expires_at_ms.is_some_and(|exp| now_ms() > exp) {
                    let _ = std::fs::remove_file(&path);
                    return Ok(None);
                }

                Ok(Some(entry.value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CmsError::CacheBackend(e.to_string())),
        }
    }

    fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<(), CmsError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| CmsError::CacheBackend(e.to_string()))?;

        let entry = FileCacheEntry {
            key: key.to_string(),
            value,
            expires_at_ms: ttl.map(|d| now_ms() + d.as_millis()),
        };
        let data = serde_json::to_vec(&entry)
            .map_err(|e| CmsError::CacheBackend(e.to_string()))?;

        let path = self.key_path(key);
        let tmp = path.with_extension(format!("tmp{}", std::process::id()));
        std::fs::write(&tmp, &data).map_err(|e| CmsError::CacheBackend(e.to_string()))?;
        std::fs::rename(&tmp, &path).map_err(|e| CmsError::CacheBackend(e.to_string()))?;
        Ok(())
    }

    fn incr(&self, key: &str, delta: i64) -> Result<i64, CmsError> {
        let current = match self.get(key)? {
            None => 0,
            Some(CacheValue::Integer(current)) => current,
            Some(_) => {
                return Err(CmsError::CacheBackend(format!(
                    "Cache key '{key}' is not an integer"
                )))
            }
        };
        let new_value = current + delta;
        self.set(key, CacheValue::Integer(new_value), None)?;
        Ok(new_value)
    }
}

/// A no-op cache backend that never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyCache;

impl CacheBackend for DummyCache {
    fn get(&self, _key: &str) -> Result<Option<CacheValue>, CmsError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: CacheValue, _ttl: Option<Duration>) -> Result<(), CmsError> {
        Ok(())
    }

    fn incr(&self, _key: &str, delta: i64) -> Result<i64, CmsError> {
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── CacheValue ──────────────────────────────────────────────────

    #[test]
    fn test_cache_value_into_string() {
        assert_eq!(
            CacheValue::String("html".into()).into_string().as_deref(),
            Some("html")
        );
        assert_eq!(CacheValue::Integer(3).into_string(), None);
    }

    // ── InMemoryCache ───────────────────────────────────────────────

    #[test]
    fn test_inmemory_get_set() {
        let cache = InMemoryCache::new();
        cache
            .set("page_home", CacheValue::String("<h1>Hi</h1>".into()), None)
            .unwrap();
        assert_eq!(
            cache.get("page_home").unwrap(),
            Some(CacheValue::String("<h1>Hi</h1>".into()))
        );
        assert!(cache.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_inmemory_ttl_expired() {
        let cache = InMemoryCache::new();
        cache
            .set("k", CacheValue::Integer(1), Some(Duration::from_millis(1)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get("k").unwrap().is_none());
    }

    #[test]
    fn test_inmemory_overwrite_is_whole_value() {
        let cache = InMemoryCache::new();
        cache.set("k", CacheValue::String("old".into()), None).unwrap();
        cache.set("k", CacheValue::String("new".into()), None).unwrap();
        assert_eq!(
            cache.get("k").unwrap(),
            Some(CacheValue::String("new".into()))
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_inmemory_incr_from_missing() {
        let cache = InMemoryCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.incr("counter", 1).unwrap(), 1);
        assert_eq!(cache.incr("counter", 5).unwrap(), 6);
    }

    #[test]
    fn test_inmemory_incr_non_integer() {
        let cache = InMemoryCache::new();
        cache.set("k", CacheValue::String("x".into()), None).unwrap();
        assert!(matches!(cache.incr("k", 1), Err(CmsError::CacheBackend(_))));
    }

    // ── FileCache ───────────────────────────────────────────────────

    #[test]
    fn test_file_cache_get_set() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf());
        cache
            .set("partial_menu", CacheValue::String("<ul></ul>".into()), None)
            .unwrap();
        assert_eq!(
            cache.get("partial_menu").unwrap(),
            Some(CacheValue::String("<ul></ul>".into()))
        );
        assert!(cache.get("partial_nav").unwrap().is_none());
    }

    #[test]
    fn test_file_cache_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf());
        cache
            .set("k", CacheValue::Integer(1), Some(Duration::from_millis(1)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get("k").unwrap().is_none());
    }

    #[test]
    fn test_file_cache_corrupt_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf());
        std::fs::write(cache.key_path("k"), b"not json").unwrap();
        assert!(matches!(cache.get("k"), Err(CmsError::CacheBackend(_))));
    }

    #[test]
    fn test_file_cache_incr_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("nested"));
        assert_eq!(cache.incr("n", 2).unwrap(), 2);
        assert_eq!(cache.incr("n", 2).unwrap(), 4);
        assert_eq!(cache.get("n").unwrap(), Some(CacheValue::Integer(4)));
    }

    // ── DummyCache / settings ───────────────────────────────────────

    #[test]
    fn test_dummy_cache_never_stores() {
        let cache = DummyCache;
        cache.set("k", CacheValue::Integer(1), None).unwrap();
        assert!(cache.get("k").unwrap().is_none());
    }

    #[test]
    fn test_backend_from_settings() {
        let mut settings = CacheSettings::default();
        assert!(backend_from_settings(&settings).is_ok());

        settings.backend = "file".to_string();
        assert!(backend_from_settings(&settings).is_err());
        settings.location = "/tmp/cms-cache".to_string();
        assert!(backend_from_settings(&settings).is_ok());

        settings.backend = "memcached".to_string();
        assert!(matches!(
            backend_from_settings(&settings),
            Err(CmsError::Configuration(_))
        ));
    }
}
