//! Content-version tags.
//!
//! A tag (for example `cms` or `catalog`) maps to a counter that only ever
//! grows. Cache keys embed the current value of every tag they depend on, so
//! bumping a tag makes all dependent keys unreachable without scanning the
//! store.
//!
//! Counters live in a [`CacheBackend`] under `cms_version:<tag>`. Built from
//! the cache settings, they sit in the same store as the entries they guard,
//! so a file cache shared by several processes (or reused after a restart)
//! sees one set of counters.

use std::sync::Arc;

use cms_rs_core::settings::CacheSettings;
use cms_rs_core::CmsError;

use crate::backends::{backend_from_settings, CacheBackend, CacheValue, InMemoryCache};

/// The tag bumped by every CMS content mutation.
pub const CMS_CONTENT_TAG: &str = "cms";

const COUNTER_PREFIX: &str = "cms_version:";

/// Application-scoped registry of content-version counters.
///
/// # Examples
///
/// ```
/// use cms_rs_cache::ContentVersions;
///
/// let versions = ContentVersions::new();
/// assert_eq!(versions.current("catalog"), 0);
/// versions.bump("catalog");
/// assert_eq!(versions.current("catalog"), 1);
/// ```
#[derive(Clone)]
pub struct ContentVersions {
    store: Arc<dyn CacheBackend>,
}

impl std::fmt::Debug for ContentVersions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentVersions").finish_non_exhaustive()
    }
}

impl Default for ContentVersions {
    fn default() -> Self {
        Self::with_backend(Arc::new(InMemoryCache::new()))
    }
}

impl ContentVersions {
    /// Counters private to this process.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(store: Arc<dyn CacheBackend>) -> Self {
        Self { store }
    }

    /// Counters kept in the backend the cache settings describe.
    ///
    /// # Errors
    ///
    /// A configuration error if the backend cannot be built.
    pub fn from_settings(settings: &CacheSettings) -> Result<Self, CmsError> {
        Ok(Self::with_backend(backend_from_settings(settings)?))
    }

    /// The current value of `tag`; tags that were never bumped are at zero.
    /// A failed read also reports zero.
    pub fn current(&self, tag: &str) -> u64 {
        self.read(tag).unwrap_or_else(|e| {
            tracing::warn!(tag, error = %e, "content version read failed");
            0
        })
    }

    /// Increments `tag` and returns the new value, or `None` if the backend
    /// rejected the write.
    ///
    /// Concurrent bumps from separate processes may collapse into one step.
    /// The counter still moves, so dependent keys are invalidated either way.
    pub fn bump(&self, tag: &str) -> Option<u64> {
        match self.store.incr(&counter_key(tag), 1) {
            Ok(version) => {
                let version = u64::try_from(version).unwrap_or_default();
                tracing::debug!(tag, version, "content version bumped");
                Some(version)
            }
            Err(e) => {
                tracing::warn!(tag, error = %e, "content version bump failed");
                None
            }
        }
    }

    /// Builds the version stamp for a set of tags: sorted, deduplicated,
    /// `tag:version` pairs joined by `.`.
    ///
    /// # Errors
    ///
    /// The backend error if any counter cannot be read.
    pub fn stamp(&self, tags: &[String]) -> Result<String, CmsError> {
        let mut tags: Vec<&str> = tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        tags.sort_unstable();
        tags.dedup();

        let mut parts = Vec::with_capacity(tags.len());
        for tag in tags {
            parts.push(format!("{tag}:{}", self.read(tag)?));
        }
        Ok(parts.join("."))
    }

    fn read(&self, tag: &str) -> Result<u64, CmsError> {
        match self.store.get(&counter_key(tag))? {
            None => Ok(0),
            Some(CacheValue::Integer(version)) => Ok(u64::try_from(version).unwrap_or_default()),
            Some(_) => Err(CmsError::CacheBackend(format!(
                "Content version for '{tag}' is not an integer"
            ))),
        }
    }
}

fn counter_key(tag: &str) -> String {
    format!("{COUNTER_PREFIX}{tag}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::FileCache;

    #[test]
    fn test_bump_is_monotonic() {
        let versions = ContentVersions::new();
        assert_eq!(versions.bump(CMS_CONTENT_TAG), Some(1));
        assert_eq!(versions.bump(CMS_CONTENT_TAG), Some(2));
        assert_eq!(versions.current(CMS_CONTENT_TAG), 2);
        assert_eq!(versions.current("other"), 0);
    }

    #[test]
    fn test_stamp_is_order_independent() {
        let versions = ContentVersions::new();
        versions.bump("b");
        let a = versions.stamp(&["b".to_string(), "a".to_string()]).unwrap();
        let b = versions
            .stamp(&["a".to_string(), "b".to_string(), "a".to_string()])
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "a:0.b:1");
    }

    #[test]
    fn test_stamp_empty() {
        assert_eq!(ContentVersions::new().stamp(&[]).unwrap(), "");
    }

    #[test]
    fn test_counters_survive_a_new_registry_over_the_same_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = ContentVersions::with_backend(Arc::new(FileCache::new(dir.path().to_path_buf())));
        first.bump(CMS_CONTENT_TAG);
        first.bump(CMS_CONTENT_TAG);

        let restarted =
            ContentVersions::with_backend(Arc::new(FileCache::new(dir.path().to_path_buf())));
        assert_eq!(restarted.current(CMS_CONTENT_TAG), 2);
        assert_eq!(restarted.bump(CMS_CONTENT_TAG), Some(3));
    }

    #[test]
    fn test_from_settings_uses_file_location() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CacheSettings {
            backend: "file".to_string(),
            location: dir.path().display().to_string(),
            ..CacheSettings::default()
        };
        ContentVersions::from_settings(&settings).unwrap().bump("catalog");
        assert_eq!(ContentVersions::from_settings(&settings).unwrap().current("catalog"), 1);
    }
}
