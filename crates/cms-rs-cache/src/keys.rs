//! The cache key service.
//!
//! Keys are deterministic: a name prefix, a hash of the current value of each
//! vary-by dimension, and the version stamp of every content tag the entry
//! depends on. Dimension values are resolved by calling back into the request
//! context through [`VaryByResolver`].
//!
//! Backend failures never surface from this service. They are logged and
//! treated as a miss (for reads) or dropped (for writes), so rendering falls
//! back to a live render.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use cms_rs_core::settings::CacheSettings;
use cms_rs_core::CmsError;

use crate::backends::{backend_from_settings, CacheBackend, CacheValue};
use crate::versions::ContentVersions;

/// Resolves vary-by dimensions against the current request.
pub trait VaryByResolver {
    /// The current value of `dimension` (e.g. `url`, `theme`,
    /// `customer_group`), or `None` if the dimension is unknown.
    fn resolve_dimension(&self, dimension: &str) -> Option<String>;

    /// A raw request field, used for the operator reset switch.
    fn request_field(&self, name: &str) -> Option<String>;
}

/// A built cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub key: String,
    /// Set when the operator asked for a recache, or when the content
    /// versions could not be read: lookups must miss, and the
    /// fresh value overwrites the stored one.
    pub recache: bool,
}

/// Builds cache keys and reads/writes rendered output through a backend.
#[derive(Clone)]
pub struct CacheKeyService {
    backend: Arc<dyn CacheBackend>,
    versions: Arc<ContentVersions>,
    default_ttl: Option<Duration>,
    reset_key: String,
    reset_value: String,
}

impl std::fmt::Debug for CacheKeyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheKeyService")
            .field("default_ttl", &self.default_ttl)
            .field("reset_key", &self.reset_key)
            .finish_non_exhaustive()
    }
}

impl CacheKeyService {
    pub fn new(backend: Arc<dyn CacheBackend>, versions: Arc<ContentVersions>) -> Self {
        let defaults = CacheSettings::default();
        Self {
            backend,
            versions,
            default_ttl: None,
            reset_key: defaults.reset_key,
            reset_value: defaults.reset_value,
        }
    }

    /// Builds the service described by the cache settings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the backend cannot be built.
    pub fn from_settings(
        settings: &CacheSettings,
        versions: Arc<ContentVersions>,
    ) -> Result<Self, CmsError> {
        let backend = backend_from_settings(settings)?;
        Ok(Self::new(backend, versions)
            .with_default_ttl(settings.default_ttl.map(Duration::from_secs))
            .with_reset(&settings.reset_key, &settings.reset_value))
    }

    #[must_use]
    pub const fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_reset(mut self, key: &str, value: &str) -> Self {
        self.reset_key = key.to_string();
        self.reset_value = value.to_string();
        self
    }

    pub fn versions(&self) -> &Arc<ContentVersions> {
        &self.versions
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Builds the key for `prefix` under the current request context.
    ///
    /// Unknown dimensions resolve to an empty value (and are logged), so a
    /// typo in a vary-by list coarsens the cache instead of breaking it. If
    /// the content versions cannot be read the key is marked for recache, so
    /// an entry stored before an unseen bump is never served.
    pub fn build_key(
        &self,
        prefix: &str,
        vary_by: &[String],
        content_versions: &[String],
        resolver: &dyn VaryByResolver,
    ) -> CacheKey {
        let mut hasher = Sha256::new();
        for dimension in vary_by {
            let value = resolver.resolve_dimension(dimension).unwrap_or_else(|| {
                tracing::warn!(dimension = dimension.as_str(), "unknown cache vary-by dimension");
                String::new()
            });
            hasher.update(dimension.as_bytes());
            hasher.update([0x1f]);
            hasher.update(value.as_bytes());
            hasher.update([0x1e]);
        }
        let digest = hasher.finalize();
        let hash = hex::encode(&digest[..12]);

        let (stamp, versions_known) = match self.versions.stamp(content_versions) {
            Ok(stamp) => (stamp, true),
            Err(e) => {
                tracing::warn!(prefix, error = %e, "content versions unavailable; forcing recache");
                ("unknown".to_string(), false)
            }
        };
        let key = if stamp.is_empty() {
            format!("{prefix}_{hash}")
        } else {
            format!("{prefix}_{hash}_v{stamp}")
        };

        let reset_requested = !self.reset_key.is_empty()
            && resolver
                .request_field(&self.reset_key)
                .is_some_and(|value| value == self.reset_value);
        let recache = reset_requested || !versions_known;

        CacheKey { key, recache }
    }

    /// Reads a rendered value. Misses on recache and on backend failure.
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        if key.recache {
            tracing::debug!(key = key.key.as_str(), "cache recache requested");
            return None;
        }
        match self.backend.get(&key.key) {
            Ok(Some(value)) => {
                tracing::debug!(key = key.key.as_str(), "cache hit");
                value.into_string()
            }
            Ok(None) => {
                tracing::debug!(key = key.key.as_str(), "cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(key = key.key.as_str(), error = %e, "cache read failed; rendering live");
                None
            }
        }
    }

    /// Stores a rendered value. `ttl = None` uses the configured default.
    pub fn set(&self, key: &CacheKey, value: &str, ttl: Option<Duration>) {
        let ttl = ttl.or(self.default_ttl);
        if let Err(e) = self
            .backend
            .set(&key.key, CacheValue::String(value.to_string()), ttl)
        {
            tracing::warn!(key = key.key.as_str(), error = %e, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryCache;
    use std::collections::HashMap;

    struct MapResolver(HashMap<&'static str, &'static str>);

    impl VaryByResolver for MapResolver {
        fn resolve_dimension(&self, dimension: &str) -> Option<String> {
            self.0.get(dimension).map(ToString::to_string)
        }

        fn request_field(&self, name: &str) -> Option<String> {
            self.0.get(name).map(ToString::to_string)
        }
    }

    fn resolver(pairs: &[(&'static str, &'static str)]) -> MapResolver {
        MapResolver(pairs.iter().copied().collect())
    }

    fn service() -> CacheKeyService {
        CacheKeyService::new(Arc::new(InMemoryCache::new()), Arc::new(ContentVersions::new()))
    }

    fn dims(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_key_is_deterministic() {
        let svc = service();
        let r = resolver(&[("url", "/shop")]);
        let a = svc.build_key("page_shop", &dims(&["url"]), &[], &r);
        let b = svc.build_key("page_shop", &dims(&["url"]), &[], &r);
        assert_eq!(a, b);
        assert!(a.key.starts_with("page_shop_"));
        assert!(!a.recache);
    }

    #[test]
    fn test_key_varies_with_dimension_value() {
        let svc = service();
        let a = svc.build_key("p", &dims(&["url"]), &[], &resolver(&[("url", "/a")]));
        let b = svc.build_key("p", &dims(&["url"]), &[], &resolver(&[("url", "/b")]));
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn test_key_changes_when_version_bumped() {
        let svc = service();
        let r = resolver(&[]);
        let before = svc.build_key("p", &[], &dims(&["cms"]), &r);
        svc.versions().bump("cms");
        let after = svc.build_key("p", &[], &dims(&["cms"]), &r);
        assert_ne!(before.key, after.key);
        assert!(after.key.ends_with("_vcms:1"));
    }

    #[test]
    fn test_unknown_dimension_resolves_empty() {
        let svc = service();
        let a = svc.build_key("p", &dims(&["nonsense"]), &[], &resolver(&[]));
        let b = svc.build_key("p", &dims(&["nonsense"]), &[], &resolver(&[("x", "y")]));
        assert_eq!(a.key, b.key);
    }

    #[test]
    fn test_reset_field_forces_recache() {
        let svc = service().with_reset("reset_cache", "yes");
        let key = svc.build_key("p", &[], &[], &resolver(&[("reset_cache", "yes")]));
        assert!(key.recache);
        svc.set(&key, "stale", None);
        assert!(svc.get(&key).is_none());

        let wrong_value = svc.build_key("p", &[], &[], &resolver(&[("reset_cache", "no")]));
        assert!(!wrong_value.recache);
        assert_eq!(svc.get(&wrong_value).as_deref(), Some("stale"));
    }

    struct FailingBackend;

    impl CacheBackend for FailingBackend {
        fn get(&self, _key: &str) -> Result<Option<CacheValue>, CmsError> {
            Err(CmsError::CacheBackend("connection refused".into()))
        }
        fn set(&self, _: &str, _: CacheValue, _: Option<Duration>) -> Result<(), CmsError> {
            Err(CmsError::CacheBackend("connection refused".into()))
        }
        fn incr(&self, _key: &str, _delta: i64) -> Result<i64, CmsError> {
            Err(CmsError::CacheBackend("connection refused".into()))
        }
    }

    #[test]
    fn test_backend_failure_is_a_miss() {
        let svc = CacheKeyService::new(Arc::new(FailingBackend), Arc::new(ContentVersions::new()));
        let key = svc.build_key("p", &[], &[], &resolver(&[]));
        svc.set(&key, "value", None);
        assert!(svc.get(&key).is_none());
    }

    #[test]
    fn test_unreadable_versions_force_recache() {
        let entries = Arc::new(InMemoryCache::new());
        let svc = CacheKeyService::new(
            entries,
            Arc::new(ContentVersions::with_backend(Arc::new(FailingBackend))),
        );
        let key = svc.build_key("p", &[], &dims(&["cms"]), &resolver(&[]));
        assert!(key.recache);
        svc.set(&key, "value", None);
        assert!(svc.get(&key).is_none());

        let unversioned = svc.build_key("p", &[], &[], &resolver(&[]));
        assert!(!unversioned.recache);
    }

    #[test]
    fn test_from_settings_applies_reset_and_ttl() {
        let settings = CacheSettings {
            default_ttl: Some(30),
            reset_key: "flush".to_string(),
            reset_value: "now".to_string(),
            ..CacheSettings::default()
        };
        let svc = CacheKeyService::from_settings(&settings, Arc::new(ContentVersions::new())).unwrap();
        let key = svc.build_key("p", &[], &[], &resolver(&[("flush", "now")]));
        assert!(key.recache);
        assert_eq!(svc.default_ttl, Some(Duration::from_secs(30)));
    }
}
