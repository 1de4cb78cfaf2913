//! # cms-rs-cache
//!
//! Caching for rendered CMS output.
//!
//! - [`backends`] - The [`CacheBackend`] trait and its in-memory, file and dummy implementations
//! - [`versions`] - Content-version tags used to invalidate dependent entries
//! - [`keys`] - The [`CacheKeyService`], which builds keys from vary-by
//!   dimensions and version tags and degrades backend failures to misses
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use cms_rs_cache::{CacheKeyService, ContentVersions, InMemoryCache, VaryByResolver};
//!
//! struct Url(&'static str);
//!
//! impl VaryByResolver for Url {
//!     fn resolve_dimension(&self, dimension: &str) -> Option<String> {
//!         (dimension == "url").then(|| self.0.to_string())
//!     }
//!     fn request_field(&self, _name: &str) -> Option<String> {
//!         None
//!     }
//! }
//!
//! let service = CacheKeyService::new(Arc::new(InMemoryCache::new()), Arc::new(ContentVersions::new()));
//! let key = service.build_key("page_about", &["url".to_string()], &["cms".to_string()], &Url("/about"));
//! assert!(service.get(&key).is_none());
//! service.set(&key, "<h1>About</h1>", None);
//! assert_eq!(service.get(&key).as_deref(), Some("<h1>About</h1>"));
//! ```

pub mod backends;
pub mod keys;
pub mod versions;

pub use backends::{backend_from_settings, CacheBackend, CacheValue, DummyCache, FileCache, InMemoryCache};
pub use keys::{CacheKey, CacheKeyService, VaryByResolver};
pub use versions::{ContentVersions, CMS_CONTENT_TAG};
