//! # cms-rs
//!
//! A CMS page and partial rendering pipeline.
//!
//! This is the meta-crate that re-exports the workspace crates. Depend on
//! `cms-rs` for everything, or on individual crates for finer-grained
//! control.
//!
//! ```
//! use std::sync::Arc;
//! use cms_rs::prelude::*;
//!
//! let repo = Arc::new(InMemoryRepository::new(Arc::default()));
//! let mut home = Page::new(1, "/", "Home");
//! home.content = "Hello <?= strtoupper('world') ?>".into();
//! repo.insert_page(home).unwrap();
//!
//! let site = Site::builder(Settings::default())
//!     .versions(Arc::clone(repo.versions()))
//!     .repository(repo)
//!     .build()
//!     .unwrap();
//! let outcome = site.display(CmsRequest::new("/")).unwrap();
//! assert_eq!(outcome.body(), Some("Hello WORLD"));
//! ```

/// Errors, settings, logging, the content and request models.
pub use cms_rs_core as core;

/// Ordered extension hooks.
pub use cms_rs_signals as signals;

/// Cache backends, content versions and the cache key service.
pub use cms_rs_cache as cache;

/// Templating engines and engine selection.
pub use cms_rs_template as template;

/// The rendering pipeline.
pub use cms_rs_render as render;

/// Axum transport.
#[cfg(feature = "http")]
pub use cms_rs_http as http;

pub use serde_json;
pub use tracing;

/// The types most applications need.
pub mod prelude {
    pub use cms_rs_core::{
        CmsError, CmsRequest, CmsResult, Customer, GlobalContentBlock, Layout, Page, Partial,
        SecurityMode, Settings, Theme,
    };
    pub use cms_rs_render::{
        ActionRegistry, AjaxOutcome, ContentBundle, Controller, InMemoryRepository, RenderOutcome,
        Site,
    };
    pub use cms_rs_signals::CmsHooks;
    pub use cms_rs_template::TemplateServices;

    #[cfg(feature = "http")]
    pub use cms_rs_http::CmsApp;
}
