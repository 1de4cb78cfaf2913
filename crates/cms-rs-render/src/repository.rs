//! Content lookup and the in-memory content repository.
//!
//! The rendering pipeline reads pages, partials and layouts through
//! [`ContentRepository`]. Every lookup is scoped to a theme (or to no theme
//! when theming is off), so one repository can serve several themes side by
//! side without any process-wide state.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use cms_rs_cache::ContentVersions;
//! use cms_rs_core::Page;
//! use cms_rs_render::repository::{ContentRepository, InMemoryRepository};
//!
//! let repo = InMemoryRepository::new(Arc::new(ContentVersions::new()));
//! repo.insert_page(Page::new(1, "/category", "Category")).unwrap();
//!
//! let routed = repo.route(None, "/category/shoes/2").unwrap();
//! assert_eq!(routed.page.id, 1);
//! assert_eq!(routed.params, vec!["shoes", "2"]);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use cms_rs_cache::{ContentVersions, CMS_CONTENT_TAG};
use cms_rs_core::content::{
    normalize_block_code, normalize_partial_name, GlobalContentBlock, LayoutId, PageId, ThemeId,
};
use cms_rs_core::navigation::validate_parent;
use cms_rs_core::{CmsError, CmsResult, Layout, Page, Partial, ValidationError};
use serde::Deserialize;

/// A page matched by the router, with the URL segments that followed it.
#[derive(Debug, Clone)]
pub struct RoutedPage {
    pub page: Arc<Page>,
    pub params: Vec<String>,
}

/// Read access to CMS content.
pub trait ContentRepository: Send + Sync {
    /// Finds the page serving `path`: the page with the longest URL that is
    /// a whole-segment prefix of the path. Remaining segments become the
    /// request parameters.
    fn route(&self, theme: Option<ThemeId>, path: &str) -> Option<RoutedPage>;

    fn find_page(&self, theme: Option<ThemeId>, id: PageId) -> Option<Arc<Page>>;

    /// Looks a partial up by name. `;` in the name is treated as `:`.
    fn find_partial(&self, theme: Option<ThemeId>, name: &str) -> Option<Arc<Partial>>;

    fn find_layout(&self, theme: Option<ThemeId>, id: LayoutId) -> Option<Arc<Layout>>;

    /// Every page of a theme, in no particular order.
    fn pages(&self, theme: Option<ThemeId>) -> Vec<Arc<Page>>;

    /// Looks a global content block up by its case-insensitive code.
    fn find_global_block(&self, theme: Option<ThemeId>, code: &str) -> Option<Arc<GlobalContentBlock>>;
}

/// Site content read from a JSON document, for seeding a repository.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContentBundle {
    pub pages: Vec<Page>,
    pub partials: Vec<Partial>,
    pub layouts: Vec<Layout>,
    pub global_blocks: Vec<GlobalContentBlock>,
}

impl ContentBundle {
    pub fn from_json_str(json: &str) -> CmsResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| CmsError::Serialization(format!("Invalid content bundle: {e}")))
    }
}

#[derive(Debug, Default)]
struct ContentStore {
    pages: HashMap<(Option<ThemeId>, PageId), Arc<Page>>,
    partials: HashMap<(Option<ThemeId>, String), Arc<Partial>>,
    layouts: HashMap<(Option<ThemeId>, LayoutId), Arc<Layout>>,
    global_blocks: HashMap<(Option<ThemeId>, String), Arc<GlobalContentBlock>>,
}

/// A thread-safe, in-memory [`ContentRepository`].
///
/// Every mutation bumps the `cms` content-version tag, so cached output that
/// declared a dependency on CMS content is recomputed on the next render.
#[derive(Debug)]
pub struct InMemoryRepository {
    store: RwLock<ContentStore>,
    versions: Arc<ContentVersions>,
}

impl InMemoryRepository {
    pub fn new(versions: Arc<ContentVersions>) -> Self {
        Self {
            store: RwLock::new(ContentStore::default()),
            versions,
        }
    }

    /// The content-version registry this repository bumps.
    pub fn versions(&self) -> &Arc<ContentVersions> {
        &self.versions
    }

    /// Inserts or replaces a page.
    ///
    /// # Errors
    ///
    /// A validation error if the page is invalid, its URL is already taken
    /// by another page of the same theme, or its parent would create a cycle.
    pub fn insert_page(&self, page: Page) -> CmsResult<Arc<Page>> {
        page.validate()?;
        let page = {
            let mut store = self.store.write().expect("content store lock poisoned");
            let url = normalize_url(&page.url);
            if store.pages.values().any(|other| {
                other.theme_id == page.theme_id
                    && other.id != page.id
                    && normalize_url(&other.url) == url
            }) {
                return Err(ValidationError::new(format!(
                    "The URL {} is already in use by another page.",
                    page.url
                ))
                .with_field("url")
                .into());
            }
            validate_parent(page.id, page.parent_id, |id| {
                store
                    .pages
                    .get(&(page.theme_id, id))
                    .and_then(|p| p.parent_id)
            })?;
            let page = Arc::new(page);
            store.pages.insert((page.theme_id, page.id), Arc::clone(&page));
            page
        };
        self.touch();
        Ok(page)
    }

    pub fn remove_page(&self, theme: Option<ThemeId>, id: PageId) -> Option<Arc<Page>> {
        let removed = self
            .store
            .write()
            .expect("content store lock poisoned")
            .pages
            .remove(&(theme, id));
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Inserts or replaces a partial.
    ///
    /// # Errors
    ///
    /// A validation error if the partial has no name.
    pub fn insert_partial(&self, partial: Partial) -> CmsResult<Arc<Partial>> {
        if partial.name.is_empty() {
            return Err(ValidationError::new("Please specify the partial name.")
                .with_field("name")
                .into());
        }
        let partial = Arc::new(partial);
        self.store
            .write()
            .expect("content store lock poisoned")
            .partials
            .insert((partial.theme_id, partial.name.clone()), Arc::clone(&partial));
        self.touch();
        Ok(partial)
    }

    pub fn remove_partial(&self, theme: Option<ThemeId>, name: &str) -> Option<Arc<Partial>> {
        let removed = self
            .store
            .write()
            .expect("content store lock poisoned")
            .partials
            .remove(&(theme, normalize_partial_name(name)));
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn insert_layout(&self, layout: Layout) -> Arc<Layout> {
        let layout = Arc::new(layout);
        self.store
            .write()
            .expect("content store lock poisoned")
            .layouts
            .insert((layout.theme_id, layout.id), Arc::clone(&layout));
        self.touch();
        layout
    }

    /// Inserts or replaces a global content block.
    ///
    /// # Errors
    ///
    /// A validation error if the block code is empty or malformed.
    pub fn insert_global_block(&self, mut block: GlobalContentBlock) -> CmsResult<Arc<GlobalContentBlock>> {
        block.code = normalize_block_code(&block.code);
        block.validate()?;
        let block = Arc::new(block);
        self.store
            .write()
            .expect("content store lock poisoned")
            .global_blocks
            .insert((block.theme_id, block.code.clone()), Arc::clone(&block));
        self.touch();
        Ok(block)
    }

    /// Inserts everything in `bundle`. Pages go in document order, so a
    /// parent must come before its children.
    ///
    /// # Errors
    ///
    /// The first validation error; content inserted before it stays.
    pub fn load(&self, bundle: ContentBundle) -> CmsResult<()> {
        for layout in bundle.layouts {
            self.insert_layout(layout);
        }
        for partial in bundle.partials {
            self.insert_partial(partial)?;
        }
        for block in bundle.global_blocks {
            self.insert_global_block(block)?;
        }
        for page in bundle.pages {
            self.insert_page(page)?;
        }
        Ok(())
    }

    fn touch(&self) {
        let version = self.versions.bump(CMS_CONTENT_TAG);
        tracing::debug!(?version, "cms content changed");
    }
}

impl ContentRepository for InMemoryRepository {
    fn route(&self, theme: Option<ThemeId>, path: &str) -> Option<RoutedPage> {
        let path = normalize_url(path);
        let store = self.store.read().expect("content store lock poisoned");
        store
            .pages
            .values()
            .filter(|page| page.theme_id == theme)
            .filter_map(|page| {
                let url = normalize_url(&page.url);
                segment_suffix(&path, &url).map(|rest| (url.len(), page, rest))
            })
            .max_by_key(|(len, _, _)| *len)
            .map(|(_, page, rest)| RoutedPage {
                page: Arc::clone(page),
                params: rest
                    .split('/')
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect(),
            })
    }

    fn find_page(&self, theme: Option<ThemeId>, id: PageId) -> Option<Arc<Page>> {
        self.store
            .read()
            .expect("content store lock poisoned")
            .pages
            .get(&(theme, id))
            .cloned()
    }

    fn find_partial(&self, theme: Option<ThemeId>, name: &str) -> Option<Arc<Partial>> {
        self.store
            .read()
            .expect("content store lock poisoned")
            .partials
            .get(&(theme, normalize_partial_name(name)))
            .cloned()
    }

    fn find_layout(&self, theme: Option<ThemeId>, id: LayoutId) -> Option<Arc<Layout>> {
        self.store
            .read()
            .expect("content store lock poisoned")
            .layouts
            .get(&(theme, id))
            .cloned()
    }

    fn pages(&self, theme: Option<ThemeId>) -> Vec<Arc<Page>> {
        self.store
            .read()
            .expect("content store lock poisoned")
            .pages
            .values()
            .filter(|page| page.theme_id == theme)
            .cloned()
            .collect()
    }

    fn find_global_block(&self, theme: Option<ThemeId>, code: &str) -> Option<Arc<GlobalContentBlock>> {
        self.store
            .read()
            .expect("content store lock poisoned")
            .global_blocks
            .get(&(theme, normalize_block_code(code)))
            .cloned()
    }
}

/// Drops trailing slashes, so `/shop/` and `/shop` are the same page. The
/// root stays `/`.
fn normalize_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// If `prefix` covers whole leading segments of `path`, returns the rest.
fn segment_suffix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix == "/" {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    (rest.is_empty() || rest.starts_with('/')).then_some(rest)
}
