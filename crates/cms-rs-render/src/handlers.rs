//! Compiled AJAX handler tables, cached per page.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;

use cms_rs_core::content::PageId;
use cms_rs_core::{CmsResult, Page};
use cms_rs_template::{CodeEngine, HandlerTable};

/// Application-scoped cache of [`HandlerTable`]s.
///
/// A table is keyed by the page id and a hash of the page's handler source,
/// so editing a page's handlers yields a fresh compile while unchanged pages
/// are compiled exactly once.
#[derive(Debug, Default)]
pub struct AjaxHandlerRegistry {
    tables: RwLock<HashMap<(PageId, u64), HandlerTable>>,
}

impl AjaxHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handler table for `page`, compiling it on first use.
    ///
    /// # Errors
    ///
    /// Propagates compile errors. A failed compile is not cached.
    pub fn load(&self, page: &Page, engine: &CodeEngine) -> CmsResult<HandlerTable> {
        let key = (page.id, source_hash(&page.ajax_handlers));
        if let Some(table) = self
            .tables
            .read()
            .expect("handler registry lock poisoned")
            .get(&key)
        {
            return Ok(table.clone());
        }

        let table = engine.compile_handlers(&page.ajax_handlers)?;
        tracing::debug!(page_id = page.id, handlers = ?table.names(), "compiled AJAX handlers");
        Ok(self
            .tables
            .write()
            .expect("handler registry lock poisoned")
            .entry(key)
            .or_insert(table)
            .clone())
    }

    pub fn len(&self) -> usize {
        self.tables.read().expect("handler registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.tables.write().expect("handler registry lock poisoned").clear();
    }
}

fn source_hash(source: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: PageId, handlers: &str) -> Page {
        let mut page = Page::new(id, "/p", "P");
        page.ajax_handlers = handlers.to_string();
        page
    }

    #[test]
    fn test_compiles_once_per_source() {
        let registry = AjaxHandlerRegistry::new();
        let engine = CodeEngine::default();
        let p = page(1, "function on_a() {}");
        assert!(registry.load(&p, &engine).unwrap().contains("on_a"));
        registry.load(&p, &engine).unwrap();
        assert_eq!(registry.len(), 1);

        let edited = page(1, "function on_b() {}");
        assert!(registry.load(&edited, &engine).unwrap().contains("on_b"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_failed_compile_is_not_cached() {
        let registry = AjaxHandlerRegistry::new();
        assert!(registry.load(&page(1, "function ("), &CodeEngine::default()).is_err());
        assert!(registry.is_empty());
    }
}
