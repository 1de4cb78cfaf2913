//! Page navigation tree.
//!
//! Builds the menu hierarchy from the flat page list. Pages the visitor may
//! not see are left out, and their visible descendants are attached to the
//! nearest visible ancestor so that hiding a section page does not hide its
//! children.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::content::{Page, PageId};
use crate::error::ValidationError;

/// A visibility-filtered view of the page hierarchy.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use cms_rs_core::content::Page;
/// use cms_rs_core::navigation::NavigationTree;
///
/// let home = Page::new(1, "/", "Home");
/// let mut about = Page::new(2, "/about", "About");
/// about.parent_id = Some(1);
///
/// let tree = NavigationTree::build(&[Arc::new(home), Arc::new(about)], |_| true);
/// assert_eq!(tree.roots().len(), 1);
/// assert_eq!(tree.children(1)[0].url, "/about");
/// ```
#[derive(Debug, Clone, Default)]
pub struct NavigationTree {
    pages: HashMap<PageId, Arc<Page>>,
    parents: HashMap<PageId, Option<PageId>>,
    children: HashMap<Option<PageId>, Vec<PageId>>,
}

impl NavigationTree {
    /// Builds the tree from `pages`, keeping those for which `is_visible` holds.
    pub fn build(pages: &[Arc<Page>], is_visible: impl Fn(&Page) -> bool) -> Self {
        let all: HashMap<PageId, &Arc<Page>> = pages.iter().map(|p| (p.id, p)).collect();
        let visible: HashMap<PageId, Arc<Page>> = pages
            .iter()
            .filter(|p| p.navigation_visible && is_visible(p))
            .map(|p| (p.id, Arc::clone(p)))
            .collect();

        let mut parents = HashMap::with_capacity(visible.len());
        let mut children: HashMap<Option<PageId>, Vec<PageId>> = HashMap::new();

        for page in visible.values() {
            let parent = nearest_visible_ancestor(page, &all, &visible);
            parents.insert(page.id, parent);
            children.entry(parent).or_default().push(page.id);
        }

        for ids in children.values_mut() {
            ids.sort_by(|a, b| {
                let (a, b) = (&visible[a], &visible[b]);
                a.navigation_sort_order
                    .cmp(&b.navigation_sort_order)
                    .then_with(|| a.title.cmp(&b.title))
            });
        }

        Self {
            pages: visible,
            parents,
            children,
        }
    }

    pub fn page(&self, id: PageId) -> Option<&Arc<Page>> {
        self.pages.get(&id)
    }

    /// Top-level menu entries.
    pub fn roots(&self) -> Vec<Arc<Page>> {
        self.collect(None)
    }

    pub fn children(&self, id: PageId) -> Vec<Arc<Page>> {
        self.collect(Some(id))
    }

    /// Breadcrumbs for `id`, root first, not including the page itself.
    pub fn parents(&self, id: PageId) -> Vec<Arc<Page>> {
        let mut chain = Vec::new();
        let mut current = self.parents.get(&id).copied().flatten();
        while let Some(parent_id) = current {
            let Some(page) = self.pages.get(&parent_id) else {
                break;
            };
            if parent_id == id || chain.len() >= self.pages.len() {
                break;
            }
            chain.push(Arc::clone(page));
            current = self.parents.get(&parent_id).copied().flatten();
        }
        chain.reverse();
        chain
    }

    pub fn navigation_label(&self, id: PageId) -> Option<&str> {
        self.pages.get(&id).map(|p| p.navigation_label())
    }

    /// Returns `true` if `url` addresses the page `id`.
    pub fn is_current(&self, id: PageId, url: &str) -> bool {
        self.pages.get(&id).is_some_and(|p| same_url(&p.url, url))
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    fn collect(&self, parent: Option<PageId>) -> Vec<Arc<Page>> {
        self.children
            .get(&parent)
            .map(|ids| ids.iter().map(|id| Arc::clone(&self.pages[id])).collect())
            .unwrap_or_default()
    }
}

fn nearest_visible_ancestor(
    page: &Page,
    all: &HashMap<PageId, &Arc<Page>>,
    visible: &HashMap<PageId, Arc<Page>>,
) -> Option<PageId> {
    let mut seen = HashSet::from([page.id]);
    let mut current = page.parent_id;
    while let Some(id) = current {
        if !seen.insert(id) {
            return None;
        }
        if visible.contains_key(&id) {
            return Some(id);
        }
        current = all.get(&id).and_then(|p| p.parent_id);
    }
    None
}

fn same_url(a: &str, b: &str) -> bool {
    let trim = |s: &str| s.trim_end_matches('/').to_lowercase();
    trim(a) == trim(b)
}

/// Checks that making `parent_id` the parent of `page_id` keeps the
/// hierarchy acyclic.
pub fn validate_parent(
    page_id: PageId,
    parent_id: Option<PageId>,
    parent_of: impl Fn(PageId) -> Option<PageId>,
) -> Result<(), ValidationError> {
    let mut current = parent_id;
    let mut steps = 0usize;
    while let Some(id) = current {
        if id == page_id {
            return Err(ValidationError::new(
                "The selected parent page is a child of this page.",
            )
            .with_field("parent_id"));
        }
        steps += 1;
        if steps > 10_000 {
            return Err(ValidationError::new("The page hierarchy is too deep.").with_field("parent_id"));
        }
        current = parent_of(id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: PageId, url: &str, parent: Option<PageId>) -> Arc<Page> {
        let mut p = Page::new(id, url, format!("Page {id}"));
        p.parent_id = parent;
        Arc::new(p)
    }

    #[test]
    fn test_hidden_parent_children_are_reparented() {
        let mut hidden = Page::new(2, "/shop", "Shop");
        hidden.parent_id = Some(1);
        hidden.navigation_visible = false;
        let pages = vec![
            page(1, "/", None),
            Arc::new(hidden),
            page(3, "/shop/shoes", Some(2)),
        ];
        let tree = NavigationTree::build(&pages, |_| true);
        assert!(tree.page(2).is_none());
        let children: Vec<_> = tree.children(1).iter().map(|p| p.id).collect();
        assert_eq!(children, vec![3]);
    }

    #[test]
    fn test_visibility_predicate_filters() {
        let pages = vec![page(1, "/", None), page(2, "/account", None)];
        let tree = NavigationTree::build(&pages, |p| p.url != "/account");
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_breadcrumbs_root_first() {
        let pages = vec![
            page(1, "/", None),
            page(2, "/shop", Some(1)),
            page(3, "/shop/shoes", Some(2)),
        ];
        let tree = NavigationTree::build(&pages, |_| true);
        let crumbs: Vec<_> = tree.parents(3).iter().map(|p| p.id).collect();
        assert_eq!(crumbs, vec![1, 2]);
        assert!(tree.parents(1).is_empty());
    }

    #[test]
    fn test_children_sorted_by_sort_order() {
        let mut a = Page::new(2, "/a", "A");
        a.navigation_sort_order = 2;
        let mut b = Page::new(3, "/b", "B");
        b.navigation_sort_order = 1;
        let tree = NavigationTree::build(&[Arc::new(a), Arc::new(b)], |_| true);
        let roots: Vec<_> = tree.roots().iter().map(|p| p.id).collect();
        assert_eq!(roots, vec![3, 2]);
    }

    #[test]
    fn test_cycle_in_data_does_not_hang() {
        let pages = vec![page(1, "/a", Some(2)), page(2, "/b", Some(1))];
        let tree = NavigationTree::build(&pages, |_| true);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_is_current_ignores_trailing_slash() {
        let tree = NavigationTree::build(&[page(1, "/about", None)], |_| true);
        assert!(tree.is_current(1, "/about/"));
        assert!(!tree.is_current(1, "/contact"));
    }

    #[test]
    fn test_validate_parent_rejects_cycle() {
        let parents: HashMap<PageId, PageId> = [(2, 1), (3, 2)].into_iter().collect();
        let lookup = |id| parents.get(&id).copied();
        assert!(validate_parent(1, Some(3), lookup).is_err());
        assert!(validate_parent(3, Some(1), lookup).is_ok());
        assert!(validate_parent(1, None, lookup).is_ok());
    }
}
