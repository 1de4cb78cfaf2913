//! Hook payloads and the [`CmsHooks`] set fired by the rendering pipeline.

use std::sync::Arc;

use cms_rs_core::call_stack::ObjectType;
use cms_rs_core::content::{Customer, GroupId, Page};
use cms_rs_core::options::{CombineOptions, PartialOptions, ResourceKind, Scope};

use crate::Hook;

/// A request path about to be routed.
#[derive(Debug, Clone)]
pub struct RouteEvent {
    pub path: String,
}

/// A route chosen by a hook instead of the URL router.
#[derive(Debug, Clone)]
pub struct RouteOverride {
    pub page: Page,
    pub params: Vec<String>,
}

/// A page display request that matched no page.
#[derive(Debug, Clone)]
pub struct PageNotFoundEvent {
    pub path: String,
}

/// A page together with the request parameters it was routed with.
#[derive(Debug, Clone)]
pub struct PageEvent {
    pub page: Arc<Page>,
    pub params: Vec<String>,
}

/// Page content right after it was evaluated.
#[derive(Debug, Clone)]
pub struct PageContentEvent {
    pub page: Arc<Page>,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct TrackingCodeEvent {
    pub page: Arc<Page>,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct PartialRenderEvent {
    pub name: String,
    pub params: Scope,
    pub options: PartialOptions,
}

#[derive(Debug, Clone)]
pub struct ResourceCombineEvent {
    pub kind: ResourceKind,
    pub files: Vec<String>,
    pub options: CombineOptions,
    pub show_tag: bool,
}

/// A source unit about to be evaluated.
#[derive(Debug, Clone)]
pub struct EvaluateCodeEvent {
    pub page: Option<Arc<Page>>,
    pub object_type: ObjectType,
    pub object_name: String,
    pub source: String,
    pub params: Scope,
}

/// The rendered output of a source unit, before it is returned.
#[derive(Debug, Clone)]
pub struct EvaluatedOutputEvent {
    pub page: Option<Arc<Page>>,
    pub object_type: ObjectType,
    pub object_name: String,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct CustomerGroupEvent {
    pub customer: Option<Customer>,
}

#[derive(Debug, Clone)]
pub struct NavigationVisibilityEvent {
    pub page: Arc<Page>,
    pub customer: Option<Customer>,
}

/// Every extension point the rendering pipeline fires.
///
/// Hooks returning a value follow first-answer-wins semantics unless noted.
#[derive(Debug, Default)]
pub struct CmsHooks {
    /// May answer with the page to serve, skipping the URL router.
    pub before_route: Hook<RouteEvent, RouteOverride>,
    /// Answering `true` suppresses the `/404` page; the miss is then
    /// reported as a plain not-found error.
    pub page_not_found: Hook<PageNotFoundEvent, bool>,

    /// May answer with a replacement page.
    pub before_display: Hook<PageEvent, Page>,
    pub after_display: Hook<PageEvent>,

    pub before_handle_ajax: Hook<PageEvent>,
    pub after_handle_ajax: Hook<PageEvent>,

    /// May answer with literal page content, bypassing caching and evaluation.
    pub before_eval_page_content: Hook<PageEvent, String>,
    pub after_eval_page_content: Hook<PageContentEvent>,

    /// May answer with a redirect URL.
    pub apply_page_security: Hook<PageEvent, String>,

    /// Veto: every receiver must agree for the snippet to be included.
    pub before_tracking_code_include: Hook<TrackingCodeEvent, bool>,

    pub before_render_partial: Hook<PartialRenderEvent>,
    pub after_render_partial: Hook<PartialRenderEvent>,

    /// May answer with the finished markup or URL.
    pub before_resource_combine: Hook<ResourceCombineEvent, String>,

    /// May answer with pre-rendered output, replacing evaluation entirely.
    pub evaluate_code: Hook<EvaluateCodeEvent, String>,
    /// May answer with replacement output for an evaluated unit.
    pub before_output_evaluated_code: Hook<EvaluatedOutputEvent, String>,

    /// May answer with the customer group to use for the visitor.
    pub customer_group_id: Hook<CustomerGroupEvent, GroupId>,

    /// Veto: any `false` hides the page from navigation.
    pub page_navigation_visibility: Hook<NavigationVisibilityEvent, bool>,

    /// May answer with the page cache policy, overriding the stored one.
    pub page_cache_policy: Hook<PageEvent, cms_rs_core::content::CachePolicy>,
}

impl CmsHooks {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_before_display_can_swap_page() {
        let hooks = CmsHooks::new();
        hooks.before_display.connect(
            "maintenance",
            Arc::new(|event: &PageEvent| {
                (event.page.url != "/maintenance").then(|| Page::new(99, "/maintenance", "Down"))
            }),
        );

        let event = PageEvent {
            page: Arc::new(Page::new(1, "/", "Home")),
            params: Vec::new(),
        };
        let replacement = hooks.before_display.first(&event).unwrap();
        assert_eq!(replacement.id, 99);
    }

    #[test]
    fn test_before_route_answers_with_page_and_params() {
        let hooks = CmsHooks::new();
        hooks.before_route.connect(
            "ipad",
            Arc::new(|event: &RouteEvent| {
                event.path.starts_with("/ipad").then(|| RouteOverride {
                    page: Page::new(7, "/product", "Product"),
                    params: vec!["ipad".to_string()],
                })
            }),
        );

        let routed = |path: &str| {
            hooks.before_route.first(&RouteEvent {
                path: path.to_string(),
            })
        };
        let answer = routed("/ipad/2").unwrap();
        assert_eq!(answer.page.id, 7);
        assert_eq!(answer.params, vec!["ipad"]);
        assert!(routed("/about").is_none());
    }

    #[test]
    fn test_tracking_veto() {
        let hooks = CmsHooks::new();
        hooks.before_tracking_code_include.connect(
            "no_admin_tracking",
            Arc::new(|event: &TrackingCodeEvent| Some(!event.page.url.starts_with("/admin"))),
        );

        let event = |url: &str| TrackingCodeEvent {
            page: Arc::new(Page::new(1, url, "x")),
            code: "<script></script>".to_string(),
        };
        assert!(hooks.before_tracking_code_include.all_agree(&event("/")));
        assert!(!hooks.before_tracking_code_include.all_agree(&event("/admin/x")));
    }
}
