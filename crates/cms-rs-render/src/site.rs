//! The application-scoped site: collaborators, caches and hooks shared by
//! every request.
//!
//! A [`Site`] is cheap to clone. Each request gets its own
//! [`Controller`](crate::controller::Controller), so per-request state such as
//! the call stack and output buffers never leaks between requests.

use std::sync::Arc;

use cms_rs_cache::{CacheKeyService, ContentVersions};
use cms_rs_core::content::GroupId;
use cms_rs_core::navigation::NavigationTree;
use cms_rs_core::{CmsError, CmsRequest, CmsResult, Customer, Settings};
use cms_rs_signals::{
    CmsHooks, CustomerGroupEvent, NavigationVisibilityEvent, PageNotFoundEvent, RouteEvent,
};
use cms_rs_template::{CodeEngine, EngineSelector};

use crate::actions::{ActionDispatcher, ActionRegistry};
use crate::controller::Controller;
use crate::handlers::AjaxHandlerRegistry;
use crate::outcome::{AjaxErrorReporter, AjaxOutcome, DefaultAjaxErrorReporter, RenderOutcome};
use crate::repository::{ContentRepository, InMemoryRepository, RoutedPage};
use crate::security::{TicketIssuer, UuidTicketIssuer};
use crate::themes::{StaticThemes, ThemeContext};

/// The page rendered for requests that match no other page.
pub const NOT_FOUND_PAGE_URL: &str = "/404";

fn not_found(path: &str) -> CmsError {
    CmsError::NotFound(format!("Page not found: {path}"))
}

struct SiteInner {
    settings: Arc<Settings>,
    repository: Arc<dyn ContentRepository>,
    themes: Arc<dyn ThemeContext>,
    actions: Arc<dyn ActionDispatcher>,
    tickets: Arc<dyn TicketIssuer>,
    ajax_errors: Arc<dyn AjaxErrorReporter>,
    hooks: Arc<CmsHooks>,
    cache: CacheKeyService,
    selector: EngineSelector,
    code_engine: CodeEngine,
    handlers: AjaxHandlerRegistry,
}

/// A configured CMS site.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use cms_rs_cache::ContentVersions;
/// use cms_rs_core::{CmsRequest, Page, Settings};
/// use cms_rs_render::repository::InMemoryRepository;
/// use cms_rs_render::{RenderOutcome, Site};
///
/// let versions = Arc::new(ContentVersions::new());
/// let repo = Arc::new(InMemoryRepository::new(Arc::clone(&versions)));
/// let mut page = Page::new(1, "/", "Home");
/// page.content = "<h1><?= h($this->request_param(0, 'hello')) ?></h1>".to_string();
/// repo.insert_page(page).unwrap();
///
/// let site = Site::builder(Settings::default())
///     .versions(versions)
///     .repository(repo)
///     .build()
///     .unwrap();
/// let outcome = site.display(CmsRequest::new("/world")).unwrap();
/// assert_eq!(outcome, RenderOutcome::Rendered("<h1>world</h1>".to_string()));
/// ```
#[derive(Clone)]
pub struct Site {
    inner: Arc<SiteInner>,
}

impl std::fmt::Debug for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Site")
            .field("selector", &self.inner.selector)
            .field("cache", &self.inner.cache)
            .finish_non_exhaustive()
    }
}

impl Site {
    pub fn builder(settings: Settings) -> SiteBuilder {
        SiteBuilder::new(settings)
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn hooks(&self) -> &Arc<CmsHooks> {
        &self.inner.hooks
    }

    pub fn cache(&self) -> &CacheKeyService {
        &self.inner.cache
    }

    pub fn repository(&self) -> &Arc<dyn ContentRepository> {
        &self.inner.repository
    }

    pub fn themes(&self) -> &Arc<dyn ThemeContext> {
        &self.inner.themes
    }

    pub fn actions(&self) -> &Arc<dyn ActionDispatcher> {
        &self.inner.actions
    }

    pub fn tickets(&self) -> &Arc<dyn TicketIssuer> {
        &self.inner.tickets
    }

    pub fn ajax_errors(&self) -> &Arc<dyn AjaxErrorReporter> {
        &self.inner.ajax_errors
    }

    pub fn selector(&self) -> &EngineSelector {
        &self.inner.selector
    }

    pub fn code_engine(&self) -> &CodeEngine {
        &self.inner.code_engine
    }

    pub fn handlers(&self) -> &AjaxHandlerRegistry {
        &self.inner.handlers
    }

    /// Finds the page serving `path`. A `before_route` answer wins over the
    /// URL router.
    pub fn route(&self, path: &str) -> Option<RoutedPage> {
        let hook = &self.inner.hooks.before_route;
        if hook.receiver_count() > 0 {
            let event = RouteEvent {
                path: path.to_string(),
            };
            if let Some(answer) = hook.first(&event) {
                tracing::debug!(path, page_id = answer.page.id, "route overridden by hook");
                return Some(RoutedPage {
                    page: Arc::new(answer.page),
                    params: answer.params,
                });
            }
        }
        self.inner
            .repository
            .route(self.inner.themes.content_scope(), path)
    }

    /// Routes `request` and creates its controller.
    ///
    /// # Errors
    ///
    /// [`CmsError::NotFound`] if no page serves the request path.
    pub fn controller(&self, request: CmsRequest) -> CmsResult<Arc<Controller>> {
        let routed = self.route(&request.path).ok_or_else(|| not_found(&request.path))?;
        Ok(Controller::new(self.clone(), request, routed.page, routed.params))
    }

    /// Renders the page serving `request`.
    ///
    /// A request that matches no page fires `page_not_found` and then
    /// renders the site's `/404` page as [`RenderOutcome::NotFound`], unless
    /// a receiver answered `true` or there is no such page.
    ///
    /// # Errors
    ///
    /// Unhandled routing misses and every unrecoverable render failure.
    /// Nothing rendered before the failure is returned.
    pub fn display(&self, request: CmsRequest) -> CmsResult<RenderOutcome> {
        match self.route(&request.path) {
            Some(routed) => Controller::new(self.clone(), request, routed.page, routed.params).display(),
            None => self.display_not_found(request),
        }
    }

    fn display_not_found(&self, request: CmsRequest) -> CmsResult<RenderOutcome> {
        let event = PageNotFoundEvent {
            path: request.path.clone(),
        };
        if self.inner.hooks.page_not_found.first(&event) == Some(true) {
            return Err(not_found(&request.path));
        }

        let Some(fallback) = self
            .inner
            .repository
            .route(self.inner.themes.content_scope(), NOT_FOUND_PAGE_URL)
            .filter(|routed| routed.params.is_empty())
        else {
            return Err(not_found(&request.path));
        };
        tracing::debug!(path = request.path.as_str(), "rendering the not-found page");
        match Controller::new(self.clone(), request, fallback.page, Vec::new()).display()? {
            RenderOutcome::Rendered(html) => Ok(RenderOutcome::NotFound(html)),
            other => Ok(other),
        }
    }

    /// Runs an AJAX handler on the page serving `request`, then renders the
    /// requested element updates in order.
    ///
    /// # Errors
    ///
    /// Only routing misses. Failures past routing are serialized into
    /// [`AjaxOutcome::Error`].
    pub fn handle_ajax(
        &self,
        request: CmsRequest,
        handler: &str,
        update_elements: &[(String, String)],
    ) -> CmsResult<AjaxOutcome> {
        Ok(self.controller(request)?.handle_ajax(handler, update_elements))
    }

    /// The customer group for a visitor: a hook answer, else the customer's
    /// own group, else the configured guest group.
    pub fn customer_group_id(&self, customer: Option<&Customer>) -> GroupId {
        let event = CustomerGroupEvent {
            customer: customer.cloned(),
        };
        self.inner
            .hooks
            .customer_group_id
            .first(&event)
            .or_else(|| customer.and_then(|c| c.group_id))
            .unwrap_or(self.inner.settings.security.guest_group_id)
    }

    /// The navigation tree as seen by `customer`.
    pub fn navigation(&self, customer: Option<&Customer>) -> NavigationTree {
        let pages = self.inner.repository.pages(self.inner.themes.content_scope());
        let hook = &self.inner.hooks.page_navigation_visibility;
        NavigationTree::build(&pages, |page| {
            if !page.security_mode.admits(customer.is_some()) {
                return false;
            }
            hook.receiver_count() == 0
                || hook.all_agree(&NavigationVisibilityEvent {
                    page: Arc::new(page.clone()),
                    customer: customer.cloned(),
                })
        })
    }
}

/// Builder for [`Site`]. Every collaborator has an in-memory default.
pub struct SiteBuilder {
    settings: Settings,
    versions: Option<Arc<ContentVersions>>,
    repository: Option<Arc<dyn ContentRepository>>,
    themes: Option<Arc<dyn ThemeContext>>,
    actions: Option<Arc<dyn ActionDispatcher>>,
    tickets: Option<Arc<dyn TicketIssuer>>,
    ajax_errors: Option<Arc<dyn AjaxErrorReporter>>,
    hooks: Option<Arc<CmsHooks>>,
    cache: Option<CacheKeyService>,
}

impl SiteBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            versions: None,
            repository: None,
            themes: None,
            actions: None,
            tickets: None,
            ajax_errors: None,
            hooks: None,
            cache: None,
        }
    }

    /// The content-version registry shared by the repository and the cache.
    #[must_use]
    pub fn versions(mut self, versions: Arc<ContentVersions>) -> Self {
        self.versions = Some(versions);
        self
    }

    #[must_use]
    pub fn repository(mut self, repository: Arc<dyn ContentRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    #[must_use]
    pub fn themes(mut self, themes: Arc<dyn ThemeContext>) -> Self {
        self.themes = Some(themes);
        self
    }

    #[must_use]
    pub fn actions(mut self, actions: Arc<dyn ActionDispatcher>) -> Self {
        self.actions = Some(actions);
        self
    }

    #[must_use]
    pub fn tickets(mut self, tickets: Arc<dyn TicketIssuer>) -> Self {
        self.tickets = Some(tickets);
        self
    }

    #[must_use]
    pub fn ajax_error_reporter(mut self, reporter: Arc<dyn AjaxErrorReporter>) -> Self {
        self.ajax_errors = Some(reporter);
        self
    }

    #[must_use]
    pub fn hooks(mut self, hooks: Arc<CmsHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Overrides the cache built from the cache settings.
    #[must_use]
    pub fn cache(mut self, cache: CacheKeyService) -> Self {
        self.cache = Some(cache);
        self
    }

    /// # Errors
    ///
    /// A configuration error if the cache backend cannot be built.
    pub fn build(self) -> CmsResult<Site> {
        let versions = match self.versions {
            Some(versions) => versions,
            None => Arc::new(ContentVersions::from_settings(&self.settings.cache)?),
        };
        let cache = match self.cache {
            Some(cache) => cache,
            None => CacheKeyService::from_settings(&self.settings.cache, Arc::clone(&versions))?,
        };
        let repository = self
            .repository
            .unwrap_or_else(|| Arc::new(InMemoryRepository::new(Arc::clone(&versions))));
        let selector = EngineSelector::from_settings(&self.settings.templating);
        let code_engine = CodeEngine::new(self.settings.templating.inline_code_allowed);

        Ok(Site {
            inner: Arc::new(SiteInner {
                repository,
                themes: self.themes.unwrap_or_else(|| Arc::new(StaticThemes::disabled())),
                actions: self.actions.unwrap_or_else(|| Arc::new(ActionRegistry::new())),
                tickets: self.tickets.unwrap_or_else(|| Arc::new(UuidTicketIssuer)),
                ajax_errors: self
                    .ajax_errors
                    .unwrap_or_else(|| Arc::new(DefaultAjaxErrorReporter)),
                hooks: self.hooks.unwrap_or_default(),
                cache,
                selector,
                code_engine,
                handlers: AjaxHandlerRegistry::new(),
                settings: Arc::new(self.settings),
            }),
        })
    }
}
