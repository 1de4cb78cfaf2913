//! The page renderer.
//!
//! A display runs security, content evaluation, layout wrapping and tracking
//! injection in that order. Any failure past routing discards every byte
//! rendered so far before the error is returned.

use std::sync::Arc;
use std::time::Duration;

use cms_rs_cache::CacheKey;
use cms_rs_core::{CmsResult, ObjectType, Page, Scope};
use cms_rs_signals::{PageContentEvent, PageEvent, TrackingCodeEvent};

use crate::controller::Controller;
use crate::outcome::RenderOutcome;
use crate::security::SecurityVerdict;
use crate::tracking;

impl From<SecurityVerdict> for RenderOutcome {
    fn from(verdict: SecurityVerdict) -> Self {
        match verdict {
            SecurityVerdict::Redirect(url) => Self::Redirect(url),
            SecurityVerdict::Denied => Self::Denied,
        }
    }
}

impl Controller {
    /// Renders the routed page.
    ///
    /// # Errors
    ///
    /// Every unrecoverable failure. Output buffers are unwound first, so
    /// nothing rendered before the failure survives.
    pub fn display(&self) -> CmsResult<RenderOutcome> {
        let result = self.display_page();
        if result.is_err() {
            self.unwind();
        }
        self.state().call_stack.clear();
        result
    }

    fn display_page(&self) -> CmsResult<RenderOutcome> {
        if let Some(verdict) = self.apply_security() {
            return Ok(verdict.into());
        }

        let analytics = &self.site().settings().analytics;
        if analytics.enabled && !self.page().disable_analytics {
            self.add_tracking_code(tracking::opening_snippet(analytics));
        }

        let hooks = self.site().hooks();
        if let Some(replacement) = hooks.before_display.first(&self.page_event()) {
            self.state().page = Arc::new(replacement);
        }

        let page = self.page();
        tracing::info!(url = page.url.as_str(), page_id = page.id, "page_view");

        self.eval_page_content()?;

        let layout = page
            .layout_id
            .and_then(|id| self.site().repository().find_layout(self.content_scope(), id));
        let mut html = match layout {
            Some(layout) => cms_rs_template::capture(self, || {
                self.evaluate(ObjectType::Template, &layout.name, &layout.content, &Scope::new())
            })?,
            None => self.state().page_content.clone(),
        };

        let queued = !self.state().tracking_code.is_empty();
        if queued {
            self.add_tracking_code(tracking::closing_snippet(analytics));
            let code = self.state().tracking_code.join("\n");
            html = tracking::splice_before_head(&html, &code);
        }

        hooks.after_display.notify(&self.page_event());
        Ok(RenderOutcome::Rendered(html))
    }

    pub(crate) fn page_event(&self) -> PageEvent {
        PageEvent {
            page: self.page(),
            params: self.params().to_vec(),
        }
    }

    fn add_tracking_code(&self, code: String) {
        let event = TrackingCodeEvent {
            page: self.page(),
            code,
        };
        if self.site().hooks().before_tracking_code_include.all_agree(&event) {
            self.state().tracking_code.push(event.code);
        }
    }

    /// Produces the page content: a hook answer, a cached copy, or a live
    /// evaluation of the action steps and the page template.
    fn eval_page_content(&self) -> CmsResult<()> {
        let page = self.page();
        let hooks = self.site().hooks();
        let event = self.page_event();

        if let Some(content) = hooks
            .before_eval_page_content
            .first(&event)
            .filter(|content| !content.is_empty())
        {
            self.state().page_content = content;
            return Ok(());
        }

        let key = self.page_cache_key(&page, &event);
        let cached = key
            .as_ref()
            .and_then(|(key, _)| self.site().cache().get(key));
        let content = match cached {
            Some(content) => content,
            None => {
                let content = cms_rs_template::capture(self, || self.run_page_steps(&page))?;
                if let Some((key, ttl)) = &key {
                    self.site().cache().set(key, &content, *ttl);
                }
                content
            }
        };

        hooks.after_eval_page_content.notify(&PageContentEvent {
            page,
            content: content.clone(),
        });
        self.state().page_content = content;
        Ok(())
    }

    fn page_cache_key(&self, page: &Page, event: &PageEvent) -> Option<(CacheKey, Option<Duration>)> {
        let policy = self
            .site()
            .hooks()
            .page_cache_policy
            .first(event)
            .or_else(|| page.cache_policy.clone())?;

        let mut vary_by = policy.vary_by.clone();
        if !vary_by.iter().any(|dimension| dimension == "url") {
            vary_by.push("url".to_string());
        }
        let prefix = self.cache_prefix(&format!("page_{}", page.url.replace('/', "")));
        let key = self
            .site()
            .cache()
            .build_key(&prefix, &vary_by, &policy.versions, self);
        Some((key, policy.ttl()))
    }

    fn run_page_steps(&self, page: &Page) -> CmsResult<()> {
        self.run_action_code(ObjectType::PreActionCode, &page.pre_action)?;
        self.run_business_action(page)?;
        self.run_action_code(ObjectType::PostActionCode, &page.post_action)?;
        self.evaluate(ObjectType::Page, &self.page_label(), &page.content, &Scope::new())
    }

    fn run_action_code(&self, object_type: ObjectType, source: &str) -> CmsResult<()> {
        if !self.site().code_engine().inline_code_allowed() || source.trim().is_empty() {
            return Ok(());
        }
        self.recoverable(|| self.evaluate(object_type, &self.page_label(), source, &Scope::new()))
    }

    /// Runs the page's bound business action, if it has one. Recoverable
    /// failures become the flash message.
    pub(crate) fn run_business_action(&self, page: &Page) -> CmsResult<()> {
        let Some(reference) = page.business_action() else {
            return Ok(());
        };
        self.recoverable(|| self.site().actions().execute_action(reference, self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cms_rs_core::{CmsError, CmsRequest, Layout, Settings};
    use cms_rs_signals::CmsHooks;

    use crate::repository::InMemoryRepository;
    use crate::site::Site;

    fn site(repo: Arc<InMemoryRepository>, hooks: Arc<CmsHooks>, settings: Settings) -> Site {
        Site::builder(settings)
            .versions(Arc::clone(repo.versions()))
            .repository(repo)
            .hooks(hooks)
            .build()
            .unwrap()
    }

    fn repo_with(page: Page) -> Arc<InMemoryRepository> {
        let repo = Arc::new(InMemoryRepository::new(Arc::default()));
        repo.insert_page(page).unwrap();
        repo
    }

    #[test]
    fn test_page_without_layout_is_raw_content() {
        let mut page = Page::new(1, "/", "Home");
        page.content = "<p><?= 1 + 1 ?></p>".into();
        let site = site(repo_with(page), Arc::default(), Settings::default());
        assert_eq!(
            site.display(CmsRequest::new("/")).unwrap(),
            RenderOutcome::Rendered("<p>2</p>".into())
        );
    }

    #[test]
    fn test_layout_wraps_page_and_blocks() {
        let mut page = Page::new(1, "/", "Home");
        page.content = "body".into();
        page.head = "<title>Home</title>".into();
        page.blocks = vec![cms_rs_core::PageBlock::new("Sidebar", "side")];
        page.layout_id = Some(7);
        let repo = repo_with(page);
        repo.insert_layout(Layout::new(
            7,
            "main",
            "<head><? $this->render_head() ?></head>[<? $this->render_page() ?>]\
             <? $this->render_block('sidebar') ?>|<? $this->render_block('footer', 'none') ?>",
        ));
        let site = site(repo, Arc::default(), Settings::default());
        assert_eq!(
            site.display(CmsRequest::new("/")).unwrap().body(),
            Some("<head><title>Home</title></head>[body]side|none")
        );
    }

    #[test]
    fn test_before_eval_hook_supplies_content() {
        let mut page = Page::new(1, "/", "Home");
        page.content = "<?= $missing ?>".into();
        let hooks = Arc::new(CmsHooks::new());
        hooks
            .before_eval_page_content
            .connect("static", Arc::new(|_: &PageEvent| Some("prebuilt".to_string())));
        let site = site(repo_with(page), hooks, Settings::default());
        assert_eq!(
            site.display(CmsRequest::new("/")).unwrap().body(),
            Some("prebuilt")
        );
    }

    #[test]
    fn test_failure_unwinds_output() {
        let mut page = Page::new(1, "/", "Home");
        page.content = "visible <?= $missing ?>".into();
        let site = site(repo_with(page), Arc::default(), Settings::default());
        let controller = site.controller(CmsRequest::new("/")).unwrap();
        let err = controller.display().unwrap_err();
        assert!(matches!(err, CmsError::Execution(_)));
        assert_eq!(controller.take_output(), "");
        assert_eq!(controller.call_stack_depth(), 0);
    }

    #[test]
    fn test_tracking_veto_drops_snippets() {
        let mut page = Page::new(1, "/", "Home");
        page.content = "<html><head></head></html>".into();
        let mut settings = Settings::default();
        settings.analytics.enabled = true;
        settings.analytics.property_id = "UA-1".into();
        let hooks = Arc::new(CmsHooks::new());
        hooks
            .before_tracking_code_include
            .connect("consent", Arc::new(|_: &TrackingCodeEvent| Some(false)));
        let site = site(repo_with(page), hooks, settings);
        assert_eq!(
            site.display(CmsRequest::new("/")).unwrap().body(),
            Some("<html><head></head></html>")
        );
    }

    #[test]
    fn test_analytics_disabled_per_page() {
        let mut page = Page::new(1, "/", "Home");
        page.content = "<head></head>".into();
        page.disable_analytics = true;
        let mut settings = Settings::default();
        settings.analytics.enabled = true;
        let site = site(repo_with(page), Arc::default(), settings);
        assert_eq!(site.display(CmsRequest::new("/")).unwrap().body(), Some("<head></head>"));
    }
}
