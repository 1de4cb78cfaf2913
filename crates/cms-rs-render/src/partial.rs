//! The partial renderer.

use cms_rs_core::content::normalize_partial_name;
use cms_rs_core::error::ExecutionError;
use cms_rs_core::{CmsError, CmsResult, ObjectType, PartialOptions, Scope};
use cms_rs_signals::PartialRenderEvent;
use cms_rs_template::TemplateServices;

use crate::controller::Controller;

impl Controller {
    /// Renders the partial `name`, emitting its output or, with
    /// `return_output`, returning it instead.
    ///
    /// # Errors
    ///
    /// A missing partial is [`CmsError::NotFound`] at the top level and an
    /// [`CmsError::Execution`] inside another evaluation, so it is reported
    /// against the source that asked for it.
    pub fn render_partial_with(
        &self,
        name: &str,
        params: Scope,
        options: PartialOptions,
    ) -> CmsResult<Option<String>> {
        let name = normalize_partial_name(name);
        let hooks = self.site().hooks();
        let event = PartialRenderEvent {
            name: name.clone(),
            params,
            options,
        };
        hooks.before_render_partial.notify(&event);

        let result = if event.options.return_output {
            cms_rs_template::capture(self, || self.emit_partial(&name, &event.params, &event.options))
                .map(Some)
        } else {
            self.emit_partial(&name, &event.params, &event.options).map(|()| None)
        };

        if result.is_ok() {
            hooks.after_render_partial.notify(&event);
        }
        result
    }

    fn emit_partial(&self, name: &str, params: &Scope, options: &PartialOptions) -> CmsResult<()> {
        let key = options.cache.then(|| {
            let prefix = self.cache_prefix(&format!("partial_{}", name.replace(':', "-")));
            self.site().cache().build_key(
                &prefix,
                &options.cache_vary_by,
                &options.cache_versions,
                self,
            )
        });
        if let Some(cached) = key.as_ref().and_then(|key| self.site().cache().get(key)) {
            self.write(&cached);
            return Ok(());
        }

        let partial = self
            .site()
            .repository()
            .find_partial(self.content_scope(), name)
            .ok_or_else(|| self.partial_not_found(name))?;

        match key {
            Some(key) => {
                let output = cms_rs_template::capture(self, || {
                    self.evaluate(ObjectType::Partial, &partial.name, &partial.content, params)
                })?;
                self.site().cache().set(&key, &output, options.ttl());
                self.write(&output);
                Ok(())
            }
            None => self.evaluate(ObjectType::Partial, &partial.name, &partial.content, params),
        }
    }

    fn partial_not_found(&self, name: &str) -> CmsError {
        let message = format!("Partial \"{name}\" not found");
        let snapshot = self.state().call_stack.snapshot();
        if snapshot.is_empty() {
            CmsError::NotFound(message)
        } else {
            CmsError::Execution(ExecutionError::new(message, snapshot, None))
        }
    }

    /// Prefixes a cache key with the active theme code, so themes never
    /// share cached output.
    pub(crate) fn cache_prefix(&self, base: &str) -> String {
        let themes = self.site().themes();
        match themes.active_theme().filter(|_| themes.is_theming_enabled()) {
            Some(theme) => format!("{}-{base}", theme.code),
            None => base.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use cms_rs_core::{CmsRequest, Page, Partial, Settings};
    use cms_rs_signals::CmsHooks;
    use serde_json::json;

    use crate::repository::InMemoryRepository;
    use crate::site::Site;

    fn controller(repo: Arc<InMemoryRepository>, hooks: Arc<CmsHooks>) -> Arc<Controller> {
        let site = Site::builder(Settings::default())
            .versions(Arc::clone(repo.versions()))
            .repository(repo)
            .hooks(hooks)
            .build()
            .unwrap();
        Controller::new(site, CmsRequest::new("/"), Arc::new(Page::new(1, "/", "Home")), vec![])
    }

    fn repo() -> Arc<InMemoryRepository> {
        Arc::new(InMemoryRepository::new(Arc::default()))
    }

    #[test]
    fn test_semicolon_names_resolve() {
        let repo = repo();
        repo.insert_partial(Partial::new("shop:cart", "cart")).unwrap();
        let c = controller(repo, Arc::default());
        c.render_partial("shop;cart", Scope::new(), PartialOptions::default())
            .unwrap();
        assert_eq!(c.take_output(), "cart");
    }

    #[test]
    fn test_return_output_captures() {
        let repo = repo();
        repo.insert_partial(Partial::new("price", "<?= $amount ?> EUR")).unwrap();
        let c = controller(repo, Arc::default());
        c.write("[");
        let mut params = Scope::new();
        params.insert("amount".into(), json!(12));
        let out = c
            .render_partial("price", params, PartialOptions::default().returning_output())
            .unwrap();
        assert_eq!(out.as_deref(), Some("12 EUR"));
        assert_eq!(c.take_output(), "[");
    }

    #[test]
    fn test_missing_partial_at_top_level_is_not_found() {
        let c = controller(repo(), Arc::default());
        let err = c
            .render_partial("nope", Scope::new(), PartialOptions::default())
            .unwrap_err();
        assert_eq!(err, CmsError::NotFound("Partial \"nope\" not found".into()));
    }

    #[test]
    fn test_missing_partial_inside_evaluation_is_attributed() {
        let repo = repo();
        repo.insert_partial(Partial::new("outer", "<? $this->render_partial('nope') ?>"))
            .unwrap();
        let c = controller(repo, Arc::default());
        let err = c
            .render_partial("outer", Scope::new(), PartialOptions::default())
            .unwrap_err();
        let CmsError::Execution(e) = err else {
            panic!("expected an execution error, got {err:?}");
        };
        assert_eq!(e.message, "Partial \"nope\" not found");
        assert_eq!(e.failing_frame().unwrap().name, "outer");
    }

    #[test]
    fn test_cached_partial_skips_evaluation() {
        let repo = repo();
        repo.insert_partial(Partial::new("menu", "<?= $label ?>")).unwrap();
        let hooks = Arc::new(CmsHooks::new());
        let evaluations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&evaluations);
        hooks.before_output_evaluated_code.connect(
            "count",
            Arc::new(move |_: &cms_rs_signals::EvaluatedOutputEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
                None
            }),
        );
        let c = controller(Arc::clone(&repo), hooks);
        let options = PartialOptions {
            cache: true,
            ..PartialOptions::default()
        };
        let mut params = Scope::new();
        params.insert("label".into(), json!("Shop"));

        c.render_partial("menu", params.clone(), options.clone()).unwrap();
        c.render_partial("menu", params, options).unwrap();
        assert_eq!(c.take_output(), "ShopShop");
        assert_eq!(evaluations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hooks_fire_around_render() {
        let repo = repo();
        repo.insert_partial(Partial::new("a", "a")).unwrap();
        let hooks = Arc::new(CmsHooks::new());
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let before = Arc::clone(&seen);
        hooks.before_render_partial.connect(
            "before",
            Arc::new(move |e: &PartialRenderEvent| {
                before.lock().unwrap().push(format!("before:{}", e.name));
                None
            }),
        );
        let after = Arc::clone(&seen);
        hooks.after_render_partial.connect(
            "after",
            Arc::new(move |e: &PartialRenderEvent| {
                after.lock().unwrap().push(format!("after:{}", e.name));
                None
            }),
        );
        let c = controller(repo, hooks);
        c.render_partial("a", Scope::new(), PartialOptions::default()).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["before:a", "after:a"]);
    }
}
