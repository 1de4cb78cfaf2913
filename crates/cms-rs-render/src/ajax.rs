//! The AJAX dispatcher.
//!
//! A handler runs first, then each requested element update is rendered as
//! a `>>element-id<<` marker followed by the partial's output. The client
//! splits the stream on the markers.

use serde_json::Value;

use cms_rs_core::call_stack::CallStackFrame;
use cms_rs_core::{CmsError, CmsResult, ObjectType, PartialOptions, Scope};
use cms_rs_template::TemplateServices;

use crate::controller::Controller;
use crate::outcome::AjaxOutcome;
use crate::security::SecurityVerdict;

/// The handler name that runs the page's own business action.
pub const DEFAULT_ACTION_HANDLER: &str = "on_action";

impl Controller {
    /// Runs `handler` and renders `update_elements` (element id, partial
    /// name) in the order given.
    ///
    /// Failures never escape: they unwind the output and are serialized by
    /// the site's [`AjaxErrorReporter`](crate::outcome::AjaxErrorReporter).
    pub fn handle_ajax(&self, handler: &str, update_elements: &[(String, String)]) -> AjaxOutcome {
        if let Some(verdict) = self.apply_security() {
            return match verdict {
                SecurityVerdict::Redirect(url) => AjaxOutcome::Redirect(url),
                SecurityVerdict::Denied => AjaxOutcome::Denied,
            };
        }

        let outcome = match self.dispatch(handler, update_elements) {
            Ok(()) => AjaxOutcome::Patch(self.take_output()),
            Err(err) => {
                self.unwind();
                tracing::debug!(handler, error = %err, "AJAX request failed");
                let debug = self.site().settings().debug;
                AjaxOutcome::Error(self.site().ajax_errors().report(&err, debug))
            }
        };
        self.state().call_stack.clear();
        outcome
    }

    fn dispatch(&self, handler: &str, update_elements: &[(String, String)]) -> CmsResult<()> {
        let hooks = self.site().hooks();
        hooks.before_handle_ajax.notify(&self.page_event());

        if handler == DEFAULT_ACTION_HANDLER {
            self.run_business_action(&self.page())?;
        } else if handler.contains(':') {
            self.recoverable(|| self.site().actions().execute_ajax_handler(handler, self))?;
        } else {
            self.recoverable(|| self.run_local_handler(handler))?;
        }

        for (element, partial) in update_elements {
            if element.is_empty() {
                continue;
            }
            self.write(&format!(">>{element}<<"));
            self.render_partial_with(partial, Scope::new(), PartialOptions::default())?;
        }

        hooks.after_handle_ajax.notify(&self.page_event());
        Ok(())
    }

    /// Invokes a handler function declared in the page's own handler source.
    fn run_local_handler(&self, name: &str) -> CmsResult<()> {
        let page = self.page();
        let not_found = || CmsError::NotFound(format!("AJAX handler not found: {name}"));
        let code_engine = self.site().code_engine();
        if !code_engine.inline_code_allowed() || page.ajax_handlers.trim().is_empty() {
            return Err(not_found());
        }

        let label = self.page_label();
        self.state().call_stack.push(CallStackFrame::new(
            ObjectType::AjaxHandlers,
            label,
            page.ajax_handlers.as_str(),
        ));
        let table = self
            .site()
            .handlers()
            .load(&page, code_engine)
            .map_err(|err| self.attribute(err))?;
        if !table.contains(name) {
            return Err(not_found());
        }

        let page_value = serde_json::to_value(page.as_ref())?;
        let params = Value::from(self.params().to_vec());
        table
            .invoke(name, page_value, params, self)
            .map_err(|err| self.attribute(err))?;
        self.state().call_stack.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use cms_rs_core::{CmsRequest, Page, Partial, Settings};
    use serde_json::json;

    use crate::actions::ActionRegistry;
    use crate::repository::InMemoryRepository;
    use crate::site::Site;

    fn site(page: Page, actions: Arc<ActionRegistry>) -> Site {
        let repo = Arc::new(InMemoryRepository::new(Arc::default()));
        repo.insert_page(page).unwrap();
        repo.insert_partial(Partial::new("cart", "items: <?= $count ?>")).unwrap();
        repo.insert_partial(Partial::new("total", "total")).unwrap();
        let settings = Settings {
            debug: false,
            ..Settings::default()
        };
        Site::builder(settings)
            .repository(repo)
            .actions(actions)
            .build()
            .unwrap()
    }

    fn updates(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(id, partial)| ((*id).to_string(), (*partial).to_string()))
            .collect()
    }

    #[test]
    fn test_local_handler_then_updates_in_order() {
        let mut page = Page::new(1, "/cart", "Cart");
        page.ajax_handlers = "function on_add($page, $params) { $this->data['count'] = 3; echo 'ok'; }".into();
        let site = site(page, Arc::default());
        let outcome = site
            .handle_ajax(
                CmsRequest::new("/cart"),
                "on_add",
                &updates(&[("total-box", "total"), ("", "cart"), ("cart-box", "cart")]),
            )
            .unwrap();
        assert_eq!(
            outcome,
            AjaxOutcome::Patch("ok>>total-box<<total>>cart-box<<items: 3".into())
        );
    }

    #[test]
    fn test_local_handler_completes_without_updates() {
        let mut page = Page::new(1, "/ping", "Ping");
        page.ajax_handlers = "function on_ping($page, $params) { echo 'pong'; }".into();
        let site = site(page, Arc::default());

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let outcome = site.handle_ajax(CmsRequest::new("/ping"), "on_ping", &[]);
            let _ = tx.send(outcome);
        });
        let outcome = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("local handler did not return")
            .unwrap();
        assert_eq!(outcome, AjaxOutcome::Patch("pong".into()));
    }

    #[test]
    fn test_unknown_local_handler_is_reported() {
        let mut page = Page::new(1, "/cart", "Cart");
        page.ajax_handlers = "function on_add() {}".into();
        let site = site(page, Arc::default());
        let outcome = site
            .handle_ajax(CmsRequest::new("/cart"), "on_remove", &[])
            .unwrap();
        assert_eq!(
            outcome,
            AjaxOutcome::Error("@AJAX-ERROR@AJAX handler not found: on_remove".into())
        );
    }

    #[test]
    fn test_module_handler_and_recoverable_flash() {
        let actions = Arc::new(ActionRegistry::new());
        actions.register_ajax_handler(
            "shop:on_checkout",
            Arc::new(|controller: &Controller| -> CmsResult<()> {
                controller.set_data("count", json!(0));
                Err(CmsError::BusinessLogic("Cart is empty".into()))
            }),
        );
        let site = site(Page::new(1, "/cart", "Cart"), actions);
        let controller = site.controller(CmsRequest::new("/cart")).unwrap();
        let outcome = controller.handle_ajax("shop:on_checkout", &updates(&[("cart-box", "cart")]));
        assert_eq!(outcome, AjaxOutcome::Patch(">>cart-box<<items: 0".into()));
        assert_eq!(controller.flash().as_deref(), Some("Cart is empty"));
    }

    #[test]
    fn test_failed_update_discards_patch() {
        let site = site(Page::new(1, "/cart", "Cart"), Arc::default());
        let outcome = site
            .handle_ajax(
                CmsRequest::new("/cart"),
                DEFAULT_ACTION_HANDLER,
                &updates(&[("a", "total"), ("b", "missing")]),
            )
            .unwrap();
        assert_eq!(
            outcome,
            AjaxOutcome::Error("@AJAX-ERROR@Partial \"missing\" not found".into())
        );
    }
}
