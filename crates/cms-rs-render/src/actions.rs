//! Business actions and module-provided AJAX handlers.
//!
//! Pages bind a business action by reference (e.g. `shop:product`). AJAX
//! handler names containing a module separator (`shop:on_addToCart`) are
//! dispatched here too; plain names resolve to the page's own handler code.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use cms_rs_core::{CmsError, CmsResult};

use crate::controller::Controller;

/// A business action or module AJAX handler.
///
/// Actions talk to the request through the [`Controller`]: they read request
/// fields, put values into the data bag and may write output. Returning
/// [`CmsError::Validation`] or [`CmsError::BusinessLogic`] records a flash
/// message without aborting the render.
pub type ActionFn = Arc<dyn Fn(&Controller) -> CmsResult<()> + Send + Sync>;

/// Dispatches action references and module AJAX handler names.
pub trait ActionDispatcher: Send + Sync {
    fn execute_action(&self, reference: &str, controller: &Controller) -> CmsResult<()>;

    fn execute_ajax_handler(&self, name: &str, controller: &Controller) -> CmsResult<()>;
}

/// An [`ActionDispatcher`] backed by name-keyed tables.
///
/// ```
/// use std::sync::Arc;
/// use cms_rs_render::actions::ActionRegistry;
/// use cms_rs_core::CmsResult;
/// use cms_rs_render::Controller;
/// use cms_rs_template::TemplateServices;
///
/// let registry = ActionRegistry::new();
/// registry.register_action("blog:post", Arc::new(|controller: &Controller| -> CmsResult<()> {
///     controller.set_data("post_title", serde_json::json!("Hello"));
///     Ok(())
/// }));
/// assert!(registry.has_action("blog:post"));
/// ```
#[derive(Default)]
pub struct ActionRegistry {
    actions: RwLock<HashMap<String, ActionFn>>,
    ajax_handlers: RwLock<HashMap<String, ActionFn>>,
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut actions: Vec<String> = self
            .actions
            .read()
            .expect("action registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        actions.sort();
        f.debug_struct("ActionRegistry")
            .field("actions", &actions)
            .finish_non_exhaustive()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_action(&self, reference: impl Into<String>, action: ActionFn) {
        self.actions
            .write()
            .expect("action registry lock poisoned")
            .insert(reference.into(), action);
    }

    pub fn register_ajax_handler(&self, name: impl Into<String>, handler: ActionFn) {
        self.ajax_handlers
            .write()
            .expect("action registry lock poisoned")
            .insert(name.into(), handler);
    }

    pub fn has_action(&self, reference: &str) -> bool {
        self.actions
            .read()
            .expect("action registry lock poisoned")
            .contains_key(reference)
    }

    fn lookup(table: &RwLock<HashMap<String, ActionFn>>, name: &str) -> Option<ActionFn> {
        table
            .read()
            .expect("action registry lock poisoned")
            .get(name)
            .cloned()
    }
}

impl ActionDispatcher for ActionRegistry {
    fn execute_action(&self, reference: &str, controller: &Controller) -> CmsResult<()> {
        let action = Self::lookup(&self.actions, reference)
            .ok_or_else(|| CmsError::NotFound(format!("Action \"{reference}\" not found")))?;
        tracing::debug!(action = reference, "executing business action");
        action(controller)
    }

    fn execute_ajax_handler(&self, name: &str, controller: &Controller) -> CmsResult<()> {
        let handler = Self::lookup(&self.ajax_handlers, name)
            .ok_or_else(|| CmsError::NotFound(format!("AJAX handler not found: {name}")))?;
        tracing::debug!(handler = name, "executing module AJAX handler");
        handler(controller)
    }
}
