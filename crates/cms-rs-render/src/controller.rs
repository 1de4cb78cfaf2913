//! The per-request controller.
//!
//! A [`Controller`] owns everything that belongs to one request: the page
//! being rendered, the output capture stack, the call stack used for error
//! attribution, the data bag shared by actions and templates, and the queued
//! tracking code. It implements [`TemplateServices`], so both engines call
//! back into it for nested partials, blocks and helpers.
//!
//! Request state sits behind a single mutex that is only ever held for the
//! duration of one field access. Nested evaluations re-enter the controller,
//! so no guard may live across a call into an engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::Value;

use cms_rs_core::call_stack::CallStack;
use cms_rs_core::content::{EngineKind, ThemeId};
use cms_rs_core::options::{CombineOptions, PartialOptions, ResourceKind};
use cms_rs_core::request::{root_url, urldecode};
use cms_rs_core::{CmsError, CmsRequest, CmsResult, Customer, ObjectType, Page, Scope};
use cms_rs_signals::ResourceCombineEvent;
use cms_rs_template::TemplateServices;

use crate::resources::combine_reference;
use crate::site::Site;

/// Data bag key under which the last recoverable error message is exposed.
pub const FLASH_DATA_KEY: &str = "flash_error";

pub(crate) struct RequestState {
    pub(crate) page: Arc<Page>,
    pub(crate) buffers: Vec<String>,
    pub(crate) call_stack: CallStack,
    pub(crate) data: Scope,
    pub(crate) flash: Option<String>,
    pub(crate) page_content: String,
    pub(crate) blocks: HashMap<String, String>,
    pub(crate) tracking_code: Vec<String>,
    pub(crate) theme_kind: Option<EngineKind>,
}

/// Renders one request against a [`Site`].
pub struct Controller {
    site: Site,
    request: CmsRequest,
    params: Vec<String>,
    state: Mutex<RequestState>,
    this: Weak<Controller>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("path", &self.request.path)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Controller {
    pub fn new(site: Site, request: CmsRequest, page: Arc<Page>, params: Vec<String>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            site,
            request,
            params,
            state: Mutex::new(RequestState {
                page,
                buffers: vec![String::new()],
                call_stack: CallStack::new(),
                data: Scope::new(),
                flash: None,
                page_content: String::new(),
                blocks: HashMap::new(),
                tracking_code: Vec::new(),
                theme_kind: None,
            }),
            this: this.clone(),
        })
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn request(&self) -> &CmsRequest {
        &self.request
    }

    /// URL segments that followed the page URL.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn page(&self) -> Arc<Page> {
        Arc::clone(&self.state().page)
    }

    pub fn customer(&self) -> Option<&Customer> {
        self.request.customer.as_ref()
    }

    pub fn customer_group_id(&self) -> cms_rs_core::content::GroupId {
        self.site.customer_group_id(self.customer())
    }

    /// The message of the last recoverable error, if any.
    pub fn flash(&self) -> Option<String> {
        self.state().flash.clone()
    }

    /// Number of frames currently on the call stack.
    pub fn call_stack_depth(&self) -> usize {
        self.state().call_stack.len()
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, RequestState> {
        self.state.lock().expect("request state lock poisoned")
    }

    /// A strong handle to this controller, for engines that need one.
    pub(crate) fn handle(&self) -> CmsResult<Arc<dyn TemplateServices>> {
        let this: Arc<Self> = self
            .this
            .upgrade()
            .ok_or_else(|| CmsError::Internal("controller dropped during a render".to_string()))?;
        Ok(this)
    }

    pub(crate) fn content_scope(&self) -> Option<ThemeId> {
        self.site.themes().content_scope()
    }

    /// The display name used for page-level frames.
    pub(crate) fn page_label(&self) -> String {
        self.page().navigation_label().to_string()
    }

    /// The theme's engine choice, fixed on first use for the whole request.
    pub(crate) fn theme_kind(&self) -> EngineKind {
        if let Some(kind) = self.state().theme_kind {
            return kind;
        }
        let themes = self.site.themes();
        let kind = self
            .site
            .selector()
            .theme_kind(themes.is_theming_enabled(), themes.active_theme().as_deref());
        tracing::debug!(engine = %kind, "templating engine selected");
        *self.state().theme_kind.get_or_insert(kind)
    }

    /// Stores a recoverable error as the flash message.
    pub(crate) fn record_flash(&self, err: &CmsError) {
        let message = match err {
            CmsError::Validation(e) => e.message.clone(),
            other => other.to_string(),
        };
        tracing::debug!(message = message.as_str(), "recoverable error recorded");
        let mut state = self.state();
        state
            .data
            .insert(FLASH_DATA_KEY.to_string(), Value::String(message.clone()));
        state.flash = Some(message);
    }

    /// Runs `f`, turning a recoverable failure into a flash message and
    /// dropping the frames it left behind.
    pub(crate) fn recoverable<F>(&self, f: F) -> CmsResult<()>
    where
        F: FnOnce() -> CmsResult<()>,
    {
        let depth = self.call_stack_depth();
        match f() {
            Err(err) if err.is_recoverable() => {
                self.record_flash(&err);
                self.state().call_stack.truncate(depth);
                Ok(())
            }
            other => other,
        }
    }

    /// Discards every open capture buffer and the root output.
    pub(crate) fn unwind(&self) {
        let mut state = self.state();
        state.buffers.truncate(1);
        if let Some(root) = state.buffers.first_mut() {
            root.clear();
        }
    }

    /// Takes the root output buffer.
    pub(crate) fn take_output(&self) -> String {
        let mut state = self.state();
        state.buffers.truncate(1);
        state.buffers.first_mut().map(std::mem::take).unwrap_or_default()
    }

    fn resource_combine(
        &self,
        kind: ResourceKind,
        files: &[String],
        options: &CombineOptions,
        show_tag: bool,
    ) -> String {
        let hook = &self.site.hooks().before_resource_combine;
        if hook.receiver_count() > 0 {
            let event = ResourceCombineEvent {
                kind,
                files: files.to_vec(),
                options: options.clone(),
                show_tag,
            };
            if let Some(markup) = hook.first(&event).filter(|m| !m.is_empty()) {
                return markup;
            }
        }

        let settings = self.site.settings();
        let themes = self.site.themes();
        let theme_path = if themes.is_theming_enabled() {
            themes.active_theme().and_then(|t| t.resources_path.clone())
        } else {
            None
        };
        let base = theme_path.unwrap_or_else(|| {
            format!("/{}", settings.resources.resources_dir_path.trim_matches('/'))
        });

        combine_reference(kind, files, options, show_tag, &settings.security.root_path, &base)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "resource combine failed");
                String::new()
            })
    }
}

impl TemplateServices for Controller {
    fn write(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut state = self.state();
        match state.buffers.last_mut() {
            Some(buffer) => buffer.push_str(text),
            None => state.buffers.push(text.to_string()),
        }
    }

    fn begin_capture(&self) {
        self.state().buffers.push(String::new());
    }

    fn end_capture(&self) -> String {
        let mut state = self.state();
        if state.buffers.len() > 1 {
            state.buffers.pop().unwrap_or_default()
        } else {
            state.buffers.first_mut().map(std::mem::take).unwrap_or_default()
        }
    }

    fn render_partial(
        &self,
        name: &str,
        params: Scope,
        options: PartialOptions,
    ) -> CmsResult<Option<String>> {
        self.render_partial_with(name, params, options)
    }

    fn render_page(&self) -> CmsResult<()> {
        let content = self.state().page_content.clone();
        self.write(&content);
        Ok(())
    }

    fn render_block(&self, code: &str, default: Option<&str>) -> CmsResult<()> {
        let code = code.trim().to_lowercase();
        let cached = self.state().blocks.get(&code).cloned();
        if let Some(content) = cached {
            self.write(&content);
            return Ok(());
        }

        let page = self.page();
        let Some(block) = page.block(&code) else {
            self.write(default.unwrap_or_default());
            return Ok(());
        };
        let content = cms_rs_template::capture(self, || {
            self.evaluate(ObjectType::Block, &code, &block.source, &Scope::new())
        })?;
        self.state().blocks.insert(code, content.clone());
        self.write(&content);
        Ok(())
    }

    fn render_head(&self) -> CmsResult<()> {
        let page = self.page();
        self.evaluate(ObjectType::Head, &self.page_label(), &page.head, &Scope::new())
    }

    fn request_param(&self, index: i64, default: Option<&str>) -> Option<String> {
        let len = i64::try_from(self.params.len()).unwrap_or(i64::MAX);
        let index = if index < 0 { len + index } else { index };
        usize::try_from(index)
            .ok()
            .and_then(|i| self.params.get(i).cloned())
            .or_else(|| default.map(ToString::to_string))
    }

    fn redirect_url(&self, default: &str, index: i64) -> String {
        match self.request_param(index, None) {
            Some(param) if !param.is_empty() => root_url(
                &self.site.settings().security.root_path,
                &urldecode(&param).replace('|', "/"),
            ),
            _ => default.to_string(),
        }
    }

    fn js_combine(&self, files: &[String], options: &CombineOptions, show_tag: bool) -> String {
        self.resource_combine(ResourceKind::Javascript, files, options, show_tag)
    }

    fn css_combine(&self, files: &[String], options: &CombineOptions, show_tag: bool) -> String {
        self.resource_combine(ResourceKind::Css, files, options, show_tag)
    }

    fn global_content(&self, code: &str) -> Option<String> {
        let block = self.site.repository().find_global_block(self.content_scope(), code);
        if block.is_none() {
            tracing::debug!(code, "global content block not found");
        }
        block.map(|block| block.content.clone())
    }

    fn data(&self) -> Scope {
        self.state().data.clone()
    }

    fn set_data(&self, key: &str, value: Value) {
        self.state().data.insert(key.to_string(), value);
    }
}
