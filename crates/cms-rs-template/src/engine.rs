//! The engine abstraction.
//!
//! A [`TemplateEngine`] turns a [`SourceUnit`] plus a variable [`Scope`] into
//! output. Engines never write to a response directly: everything they emit,
//! and every nested render they request, goes through [`TemplateServices`],
//! which the page controller implements. This keeps output ordering and
//! call-stack tracking in one place regardless of which engine is active.

use std::sync::Arc;

use cms_rs_core::call_stack::ObjectType;
use cms_rs_core::content::EngineKind;
use cms_rs_core::options::{CombineOptions, PartialOptions};
use cms_rs_core::{CmsResult, Scope};

/// One piece of content to evaluate.
#[derive(Debug, Clone, Copy)]
pub struct SourceUnit<'a> {
    pub object_type: ObjectType,
    /// Display name, used in diagnostics and as the engine's template name.
    pub name: &'a str,
    pub source: &'a str,
}

impl<'a> SourceUnit<'a> {
    pub const fn new(object_type: ObjectType, name: &'a str, source: &'a str) -> Self {
        Self {
            object_type,
            name,
            source,
        }
    }
}

/// The surface a template can call back into while it is being evaluated.
///
/// Implementations must not hold internal locks while running a nested
/// evaluation: `render_partial` and friends re-enter the engine.
pub trait TemplateServices: Send + Sync {
    /// Appends text to the current output target.
    fn write(&self, text: &str);

    /// Redirects subsequent writes into a fresh capture buffer.
    fn begin_capture(&self);

    /// Closes the innermost capture buffer and returns its contents.
    fn end_capture(&self) -> String;

    /// Renders a named partial. Returns `Some(output)` when
    /// `options.return_output` is set, otherwise emits and returns `None`.
    fn render_partial(
        &self,
        name: &str,
        params: Scope,
        options: PartialOptions,
    ) -> CmsResult<Option<String>>;

    /// Emits the evaluated page content (inside a layout).
    fn render_page(&self) -> CmsResult<()>;

    /// Emits a page block by code, or `default` when the page has no such block.
    fn render_block(&self, code: &str, default: Option<&str>) -> CmsResult<()>;

    /// Emits the page head block.
    fn render_head(&self) -> CmsResult<()>;

    /// A positional URL parameter. Negative indexes count from the end.
    fn request_param(&self, index: i64, default: Option<&str>) -> Option<String>;

    /// A redirect target taken from the URL parameter at `index`, else `default`.
    fn redirect_url(&self, default: &str, index: i64) -> String;

    fn js_combine(&self, files: &[String], options: &CombineOptions, show_tag: bool) -> String;

    fn css_combine(&self, files: &[String], options: &CombineOptions, show_tag: bool) -> String;

    /// The content of the site-wide block with `code`, if there is one.
    fn global_content(&self, code: &str) -> Option<String>;

    /// The request-scoped data bag shared by actions and templates.
    fn data(&self) -> Scope;

    fn set_data(&self, key: &str, value: serde_json::Value);
}

/// Runs `f` with output captured and returns what it emitted.
///
/// The capture is closed on both paths so an error cannot leave a dangling
/// buffer on the output stack.
///
/// # Errors
///
/// Propagates the error returned by `f`.
pub fn capture<F>(services: &dyn TemplateServices, f: F) -> CmsResult<String>
where
    F: FnOnce() -> CmsResult<()>,
{
    services.begin_capture();
    let result = f();
    let output = services.end_capture();
    result.map(|()| output)
}

/// A templating engine.
pub trait TemplateEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Evaluates `unit` with the variables in `scope`, emitting output
    /// through `services`.
    ///
    /// # Errors
    ///
    /// Engine diagnostics come back as [`cms_rs_core::CmsError::Engine`];
    /// errors raised by nested service calls are propagated unchanged.
    fn render(
        &self,
        unit: &SourceUnit<'_>,
        scope: &Scope,
        services: &Arc<dyn TemplateServices>,
    ) -> CmsResult<()>;
}
