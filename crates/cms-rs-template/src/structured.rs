//! The structured template engine, backed by Tera.
//!
//! Templates see the evaluation scope as their context and can call back into
//! the page through registered functions:
//!
//! ```text
//! {{ render_partial(name="shop:cart", params=cart_params) }}
//! {{ render_block(code="sidebar", default="") }}
//! {{ js_combine(files=["jquery", "app.js"]) }}
//! ```
//!
//! Every function returns its output as a string (partials are rendered with
//! `return_output` forced on), so output lands exactly where the call
//! appears in the template. Errors raised by a callback travel through Tera's
//! error chain and are recovered unchanged on the way out.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tera::{Context, Tera};

use cms_rs_core::content::EngineKind;
use cms_rs_core::error::EngineError;
use cms_rs_core::options::{is_truthy, CombineOptions, PartialOptions};
use cms_rs_core::{CmsError, CmsResult, Scope};

use crate::engine::{capture, SourceUnit, TemplateEngine, TemplateServices};

static LOCATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-->\s*(\d+):(\d+)").expect("location pattern is valid"));

/// The Tera-backed [`TemplateEngine`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredEngine;

impl StructuredEngine {
    pub const fn new() -> Self {
        Self
    }
}

impl TemplateEngine for StructuredEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Structured
    }

    fn render(
        &self,
        unit: &SourceUnit<'_>,
        scope: &Scope,
        services: &Arc<dyn TemplateServices>,
    ) -> CmsResult<()> {
        let template_name = format!("{}:{}", unit.object_type, unit.name);

        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        for helper in Helper::ALL {
            tera.register_function(
                helper.name(),
                ServiceFunction {
                    helper,
                    services: Arc::clone(services),
                },
            );
        }

        if let Err(e) = tera.add_raw_template(&template_name, unit.source) {
            return Err(EngineError::parse(chain_message(&e), error_line(&e)).into());
        }

        let context = Context::from_serialize(scope)
            .map_err(|e| EngineError::fatal(chain_message(&e), None))?;

        match tera.render(&template_name, &context) {
            Ok(output) => {
                services.write(&output);
                Ok(())
            }
            Err(e) => Err(embedded_error(&e)
                .unwrap_or_else(|| EngineError::fatal(chain_message(&e), error_line(&e)).into())),
        }
    }
}

/// Walks the error chain for a [`CmsError`] raised by a service callback.
fn embedded_error(err: &tera::Error) -> Option<CmsError> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(cms) = e.downcast_ref::<CmsError>() {
            return Some(cms.clone());
        }
        current = e.source();
    }
    None
}

/// The messages of every error in the chain, outermost first.
fn chain_message(err: &tera::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut current = err.source();
    while let Some(e) = current {
        parts.push(e.to_string());
        current = e.source();
    }
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(": ")
}

/// The line of a Tera parse error, read from its `--> line:column` marker.
fn error_line(err: &tera::Error) -> Option<usize> {
    let message = chain_message(err);
    LOCATION_RE
        .captures(&message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[derive(Debug, Clone, Copy)]
enum Helper {
    RenderPartial,
    RenderPage,
    RenderBlock,
    RenderHead,
    RequestParam,
    RedirectUrl,
    GlobalContent,
    JsCombine,
    CssCombine,
}

impl Helper {
    const ALL: [Self; 9] = [
        Self::RenderPartial,
        Self::RenderPage,
        Self::RenderBlock,
        Self::RenderHead,
        Self::RequestParam,
        Self::RedirectUrl,
        Self::GlobalContent,
        Self::JsCombine,
        Self::CssCombine,
    ];

    const fn name(self) -> &'static str {
        match self {
            Self::RenderPartial => "render_partial",
            Self::RenderPage => "render_page",
            Self::RenderBlock => "render_block",
            Self::RenderHead => "render_head",
            Self::RequestParam => "request_param",
            Self::RedirectUrl => "redirect_url",
            Self::GlobalContent => "global_content",
            Self::JsCombine => "js_combine",
            Self::CssCombine => "css_combine",
        }
    }
}

/// A template function bound to the page's service surface.
struct ServiceFunction {
    helper: Helper,
    services: Arc<dyn TemplateServices>,
}

impl ServiceFunction {
    fn fail(&self, err: CmsError) -> tera::Error {
        tera::Error::chain(format!("Function `{}` failed", self.helper.name()), err)
    }

    fn string_arg(&self, args: &HashMap<String, Value>, name: &str) -> tera::Result<String> {
        match args.get(name) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Null) | None => Err(tera::Error::msg(format!(
                "Function `{}` requires a `{name}` argument",
                self.helper.name()
            ))),
            Some(other) => Ok(other.to_string()),
        }
    }

    fn optional_str(args: &HashMap<String, Value>, name: &str) -> Option<String> {
        args.get(name).and_then(|v| match v {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
    }

    fn index_arg(args: &HashMap<String, Value>, name: &str) -> i64 {
        args.get(name)
            .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(0)
    }

    fn captured(&self, f: impl FnOnce() -> CmsResult<()>) -> tera::Result<Value> {
        capture(self.services.as_ref(), f)
            .map(Value::String)
            .map_err(|e| self.fail(e))
    }

    fn combine(&self, args: &HashMap<String, Value>) -> Value {
        let files: Vec<String> = match args.get("files") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map_or_else(|| v.to_string(), ToString::to_string))
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        };
        let options: CombineOptions = match args.get("options") {
            Some(Value::Object(map)) => map.clone().into_iter().collect(),
            _ => CombineOptions::new(),
        };
        let show_tag = args.get("show_tag").map_or(true, is_truthy);
        let output = match self.helper {
            Helper::JsCombine => self.services.js_combine(&files, &options, show_tag),
            _ => self.services.css_combine(&files, &options, show_tag),
        };
        Value::String(output)
    }
}

impl tera::Function for ServiceFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let services = &self.services;
        match self.helper {
            Helper::RenderPartial => {
                let name = self.string_arg(args, "name")?;
                let params = match args.get("params") {
                    Some(Value::Object(map)) => map.clone(),
                    _ => Scope::new(),
                };
                let options = match args.get("options") {
                    Some(value @ Value::Object(_)) => {
                        serde_json::from_value::<PartialOptions>(value.clone()).map_err(|e| {
                            tera::Error::msg(format!("Invalid options for `render_partial`: {e}"))
                        })?
                    }
                    _ => PartialOptions::default(),
                };
                services
                    .render_partial(&name, params, options.returning_output())
                    .map(|output| Value::String(output.unwrap_or_default()))
                    .map_err(|e| self.fail(e))
            }
            Helper::RenderPage => self.captured(|| services.render_page()),
            Helper::RenderHead => self.captured(|| services.render_head()),
            Helper::RenderBlock => {
                let code = self.string_arg(args, "code")?;
                let default = Self::optional_str(args, "default");
                self.captured(|| services.render_block(&code, default.as_deref()))
            }
            Helper::RequestParam => {
                let index = Self::index_arg(args, "index");
                let default = Self::optional_str(args, "default");
                Ok(services
                    .request_param(index, default.as_deref())
                    .map_or(Value::Null, Value::String))
            }
            Helper::RedirectUrl => {
                let default = self.string_arg(args, "default")?;
                let index = Self::index_arg(args, "index");
                Ok(Value::String(services.redirect_url(&default, index)))
            }
            Helper::GlobalContent => {
                let code = self.string_arg(args, "code")?;
                Ok(services.global_content(&code).map_or(Value::Null, Value::String))
            }
            Helper::JsCombine | Helper::CssCombine => Ok(self.combine(args)),
        }
    }

    fn is_safe(&self) -> bool {
        true
    }
}
