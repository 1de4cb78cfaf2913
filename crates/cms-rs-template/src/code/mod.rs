//! The inline-code engine.
//!
//! A small PHP-flavoured language: templates mix literal text with `<?= ?>`
//! and `<? ?>` islands, and action/handler code is statements only. Engine
//! diagnostics (undefined names, parse errors, fatal errors) are returned as
//! structured [`EngineError`] values carrying the source line.

pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod value;

use std::sync::Arc;

use serde_json::Value;

use cms_rs_core::call_stack::ObjectType;
use cms_rs_core::content::EngineKind;
use cms_rs_core::error::EngineError;
use cms_rs_core::{CmsError, CmsResult, Scope};

use crate::engine::{SourceUnit, TemplateEngine, TemplateServices};
use lexer::Mode;
use parser::{Program, StmtKind};

/// The inline-code [`TemplateEngine`].
#[derive(Debug, Clone)]
pub struct CodeEngine {
    inline_code_allowed: bool,
}

impl Default for CodeEngine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl CodeEngine {
    pub const fn new(inline_code_allowed: bool) -> Self {
        Self {
            inline_code_allowed,
        }
    }

    pub const fn inline_code_allowed(&self) -> bool {
        self.inline_code_allowed
    }

    /// Parses a unit. Action and handler code is pure code; everything else
    /// is a template.
    ///
    /// # Errors
    ///
    /// A parse-error diagnostic.
    pub fn compile(object_type: ObjectType, source: &str) -> Result<Program, EngineError> {
        let mode = if object_type.is_template() {
            Mode::Template
        } else {
            Mode::Code
        };
        let tokens = lexer::tokenize(source, mode)?;
        parser::parse(&tokens)
    }

    /// Compiles AJAX handler source into a [`HandlerTable`].
    ///
    /// # Errors
    ///
    /// A parse error, or a fatal error if the source contains anything other
    /// than function declarations.
    pub fn compile_handlers(&self, source: &str) -> CmsResult<HandlerTable> {
        self.ensure_allowed()?;
        let program = Self::compile(ObjectType::AjaxHandlers, source)?;
        if let Some(stmt) = program
            .body
            .iter()
            .find(|stmt| !matches!(&stmt.kind, StmtKind::Text(text) if text.trim().is_empty()))
        {
            return Err(EngineError::fatal(
                "AJAX handler source may only declare functions",
                Some(stmt.line),
            )
            .into());
        }
        Ok(HandlerTable {
            program: Arc::new(program),
        })
    }

    fn ensure_allowed(&self) -> CmsResult<()> {
        if self.inline_code_allowed {
            Ok(())
        } else {
            Err(CmsError::Engine(EngineError::fatal(
                "Inline code execution is disabled",
                None,
            )))
        }
    }
}

impl TemplateEngine for CodeEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Code
    }

    fn render(
        &self,
        unit: &SourceUnit<'_>,
        scope: &Scope,
        services: &Arc<dyn TemplateServices>,
    ) -> CmsResult<()> {
        self.ensure_allowed()?;
        let program = Self::compile(unit.object_type, unit.source)?;
        interpreter::execute(&program, scope, services.as_ref())
    }
}

/// A compiled set of AJAX handler functions for one page.
#[derive(Debug, Clone)]
pub struct HandlerTable {
    program: Arc<Program>,
}

impl HandlerTable {
    /// Whether a handler named `name` is declared (case-insensitive).
    pub fn contains(&self, name: &str) -> bool {
        self.program
            .functions
            .contains_key(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .program
            .functions
            .values()
            .map(|def| def.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Invokes a handler with `($page, $params)`.
    ///
    /// # Errors
    ///
    /// A fatal diagnostic if the handler is not declared, otherwise whatever
    /// the handler raises.
    pub fn invoke(
        &self,
        name: &str,
        page: Value,
        params: Value,
        services: &dyn TemplateServices,
    ) -> CmsResult<Value> {
        interpreter::call(&self.program, name, vec![page, params], services)
    }
}
