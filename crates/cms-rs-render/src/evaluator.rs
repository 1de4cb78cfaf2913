//! The render evaluator: runs one unit of content through the selected
//! engine with call-stack tracking and error attribution.

use cms_rs_core::call_stack::CallStackFrame;
use cms_rs_core::error::ExecutionError;
use cms_rs_core::{CmsError, CmsResult, ObjectType, Scope};
use cms_rs_signals::{EvaluateCodeEvent, EvaluatedOutputEvent};
use cms_rs_template::{EngineSelector, SourceUnit, TemplateServices};

use crate::controller::Controller;

/// Deepest allowed nesting of pages, layouts and partials in one request.
/// A partial that renders itself stops here instead of exhausting the stack.
pub const MAX_NESTING_DEPTH: usize = 16;

impl Controller {
    /// Evaluates `source` and emits the result into the current output.
    ///
    /// A frame for the unit is pushed first and popped only on success, so
    /// an error leaves the full nesting on the call stack. Raw engine
    /// diagnostics are attributed to that stack; structured errors pass
    /// through unchanged.
    ///
    /// # Errors
    ///
    /// [`CmsError::Execution`] for engine failures or nesting deeper than
    /// [`MAX_NESTING_DEPTH`], or whatever a nested service call raised.
    pub fn evaluate(
        &self,
        object_type: ObjectType,
        name: &str,
        source: &str,
        params: &Scope,
    ) -> CmsResult<()> {
        let depth = self.state().call_stack.len();
        if depth >= MAX_NESTING_DEPTH {
            let snapshot = self.state().call_stack.snapshot();
            tracing::warn!(%object_type, name, depth, "nesting limit reached");
            return Err(CmsError::Execution(ExecutionError::new(
                format!(
                    "Maximum nesting depth of {MAX_NESTING_DEPTH} exceeded evaluating {object_type} \"{name}\""
                ),
                snapshot,
                None,
            )));
        }

        self.state()
            .call_stack
            .push(CallStackFrame::new(object_type, name, source));

        let mut scope = self.data();
        scope.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));

        let output = cms_rs_template::capture(self, || self.run_engine(object_type, name, source, scope))
            .map_err(|err| self.attribute(err))?;

        self.state().call_stack.pop();

        let output = self.filter_output(object_type, name, output);
        self.write(&output);
        Ok(())
    }

    fn run_engine(
        &self,
        object_type: ObjectType,
        name: &str,
        source: &str,
        scope: Scope,
    ) -> CmsResult<()> {
        let hooks = self.site().hooks();
        if hooks.evaluate_code.receiver_count() > 0 {
            let event = EvaluateCodeEvent {
                page: Some(self.page()),
                object_type,
                object_name: name.to_string(),
                source: source.to_string(),
                params: scope.clone(),
            };
            if let Some(content) = hooks.evaluate_code.first(&event) {
                self.write(&content);
                return Ok(());
            }
        }

        let kind = EngineSelector::select_kind(object_type, self.theme_kind());
        let engine = self.site().selector().engine(kind);
        let services = self.handle()?;
        engine.render(&SourceUnit::new(object_type, name, source), &scope, &services)
    }

    fn filter_output(&self, object_type: ObjectType, name: &str, output: String) -> String {
        let hook = &self.site().hooks().before_output_evaluated_code;
        if hook.receiver_count() == 0 {
            return output;
        }
        let event = EvaluatedOutputEvent {
            page: Some(self.page()),
            object_type,
            object_name: name.to_string(),
            output,
        };
        match hook.first(&event) {
            Some(filtered) if !filtered.is_empty() => filtered,
            _ => event.output,
        }
    }

    /// Turns an unattributed engine diagnostic into an execution error
    /// carrying the current call stack.
    pub(crate) fn attribute(&self, err: CmsError) -> CmsError {
        match err {
            CmsError::Engine(diagnostic) => {
                let snapshot = self.state().call_stack.snapshot();
                tracing::debug!(
                    frames = snapshot.len(),
                    line = ?diagnostic.line,
                    "engine diagnostic attributed"
                );
                CmsError::Execution(ExecutionError::new(diagnostic.message, snapshot, diagnostic.line))
            }
            other => other,
        }
    }
}
