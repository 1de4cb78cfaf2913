//! Per-object engine selection.

use std::sync::Arc;

use cms_rs_core::call_stack::ObjectType;
use cms_rs_core::content::{EngineKind, Theme};
use cms_rs_core::settings::TemplatingSettings;

use crate::code::CodeEngine;
use crate::engine::TemplateEngine;
use crate::structured::StructuredEngine;

/// Chooses the engine for each evaluated object and owns the engine instances.
///
/// Action code and AJAX handler source always run on the inline-code engine.
/// Everything else follows the active theme's declared engine when theming is
/// on, then the configured default, then the inline-code engine.
#[derive(Clone)]
pub struct EngineSelector {
    code: Arc<dyn TemplateEngine>,
    structured: Arc<dyn TemplateEngine>,
    default_engine: Option<EngineKind>,
}

impl std::fmt::Debug for EngineSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSelector")
            .field("default_engine", &self.default_engine)
            .finish_non_exhaustive()
    }
}

impl EngineSelector {
    pub fn new(
        code: Arc<dyn TemplateEngine>,
        structured: Arc<dyn TemplateEngine>,
        default_engine: Option<EngineKind>,
    ) -> Self {
        Self {
            code,
            structured,
            default_engine,
        }
    }

    /// Builds both engines from the templating settings.
    pub fn from_settings(settings: &TemplatingSettings) -> Self {
        Self::new(
            Arc::new(CodeEngine::new(settings.inline_code_allowed)),
            Arc::new(StructuredEngine::new()),
            settings.default_engine,
        )
    }

    /// The engine kind for template-like objects, ignoring the object type.
    ///
    /// The page controller memoizes this per render pass so that the choice
    /// stays stable even if the theme context changes mid-request.
    pub fn theme_kind(&self, theming_enabled: bool, active_theme: Option<&Theme>) -> EngineKind {
        let themed = if theming_enabled {
            active_theme.and_then(|theme| theme.templating_engine)
        } else {
            None
        };
        let kind = themed.or(self.default_engine).unwrap_or(EngineKind::Code);
        tracing::debug!(?kind, themed = themed.is_some(), "templating engine selected");
        kind
    }

    /// The engine kind for one object, given the pass-level theme choice.
    pub const fn select_kind(object_type: ObjectType, theme_kind: EngineKind) -> EngineKind {
        if object_type.is_template() {
            theme_kind
        } else {
            EngineKind::Code
        }
    }

    pub fn engine(&self, kind: EngineKind) -> &Arc<dyn TemplateEngine> {
        match kind {
            EngineKind::Code => &self.code,
            EngineKind::Structured => &self.structured,
        }
    }

    /// The inline-code engine, used directly for handler tables.
    pub fn code_engine(&self) -> &Arc<dyn TemplateEngine> {
        &self.code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(default_engine: Option<EngineKind>) -> EngineSelector {
        EngineSelector::from_settings(&TemplatingSettings {
            default_engine,
            inline_code_allowed: true,
        })
    }

    #[test]
    fn test_defaults_to_code_engine() {
        let s = selector(None);
        assert_eq!(s.theme_kind(false, None), EngineKind::Code);
        assert_eq!(s.theme_kind(true, None), EngineKind::Code);
    }

    #[test]
    fn test_theme_engine_wins_when_theming_enabled() {
        let s = selector(Some(EngineKind::Code));
        let theme = Theme::new(1, "blue").with_engine(EngineKind::Structured);
        assert_eq!(s.theme_kind(true, Some(&theme)), EngineKind::Structured);
        assert_eq!(s.theme_kind(false, Some(&theme)), EngineKind::Code);
    }

    #[test]
    fn test_global_default_when_theme_declares_nothing() {
        let s = selector(Some(EngineKind::Structured));
        let theme = Theme::new(1, "plain");
        assert_eq!(s.theme_kind(true, Some(&theme)), EngineKind::Structured);
    }

    #[test]
    fn test_handlers_and_action_code_always_use_code_engine() {
        for object_type in [
            ObjectType::AjaxHandlers,
            ObjectType::PreActionCode,
            ObjectType::PostActionCode,
        ] {
            assert_eq!(
                EngineSelector::select_kind(object_type, EngineKind::Structured),
                EngineKind::Code
            );
        }
        assert_eq!(
            EngineSelector::select_kind(ObjectType::Partial, EngineKind::Structured),
            EngineKind::Structured
        );
    }

    #[test]
    fn test_engine_lookup_matches_kind() {
        let s = selector(None);
        assert_eq!(s.engine(EngineKind::Code).kind(), EngineKind::Code);
        assert_eq!(s.engine(EngineKind::Structured).kind(), EngineKind::Structured);
    }
}
