//! The theme context collaborator.

use std::sync::{Arc, RwLock};

use cms_rs_core::content::ThemeId;
use cms_rs_core::Theme;

/// Tells the pipeline whether theming is on and which theme is active.
pub trait ThemeContext: Send + Sync {
    fn is_theming_enabled(&self) -> bool;

    fn active_theme(&self) -> Option<Arc<Theme>>;

    /// The theme id content lookups are scoped to: the active theme when
    /// theming is on, otherwise none.
    fn content_scope(&self) -> Option<ThemeId> {
        if self.is_theming_enabled() {
            self.active_theme().map(|theme| theme.id)
        } else {
            None
        }
    }
}

/// A [`ThemeContext`] with a fixed, switchable active theme.
#[derive(Debug, Default)]
pub struct StaticThemes {
    active: RwLock<Option<Arc<Theme>>>,
}

impl StaticThemes {
    /// Theming disabled.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_active(theme: Theme) -> Self {
        Self {
            active: RwLock::new(Some(Arc::new(theme))),
        }
    }

    pub fn set_active(&self, theme: Option<Theme>) {
        *self.active.write().expect("theme lock poisoned") = theme.map(Arc::new);
    }
}

impl ThemeContext for StaticThemes {
    fn is_theming_enabled(&self) -> bool {
        self.active.read().expect("theme lock poisoned").is_some()
    }

    fn active_theme(&self) -> Option<Arc<Theme>> {
        self.active.read().expect("theme lock poisoned").clone()
    }
}
