//! Render outcomes and the AJAX error channel.

use cms_rs_core::CmsError;

/// The fixed body sent when a visitor may not see a page and no redirect
/// page is configured.
pub const PAGE_NOT_FOUND_MESSAGE: &str = "Sorry, specified page is not found.";

/// The result of a full-page render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered(String),
    /// The site's `/404` page, rendered for a request that matched nothing.
    NotFound(String),
    Redirect(String),
    Denied,
}

impl RenderOutcome {
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Rendered(html) | Self::NotFound(html) => Some(html),
            Self::Redirect(_) | Self::Denied => None,
        }
    }
}

/// The result of an AJAX request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AjaxOutcome {
    /// Handler output followed by `>>element<<` + partial segments.
    Patch(String),
    Redirect(String),
    Denied,
    /// A serialized error from the [`AjaxErrorReporter`].
    Error(String),
}

/// Serializes AJAX failures for the client. Distinct from the HTML error
/// page used for full-page renders.
pub trait AjaxErrorReporter: Send + Sync {
    fn report(&self, error: &CmsError, debug: bool) -> String;
}

/// Reports errors as `@AJAX-ERROR@` followed by the message. Unrecoverable
/// errors only carry detail in debug mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAjaxErrorReporter;

pub const AJAX_ERROR_MARKER: &str = "@AJAX-ERROR@";

impl AjaxErrorReporter for DefaultAjaxErrorReporter {
    fn report(&self, error: &CmsError, debug: bool) -> String {
        let message = match error {
            CmsError::Validation(e) => e.message.clone(),
            CmsError::BusinessLogic(message) => message.clone(),
            CmsError::NotFound(_) | CmsError::Execution(_) | CmsError::Engine(_) if debug => {
                error.to_string()
            }
            CmsError::NotFound(message) => message.clone(),
            _ if debug => error.to_string(),
            _ => "An error occurred while processing the request.".to_string(),
        };
        format!("{AJAX_ERROR_MARKER}{message}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cms_rs_core::ExecutionError;

    #[test]
    fn test_recoverable_errors_show_message() {
        let reporter = DefaultAjaxErrorReporter;
        assert_eq!(
            reporter.report(&CmsError::validation("Email required"), false),
            "@AJAX-ERROR@Email required"
        );
        assert_eq!(
            reporter.report(&CmsError::BusinessLogic("Cart is empty".into()), false),
            "@AJAX-ERROR@Cart is empty"
        );
    }

    #[test]
    fn test_fatal_errors_hidden_outside_debug() {
        let reporter = DefaultAjaxErrorReporter;
        let err = CmsError::Execution(ExecutionError::new("Undefined variable: x", vec![], Some(3)));
        assert!(!reporter.report(&err, false).contains("Undefined"));
        assert!(reporter.report(&err, true).contains("Undefined variable: x on line 3"));
    }

    #[test]
    fn test_outcome_body() {
        assert_eq!(RenderOutcome::Rendered("x".into()).body(), Some("x"));
        assert_eq!(RenderOutcome::Denied.body(), None);
    }
}
