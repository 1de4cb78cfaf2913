//! Error types for the CMS rendering pipeline.
//!
//! [`CmsError`] is the single error type that crosses crate boundaries. Two
//! of its variants ([`CmsError::Validation`] and [`CmsError::BusinessLogic`])
//! are *recoverable*: the page renderer catches them at action boundaries and
//! turns them into flash messages. Everything else aborts the render pass.
//!
//! Engine diagnostics travel as [`EngineError`] values and are translated into
//! [`ExecutionError`] by the render evaluator, which attaches the call-stack
//! snapshot for the failing evaluation.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::call_stack::CallStackFrame;

/// A user-input-shaped failure, surfaced to visitors as a flash message.
///
/// # Examples
///
/// ```
/// use cms_rs_core::error::ValidationError;
///
/// let err = ValidationError::new("Please enter your email address.")
///     .with_field("email");
/// assert_eq!(err.field.as_deref(), Some("email"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The message shown to the visitor.
    pub message: String,
    /// The form field the error refers to, if any.
    pub field: Option<String>,
    /// Additional parameters providing context for the message.
    pub params: HashMap<String, String>,
}

impl ValidationError {
    /// Creates a new `ValidationError` with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
            params: HashMap::new(),
        }
    }

    /// Attaches the name of the offending field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Adds a parameter to this validation error.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) if self.message.is_empty() => write!(f, "{field}: invalid value"),
            _ => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// The class of a templating-engine diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A non-fatal notice the engine escalates, e.g. an undefined variable.
    Warning,
    /// The source could not be parsed.
    ParseError,
    /// Evaluation failed at runtime.
    FatalError,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "Warning"),
            Self::ParseError => write!(f, "Parse error"),
            Self::FatalError => write!(f, "Fatal error"),
        }
    }
}

/// A structured diagnostic reported by a templating engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub kind: DiagnosticKind,
    pub message: String,
    /// 1-based line inside the evaluated source.
    pub line: Option<usize>,
}

impl EngineError {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            kind,
            message: message.into(),
            line,
        }
    }

    pub fn warning(message: impl Into<String>, line: usize) -> Self {
        Self::new(DiagnosticKind::Warning, message, Some(line))
    }

    pub fn parse(message: impl Into<String>, line: Option<usize>) -> Self {
        Self::new(DiagnosticKind::ParseError, message, line)
    }

    pub fn fatal(message: impl Into<String>, line: Option<usize>) -> Self {
        Self::new(DiagnosticKind::FatalError, message, line)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(line) = self.line {
            write!(f, " on line {line}")?;
        }
        Ok(())
    }
}

impl std::error::Error for EngineError {}

/// A failure attributed to a precise location in the evaluated sources.
///
/// `call_stack` lists the frames that were being evaluated when the failure
/// happened, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionError {
    pub message: String,
    pub call_stack: Vec<CallStackFrame>,
    pub line: Option<usize>,
}

impl ExecutionError {
    pub fn new(
        message: impl Into<String>,
        call_stack: Vec<CallStackFrame>,
        line: Option<usize>,
    ) -> Self {
        Self {
            message: message.into(),
            call_stack,
            line,
        }
    }

    /// The innermost frame, where the failure actually occurred.
    pub fn failing_frame(&self) -> Option<&CallStackFrame> {
        self.call_stack.last()
    }

    /// Renders a human-readable trace, innermost frame first.
    ///
    /// ```
    /// use cms_rs_core::call_stack::{CallStackFrame, ObjectType};
    /// use cms_rs_core::error::ExecutionError;
    ///
    /// let err = ExecutionError::new(
    ///     "Undefined variable: total",
    ///     vec![
    ///         CallStackFrame::new(ObjectType::Page, "Home", ""),
    ///         CallStackFrame::new(ObjectType::Partial, "shop:cart", ""),
    ///     ],
    ///     Some(3),
    /// );
    /// let trace = err.trace();
    /// assert!(trace.starts_with("CMS partial \"shop:cart\" (line 3)"));
    /// ```
    pub fn trace(&self) -> String {
        let mut lines = Vec::with_capacity(self.call_stack.len());
        for (depth, frame) in self.call_stack.iter().rev().enumerate() {
            let mut line = format!("CMS {} \"{}\"", frame.object_type, frame.name);
            if depth == 0 {
                if let Some(number) = self.line {
                    line.push_str(&format!(" (line {number})"));
                }
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(frame) = self.failing_frame() {
            write!(f, " in CMS {} \"{}\"", frame.object_type, frame.name)?;
        }
        if let Some(line) = self.line {
            write!(f, " on line {line}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ExecutionError {}

/// The primary error type for the CMS.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CmsError {
    // ── Recoverable ──────────────────────────────────────────────────

    /// Visitor input failed validation.
    #[error("{0}")]
    Validation(ValidationError),

    /// A business action refused to proceed.
    #[error("{0}")]
    BusinessLogic(String),

    // ── Rendering ────────────────────────────────────────────────────

    /// A failure attributed to evaluated source, with its call stack.
    #[error("{0}")]
    Execution(ExecutionError),

    /// A raw engine diagnostic that has not been attributed yet.
    #[error("{0}")]
    Engine(EngineError),

    /// A page, partial, layout, action or handler does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    // ── Infrastructure ───────────────────────────────────────────────

    /// The cache backend failed. Never escapes the cache key service.
    #[error("Cache backend error: {0}")]
    CacheBackend(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(String),

    /// An invariant of the pipeline itself was broken.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CmsError {
    /// Shorthand for a [`CmsError::Validation`] with just a message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::new(message))
    }

    /// Returns `true` for the error kinds that become flash messages
    /// instead of aborting the render.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::BusinessLogic(_))
    }

    /// Returns the HTTP status code associated with this error.
    ///
    /// - `Validation` -> 400
    /// - `NotFound` -> 404
    /// - Everything else -> 500
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::BusinessLogic(_)
            | Self::Execution(_)
            | Self::Engine(_)
            | Self::CacheBackend(_)
            | Self::Configuration(_)
            | Self::Serialization(_)
            | Self::Io(_)
            | Self::Internal(_) => 500,
        }
    }
}

impl From<std::io::Error> for CmsError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CmsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<ValidationError> for CmsError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<ExecutionError> for CmsError {
    fn from(err: ExecutionError) -> Self {
        Self::Execution(err)
    }
}

impl From<EngineError> for CmsError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

/// A convenience type alias for `Result<T, CmsError>`.
pub type CmsResult<T> = Result<T, CmsError>;
