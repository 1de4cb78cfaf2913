//! # cms-rs-core
//!
//! Core types for the CMS rendering pipeline: errors, settings, the content
//! model, the request model, call-stack tracking and the navigation tree.
//! Every other crate in the workspace builds on these.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy and result alias
//! - [`settings`] / [`settings_loader`] - Configuration and its loading
//! - [`logging`] - Tracing-based logging integration
//! - [`content`] - Pages, partials, layouts, themes, customers
//! - [`options`] - Options passed through the template service surface
//! - [`request`] - Request model and URL helpers
//! - [`call_stack`] - Evaluation frames for error attribution
//! - [`navigation`] - Visibility-filtered page hierarchy

pub mod call_stack;
pub mod content;
pub mod error;
pub mod logging;
pub mod navigation;
pub mod options;
pub mod request;
pub mod settings;
pub mod settings_loader;

pub use call_stack::{CallStack, CallStackFrame, ObjectType};
pub use content::{
    Customer, EngineKind, GlobalContentBlock, Layout, Page, PageBlock, Partial, Protocol,
    SecurityMode, Theme,
};
pub use error::{CmsError, CmsResult, EngineError, ExecutionError, ValidationError};
pub use options::{PartialOptions, Scope};
pub use request::CmsRequest;
pub use settings::{Settings, SETTINGS};
