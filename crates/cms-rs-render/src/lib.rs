//! # cms-rs-render
//!
//! The rendering pipeline: a [`Site`] holds the application-scoped
//! collaborators, and every request gets its own [`Controller`] that runs
//! security, content evaluation, layouts, partials and AJAX handlers.
//!
//! ## Modules
//!
//! - [`site`] - The configured site and its builder
//! - [`controller`] - Per-request state and the template service surface
//! - [`evaluator`] - Engine evaluation with call-stack attribution
//! - [`page`] - Full-page display
//! - [`partial`] - Partial rendering and partial caching
//! - [`ajax`] - AJAX handler dispatch and element updates
//! - [`security`] - Protocol and security-mode enforcement
//! - [`repository`] / [`themes`] / [`actions`] - Collaborator traits and
//!   in-memory implementations
//! - [`handlers`] - Compiled AJAX handler tables
//! - [`resources`] - JS/CSS combine references
//! - [`tracking`] - Analytics snippets
//! - [`vary`] - Cache vary-by dimensions
//! - [`outcome`] - Render outcomes and the AJAX error channel

pub mod actions;
pub mod ajax;
pub mod controller;
pub mod evaluator;
pub mod handlers;
pub mod outcome;
pub mod page;
pub mod partial;
pub mod repository;
pub mod resources;
pub mod security;
pub mod site;
pub mod themes;
pub mod tracking;
pub mod vary;

pub use actions::{ActionDispatcher, ActionFn, ActionRegistry};
pub use controller::Controller;
pub use outcome::{AjaxErrorReporter, AjaxOutcome, DefaultAjaxErrorReporter, RenderOutcome};
pub use repository::{ContentBundle, ContentRepository, InMemoryRepository, RoutedPage};
pub use security::{SecurityVerdict, TicketIssuer, UuidTicketIssuer};
pub use site::{Site, SiteBuilder};
pub use themes::{StaticThemes, ThemeContext};
