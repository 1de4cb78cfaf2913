//! # cms-rs-http
//!
//! Serves a [`cms_rs_render::Site`] over HTTP with Axum.
//!
//! Every path is routed to the pipeline. A request carrying the
//! `X-CMS-Handler` header is treated as an AJAX call; everything else is a
//! page display.
//!
//! ## Modules
//!
//! - [`app`] - The router and server entry point
//! - [`extract`] - Request model extraction
//! - [`response`] - Outcome and error responses

pub mod app;
pub mod extract;
pub mod response;

pub use app::CmsApp;
pub use extract::{AjaxCall, CustomerResolver, GuestsOnly};
