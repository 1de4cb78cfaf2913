//! # cms-rs-template
//!
//! Templating engines for the CMS rendering pipeline.
//!
//! - [`engine`] - The [`TemplateEngine`] trait and the [`TemplateServices`]
//!   surface templates call back into
//! - [`selector`] - Per-object engine selection
//! - [`code`] - The PHP-flavoured inline-code engine and AJAX handler tables
//! - [`structured`] - The sandboxed, Tera-backed structured engine
//!
//! ## Example
//!
//! ```
//! use cms_rs_template::code::lexer::{tokenize, Mode};
//!
//! let tokens = tokenize("Hello, <?= $name ?>!", Mode::Template).unwrap();
//! assert_eq!(tokens.len(), 5);
//! ```

pub mod code;
pub mod engine;
pub mod selector;
pub mod structured;

pub use code::{CodeEngine, HandlerTable};
pub use engine::{capture, SourceUnit, TemplateEngine, TemplateServices};
pub use selector::EngineSelector;
pub use structured::StructuredEngine;
