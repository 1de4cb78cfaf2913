//! Options passed through the template service surface.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A variable scope handed to a templating engine.
pub type Scope = serde_json::Map<String, serde_json::Value>;

/// Options for rendering a partial.
///
/// Deserializable so that engines can build it straight from the argument
/// map a template author passed:
///
/// ```
/// use cms_rs_core::options::PartialOptions;
///
/// let options: PartialOptions = serde_json::from_value(serde_json::json!({
///     "cache": true,
///     "cache_vary_by": ["customer_group"],
///     "cache_ttl": 60,
/// }))
/// .unwrap();
/// assert!(options.cache);
/// assert_eq!(options.ttl().unwrap().as_secs(), 60);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialOptions {
    pub cache: bool,
    pub cache_vary_by: Vec<String>,
    pub cache_versions: Vec<String>,
    /// Seconds.
    pub cache_ttl: Option<u64>,
    /// Capture and return the output instead of emitting it.
    pub return_output: bool,
}

impl PartialOptions {
    pub fn ttl(&self) -> Option<Duration> {
        self.cache_ttl.map(Duration::from_secs)
    }

    #[must_use]
    pub const fn returning_output(mut self) -> Self {
        self.return_output = true;
        self
    }
}

/// Options for `js_combine` / `css_combine`, e.g. `reset_cache`, `src_mode`.
///
/// Ordered so that generated URLs are deterministic.
pub type CombineOptions = BTreeMap<String, serde_json::Value>;

/// The kind of resource being combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Javascript,
    Css,
}

/// PHP-style truthiness, shared by the engines and the option encoders.
pub fn is_truthy(value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
