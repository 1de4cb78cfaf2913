//! Settings loading from configuration files.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file, deep-merged over the defaults.
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `CMS_DEBUG` | `debug` |
//! | `CMS_LOG_LEVEL` | `log_level` |
//! | `CMS_CACHE_BACKEND` | `cache.backend` |
//! | `CMS_CACHE_LOCATION` | `cache.location` |
//! | `CMS_DEFAULT_ENGINE` | `templating.default_engine` |
//! | `CMS_ROOT_PATH` | `security.root_path` |
//! | `CMS_BIND_ADDRESS` | `server.bind_address` |
//! | `CMS_ANALYTICS_PROPERTY_ID` | `analytics.property_id` (also enables analytics) |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use cms_rs_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("config/cms.toml").unwrap();
//! ```

use std::path::Path;

use crate::error::CmsError;
use crate::settings::Settings;

/// Loads settings from a TOML string. Missing keys keep their defaults.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or cannot be deserialized.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, CmsError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| CmsError::Configuration(format!("Failed to parse TOML: {e}")))?;
    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, CmsError> {
    from_toml_str(&read_config(path.as_ref(), "TOML")?)
}

/// Loads settings from a TOML file and then applies environment overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, CmsError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string. Missing keys keep their defaults.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or cannot be deserialized.
pub fn from_json_str(json_str: &str) -> Result<Settings, CmsError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| CmsError::Configuration(format!("Failed to parse JSON: {e}")))?;
    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the JSON is malformed.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, CmsError> {
    from_json_str(&read_config(path.as_ref(), "JSON")?)
}

/// Loads settings from just environment variables, starting from defaults.
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `CMS_*` environment variable overrides to a settings struct.
pub fn apply_env_overrides(settings: &mut Settings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

fn apply_overrides(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("CMS_DEBUG") {
        settings.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Some(val) = var("CMS_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Some(val) = var("CMS_CACHE_BACKEND") {
        settings.cache.backend = val;
    }

    if let Some(val) = var("CMS_CACHE_LOCATION") {
        settings.cache.location = val;
    }

    if let Some(val) = var("CMS_DEFAULT_ENGINE") {
        match val.parse() {
            Ok(engine) => settings.templating.default_engine = Some(engine),
            Err(e) => tracing::warn!("Ignoring CMS_DEFAULT_ENGINE: {e}"),
        }
    }

    if let Some(val) = var("CMS_ROOT_PATH") {
        settings.security.root_path = val;
    }

    if let Some(val) = var("CMS_BIND_ADDRESS") {
        settings.server.bind_address = val;
    }

    if let Some(val) = var("CMS_ANALYTICS_PROPERTY_ID") {
        settings.analytics.enabled = !val.trim().is_empty();
        settings.analytics.property_id = val;
    }
}

// ============================================================
// Helpers
// ============================================================

fn read_config(path: &Path, format: &str) -> Result<String, CmsError> {
    std::fs::read_to_string(path).map_err(|e| {
        CmsError::Configuration(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

fn merge_over_defaults(value: serde_json::Value, format: &str) -> Result<Settings, CmsError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        CmsError::Configuration(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        CmsError::Configuration(format!("Failed to deserialize settings from {format}: {e}"))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table.into_iter().map(|(k, v)| (k, toml_to_json(v))).collect(),
        ),
    }
}

/// Deep-merges two JSON values. `override_val` wins on conflicts.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = match base_map.remove(&key) {
                    Some(base_v) => merge_json(base_v, override_v),
                    None => override_v,
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
