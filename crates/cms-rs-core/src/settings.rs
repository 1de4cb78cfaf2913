//! Settings for the CMS.
//!
//! [`Settings`] holds all configuration with sensible defaults and is loaded
//! by [`settings_loader`](crate::settings_loader). [`LazySettings`] offers a
//! set-once, process-wide cell for binaries; library code always receives its
//! settings explicitly.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::content::{EngineKind, GroupId};

/// Cache backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// `locmem`, `file` or `dummy`.
    pub backend: String,
    /// Directory for the `file` backend.
    pub location: String,
    /// Default time to live in seconds; `None` means entries never expire.
    pub default_ttl: Option<u64>,
    /// Request field an operator can pass to force a recache.
    pub reset_key: String,
    /// Value `reset_key` must carry to force a recache.
    pub reset_value: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: "locmem".to_string(),
            location: String::new(),
            default_ttl: None,
            reset_key: "reset_cache".to_string(),
            reset_value: "1".to_string(),
        }
    }
}

/// Templating configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatingSettings {
    /// Engine used when no theme declares one. `None` means the inline-code engine.
    pub default_engine: Option<EngineKind>,
    /// Whether inline code (templates, action code, AJAX handlers) may run.
    pub inline_code_allowed: bool,
}

impl Default for TemplatingSettings {
    fn default() -> Self {
        Self {
            default_engine: None,
            inline_code_allowed: true,
        }
    }
}

/// Front-end security and URL configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// Path prefix the site is mounted under, e.g. `/shop`. Empty for the root.
    pub root_path: String,
    /// Internal request-routing parameter, never carried across redirects.
    pub request_param_name: String,
    /// Query parameter carrying the re-authentication ticket.
    pub ticket_param_name: String,
    /// Query parameter carrying the session id across protocol switches.
    pub session_param_name: String,
    /// Strip the ticket from the URL with an extra redirect once consumed.
    pub ticket_auto_redirect: bool,
    /// Customer group applied to anonymous visitors.
    pub guest_group_id: GroupId,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            root_path: String::new(),
            request_param_name: "q".to_string(),
            ticket_param_name: "cms_ticket".to_string(),
            session_param_name: "cms_session_id".to_string(),
            ticket_auto_redirect: false,
            guest_group_id: 1,
        }
    }
}

/// Resource combining configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSettings {
    /// Path, relative to the site root, of the shared resources directory.
    pub resources_dir_path: String,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            resources_dir_path: "resources".to_string(),
        }
    }
}

/// Analytics tracking-code configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsSettings {
    pub enabled: bool,
    pub property_id: String,
    pub site_speed_sample_rate: u32,
    pub cookie_domain: Option<String>,
    pub display_features: bool,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            property_id: String::new(),
            site_speed_sample_rate: 1,
            cookie_domain: None,
            display_features: false,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
    /// Protocol assumed when no `X-Forwarded-Proto` header is present.
    pub default_protocol: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
            default_protocol: "http".to_string(),
        }
    }
}

/// The complete set of CMS settings.
///
/// # Examples
///
/// ```
/// use cms_rs_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert_eq!(settings.security.request_param_name, "q");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Whether debug mode is enabled. Selects pretty logs and detailed error pages.
    pub debug: bool,
    /// Tracing filter directive, e.g. `info` or `cms_rs_render=debug`.
    pub log_level: String,

    pub cache: CacheSettings,
    pub templating: TemplatingSettings,
    pub security: SecuritySettings,
    pub resources: ResourceSettings,
    pub analytics: AnalyticsSettings,
    pub server: ServerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            log_level: "info".to_string(),
            cache: CacheSettings::default(),
            templating: TemplatingSettings::default(),
            security: SecuritySettings::default(),
            resources: ResourceSettings::default(),
            analytics: AnalyticsSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

/// A lazily-initialized, globally-accessible settings container.
///
/// # Panics
///
/// [`get`](LazySettings::get) panics if settings have not been configured.
/// [`configure`](LazySettings::configure) panics if called more than once.
pub struct LazySettings {
    inner: OnceLock<Settings>,
}

impl Default for LazySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LazySettings {
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Configures the settings. Must be called exactly once.
    ///
    /// # Panics
    ///
    /// Panics if settings have already been configured.
    pub fn configure(&self, settings: Settings) {
        self.inner
            .set(settings)
            .expect("Settings have already been configured");
    }

    /// Returns a reference to the configured settings.
    ///
    /// # Panics
    ///
    /// Panics if settings have not been configured.
    pub fn get(&self) -> &Settings {
        self.inner
            .get()
            .expect("Settings have not been configured. Call SETTINGS.configure() first.")
    }

    pub fn is_configured(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The process-wide settings cell used by the server binary.
pub static SETTINGS: LazySettings = LazySettings::new();
