//! The CMS content model: pages, partials, layouts, themes and customers.
//!
//! These are plain data records. Persistence is a collaborator concern; the
//! rendering pipeline only ever reads them through shared [`Arc`](std::sync::Arc)
//! handles handed out by a repository.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CmsError, ValidationError};

pub type PageId = u64;
pub type LayoutId = u64;
pub type ThemeId = u64;
pub type GroupId = u64;
pub type CustomerId = u64;

/// Maximum number of named content blocks a page may declare.
pub const MAX_BLOCKS: usize = 5;

/// Action reference meaning "no business action, the page code does the work".
pub const ACTION_CUSTOM: &str = "Custom";

/// The templating engine used to evaluate a source unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// The PHP-flavoured inline-code engine.
    Code,
    /// The sandboxed, Twig-like structured template engine.
    Structured,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code => f.write_str("code"),
            Self::Structured => f.write_str("structured"),
        }
    }
}

impl FromStr for EngineKind {
    type Err = CmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "code" | "php" => Ok(Self::Code),
            "structured" | "twig" => Ok(Self::Structured),
            other => Err(CmsError::Configuration(format!(
                "Unknown templating engine: {other}"
            ))),
        }
    }
}

/// The transport protocol a page requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Served over whatever protocol the request arrived on.
    #[default]
    Any,
    Http,
    Https,
    /// Never served directly.
    None,
}

impl Protocol {
    /// The URL scheme for protocols that pin one.
    pub const fn scheme(self) -> Option<&'static str> {
        match self {
            Self::Http => Some("http"),
            Self::Https => Some("https"),
            Self::Any | Self::None => None,
        }
    }
}

/// Which visitors may see a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    #[default]
    Everyone,
    /// Only signed-in customers.
    Customers,
    /// Only anonymous visitors.
    Guests,
}

impl SecurityMode {
    /// Returns `true` if a visitor with the given presence may see the page.
    pub const fn admits(self, customer_present: bool) -> bool {
        match self {
            Self::Everyone => true,
            Self::Customers => customer_present,
            Self::Guests => !customer_present,
        }
    }
}

/// Declared page-level cache settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    /// Extra vary-by dimensions. `url` is always added by the page renderer.
    pub vary_by: Vec<String>,
    /// Content-version tags the cached value depends on.
    pub versions: Vec<String>,
    /// Time to live in seconds; `None` uses the backend default.
    pub ttl_seconds: Option<u64>,
}

impl CachePolicy {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_seconds.map(Duration::from_secs)
    }
}

/// A named content slot on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageBlock {
    pub code: String,
    pub source: String,
}

impl PageBlock {
    pub fn new(code: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            source: source.into(),
        }
    }
}

/// A routable, renderable website page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Page {
    pub id: PageId,
    pub theme_id: Option<ThemeId>,
    pub url: String,
    pub title: String,
    pub content: String,
    pub pre_action: String,
    pub post_action: String,
    pub ajax_handlers: String,
    pub head: String,
    pub blocks: Vec<PageBlock>,
    pub layout_id: Option<LayoutId>,
    pub protocol: Protocol,
    pub security_mode: SecurityMode,
    pub security_redirect_id: Option<PageId>,
    pub parent_id: Option<PageId>,
    pub navigation_visible: bool,
    pub navigation_label: Option<String>,
    pub navigation_sort_order: i32,
    pub disable_analytics: bool,
    /// `""` or [`ACTION_CUSTOM`] for none, otherwise an action name.
    pub action_reference: String,
    pub cache_policy: Option<CachePolicy>,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            id: 0,
            theme_id: None,
            url: "/".to_string(),
            title: String::new(),
            content: String::new(),
            pre_action: String::new(),
            post_action: String::new(),
            ajax_handlers: String::new(),
            head: String::new(),
            blocks: Vec::new(),
            layout_id: None,
            protocol: Protocol::Any,
            security_mode: SecurityMode::Everyone,
            security_redirect_id: None,
            parent_id: None,
            navigation_visible: true,
            navigation_label: None,
            navigation_sort_order: 0,
            disable_analytics: false,
            action_reference: String::new(),
            cache_policy: None,
        }
    }
}

impl Page {
    /// Creates a page with the given id, URL and title.
    pub fn new(id: PageId, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    /// Returns the action reference if the page binds a real business action.
    pub fn business_action(&self) -> Option<&str> {
        let reference = self.action_reference.trim();
        (!reference.is_empty() && reference != ACTION_CUSTOM).then_some(reference)
    }

    /// The label used in navigation menus; falls back to the title.
    pub fn navigation_label(&self) -> &str {
        match self.navigation_label.as_deref() {
            Some(label) if !label.trim().is_empty() => label,
            _ => &self.title,
        }
    }

    /// Looks up a block by its (case-insensitive) code.
    pub fn block(&self, code: &str) -> Option<&PageBlock> {
        let code = code.trim().to_lowercase();
        self.blocks.iter().find(|b| b.code.trim().to_lowercase() == code)
    }

    /// Checks the record-level invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.url.starts_with('/') {
            return Err(
                ValidationError::new("The page URL must start with a forward slash.").with_field("url"),
            );
        }
        if self.blocks.len() > MAX_BLOCKS {
            return Err(ValidationError::new(format!(
                "A page can declare at most {MAX_BLOCKS} blocks."
            ))
            .with_field("blocks"));
        }
        if self.blocks.iter().any(|b| b.code.trim().is_empty()) {
            return Err(ValidationError::new("Please specify the block code.").with_field("blocks"));
        }
        if self.security_mode != SecurityMode::Everyone && self.security_redirect_id.is_none() {
            return Err(ValidationError::new(
                "Please select a page to redirect visitors who cannot access this page.",
            )
            .with_field("security_redirect_id"));
        }
        if self.parent_id == Some(self.id) {
            return Err(
                ValidationError::new("A page cannot be its own parent.").with_field("parent_id"),
            );
        }
        Ok(())
    }
}

/// A named, reusable template fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partial {
    pub theme_id: Option<ThemeId>,
    pub name: String,
    pub content: String,
}

impl Partial {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            theme_id: None,
            name: normalize_partial_name(&name.into()),
            content: content.into(),
        }
    }
}

/// Normalises a partial name: `shop;cart` and `shop:cart` name the same partial.
pub fn normalize_partial_name(name: &str) -> String {
    name.trim().replace(';', ":")
}

/// A page-wrapping template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub id: LayoutId,
    pub theme_id: Option<ThemeId>,
    pub name: String,
    pub content: String,
}

impl Layout {
    pub fn new(id: LayoutId, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id,
            theme_id: None,
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Site-wide content referenced by code, such as a footer notice or a
/// shipping banner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalContentBlock {
    #[serde(default)]
    pub theme_id: Option<ThemeId>,
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
}

impl GlobalContentBlock {
    /// Creates a block; the code is trimmed and lowercased.
    pub fn new(code: impl Into<String>, content: impl Into<String>) -> Self {
        let code = normalize_block_code(&code.into());
        Self {
            theme_id: None,
            name: code.clone(),
            code,
            content: content.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.code.trim().is_empty() {
            return Err(ValidationError::new("Please specify the block code.").with_field("code"));
        }
        let allowed = |c: char| c.is_ascii_alphanumeric() || "_-/:.".contains(c);
        if !self.code.chars().all(allowed) {
            return Err(ValidationError::new(
                "Block code can contain only latin characters, numbers and signs _, -, /, :, and .",
            )
            .with_field("code"));
        }
        Ok(())
    }
}

/// Block codes compare case-insensitively.
pub fn normalize_block_code(code: &str) -> String {
    code.trim().to_lowercase()
}

/// A site theme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub id: ThemeId,
    pub code: String,
    pub templating_engine: Option<EngineKind>,
    /// Public path of the theme's resources directory, e.g. `/themes/blue/resources`.
    pub resources_path: Option<String>,
}

impl Theme {
    pub fn new(id: ThemeId, code: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            templating_engine: None,
            resources_path: None,
        }
    }

    #[must_use]
    pub const fn with_engine(mut self, engine: EngineKind) -> Self {
        self.templating_engine = Some(engine);
        self
    }
}

/// A signed-in storefront customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
    pub group_id: Option<GroupId>,
}

impl Customer {
    pub fn new(id: CustomerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: String::new(),
            group_id: None,
        }
    }
}
