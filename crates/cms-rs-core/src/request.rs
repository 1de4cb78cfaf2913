//! The front-end request model and URL helpers.
//!
//! [`CmsRequest`] is the transport-independent view of an inbound request
//! that the rendering pipeline works with. The HTTP layer builds one from an
//! Axum request; tests build them directly.

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

use crate::content::Customer;

/// A front-end request as seen by the renderer.
///
/// # Examples
///
/// ```
/// use cms_rs_core::request::CmsRequest;
///
/// let request = CmsRequest::from_uri("/shop/category/shoes?page=2&q=shop")
///     .with_protocol("https");
/// assert_eq!(request.path, "/shop/category/shoes");
/// assert_eq!(request.query_param("page"), Some("2"));
/// assert!(request.is_secure());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmsRequest {
    /// Request path without the query string, always starting with `/`.
    pub path: String,
    /// Query string pairs in the order they arrived.
    pub query: Vec<(String, String)>,
    /// Urlencoded form fields from a POST body.
    pub form: Vec<(String, String)>,
    /// `http` or `https`.
    pub protocol: String,
    pub host: String,
    pub customer: Option<Customer>,
    pub session_id: Option<String>,
}

impl Default for CmsRequest {
    fn default() -> Self {
        Self::new("/")
    }
}

impl CmsRequest {
    /// Creates a plain `GET` request for `path` over `http://localhost`.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            path: if path.starts_with('/') { path } else { format!("/{path}") },
            query: Vec::new(),
            form: Vec::new(),
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            customer: None,
            session_id: None,
        }
    }

    /// Splits a request URI into its path and query pairs.
    pub fn from_uri(uri: &str) -> Self {
        match uri.split_once('?') {
            Some((path, query)) => {
                let mut request = Self::new(path);
                request.query = parse_query(query);
                request
            }
            None => Self::new(uri),
        }
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into().to_ascii_lowercase();
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn with_customer(mut self, customer: Customer) -> Self {
        self.customer = Some(customer);
        self
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_form_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((key.into(), value.into()));
        self
    }

    pub fn is_secure(&self) -> bool {
        self.protocol == "https"
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Looks a field up in the POST body first, then in the query string.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .chain(self.query.iter())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The serialized query string, without the leading `?`.
    pub fn query_string(&self) -> String {
        encode_query(self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// The path plus query string, as the visitor requested it.
    pub fn uri(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query_string())
        }
    }
}

/// Parses an urlencoded query string into ordered pairs.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Serializes pairs into an urlencoded query string.
pub fn encode_query<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// Form-style URL encoding: spaces become `+`, reserved bytes are escaped.
pub fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Reverses [`urlencode`].
pub fn urldecode(value: &str) -> String {
    percent_decode_str(&value.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

/// Joins a site-relative path onto the configured root path.
///
/// ```
/// use cms_rs_core::request::root_url;
///
/// assert_eq!(root_url("", "/"), "/");
/// assert_eq!(root_url("/store/", "/about"), "/store/about");
/// assert_eq!(root_url("", "cms_js_combine/?f=x"), "/cms_js_combine/?f=x");
/// ```
pub fn root_url(root_path: &str, path: &str) -> String {
    let root = root_path.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    let root = if root.is_empty() || root.starts_with('/') {
        root.to_string()
    } else {
        format!("/{root}")
    };
    format!("{root}/{path}")
}

/// Builds an absolute URL for `path` on `host` over `scheme`.
pub fn absolute_url(scheme: &str, host: &str, root_path: &str, path: &str) -> String {
    format!("{scheme}://{host}{}", root_url(root_path, path))
}
