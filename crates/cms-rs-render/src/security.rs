//! Page security: protocol enforcement, security modes and ticket handling.
//!
//! Security runs before anything is rendered. Its verdicts are ordinary
//! values ([`SecurityVerdict`]) rather than errors, so an expected redirect
//! never travels through the error path.

use cms_rs_core::content::Protocol;
use cms_rs_core::request::{absolute_url, encode_query, root_url, urlencode};
use cms_rs_core::settings::SecuritySettings;
use cms_rs_core::{CmsRequest, Page};
use cms_rs_signals::PageEvent;

use crate::controller::Controller;

/// Why a request must not be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityVerdict {
    Redirect(String),
    /// No redirect page is configured; the fixed not-found body is sent.
    Denied,
}

/// Issues the re-authentication ticket carried across a protocol switch.
pub trait TicketIssuer: Send + Sync {
    fn issue(&self, request: &CmsRequest) -> String;
}

/// Issues random v4 UUID tickets.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidTicketIssuer;

impl TicketIssuer for UuidTicketIssuer {
    fn issue(&self, _request: &CmsRequest) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

/// Encodes the current URI so that it fits in a single URL segment, for use
/// with `redirect_url` on the page a visitor is sent to.
///
/// ```
/// use cms_rs_core::CmsRequest;
/// use cms_rs_render::security::create_redirect_url;
///
/// let request = CmsRequest::from_uri("/Account/Orders?page=2");
/// assert_eq!(create_redirect_url(&request, false), "%7Caccount%7Corders");
/// assert_eq!(create_redirect_url(&request, true), "%7Caccount%7Corders/?page=2");
/// ```
pub fn create_redirect_url(request: &CmsRequest, include_query: bool) -> String {
    let url = urlencode(&request.path.to_lowercase().replace('/', "|"));
    let query = request.query_string();
    if include_query && !query.is_empty() {
        format!("{url}/?{query}")
    } else {
        url
    }
}

/// The URL that serves `page` over `scheme`, keeping the request parameters
/// and query fields and carrying a re-authentication ticket.
pub fn protocol_redirect_url(
    scheme: &str,
    page: &Page,
    request: &CmsRequest,
    params: &[String],
    settings: &SecuritySettings,
    ticket: &str,
) -> String {
    let param_str = if !params.is_empty() {
        format!("/{}/", params.join("/"))
    } else if page.url != "/" {
        "/".to_string()
    } else {
        String::new()
    };

    let mut query: Vec<(&str, &str)> = request
        .query
        .iter()
        .filter(|(name, _)| *name != settings.request_param_name)
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    query.push((settings.ticket_param_name.as_str(), ticket));
    if let Some(session_id) = request.session_id.as_deref() {
        query.push((settings.session_param_name.as_str(), session_id));
    }

    let base = absolute_url(scheme, &request.host, &settings.root_path, &page.url);
    let base = if param_str.is_empty() {
        base
    } else {
        format!("{}{param_str}", base.trim_end_matches('/'))
    };
    format!("{base}?{}", encode_query(query))
}

/// Where a visitor excluded by the page's security mode is sent.
pub fn security_redirect_url(target: &Page, request: &CmsRequest, settings: &SecuritySettings) -> String {
    if target.url == "/" {
        root_url(&settings.root_path, "/")
    } else {
        format!(
            "{}/{}",
            root_url(&settings.root_path, &target.url),
            create_redirect_url(request, true)
        )
    }
}

impl Controller {
    /// Runs every security rule for the current page, in order, and returns
    /// the first verdict that stops the render.
    pub(crate) fn apply_security(&self) -> Option<SecurityVerdict> {
        let site = self.site();
        let settings = &site.settings().security;
        let page = self.page();
        let request = self.request();

        if let Some(scheme) = page.protocol.scheme() {
            if request.protocol != scheme {
                let ticket = site.tickets().issue(request);
                let url = protocol_redirect_url(scheme, &page, request, self.params(), settings, &ticket);
                tracing::info!(page_id = page.id, url = url.as_str(), "protocol redirect");
                return Some(SecurityVerdict::Redirect(url));
            }
        }

        if !page.security_mode.admits(request.customer.is_some()) || page.protocol == Protocol::None {
            let target = page
                .security_redirect_id
                .and_then(|id| site.repository().find_page(self.content_scope(), id));
            return Some(match target {
                Some(target) => {
                    let url = security_redirect_url(&target, request, settings);
                    tracing::info!(page_id = page.id, url = url.as_str(), "security redirect");
                    SecurityVerdict::Redirect(url)
                }
                None => SecurityVerdict::Denied,
            });
        }

        if settings.ticket_auto_redirect && request.field(&settings.ticket_param_name).is_some() {
            return Some(SecurityVerdict::Redirect(request.path.clone()));
        }

        let event = PageEvent {
            page,
            params: self.params().to_vec(),
        };
        site.hooks()
            .apply_page_security
            .first(&event)
            .map(SecurityVerdict::Redirect)
    }
}
