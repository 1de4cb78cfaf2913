//! Turning an HTTP request into a [`CmsRequest`].

use http::header::{CONTENT_TYPE, COOKIE, HOST};
use http::request::Parts;
use http::HeaderMap;

use cms_rs_core::request::parse_query;
use cms_rs_core::{CmsRequest, Customer};

/// Names the AJAX handler to run. Its presence marks an AJAX request.
pub const HANDLER_HEADER: &str = "x-cms-handler";

/// Urlencoded `element-id=partial-name` pairs to render after the handler.
pub const UPDATE_HEADER: &str = "x-cms-update";

const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";

/// Identifies the signed-in customer for a request.
pub trait CustomerResolver: Send + Sync {
    fn resolve(&self, parts: &Parts) -> Option<Customer>;
}

/// Treats every visitor as a guest.
#[derive(Debug, Default, Clone, Copy)]
pub struct GuestsOnly;

impl CustomerResolver for GuestsOnly {
    fn resolve(&self, _parts: &Parts) -> Option<Customer> {
        None
    }
}

/// An AJAX handler call read from the request headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AjaxCall {
    pub handler: String,
    pub updates: Vec<(String, String)>,
}

/// Where the transport reads request metadata from.
#[derive(Debug, Clone)]
pub struct ExtractConfig<'a> {
    pub default_protocol: &'a str,
    /// Cookie carrying the session id.
    pub session_cookie: &'a str,
}

/// Builds the pipeline's request model from the request head and body.
pub fn cms_request(
    parts: &Parts,
    body: &[u8],
    config: &ExtractConfig<'_>,
    customers: &dyn CustomerResolver,
) -> CmsRequest {
    let mut request = CmsRequest::new(parts.uri.path());
    request.query = parse_query(parts.uri.query().unwrap_or_default());
    if is_form(&parts.headers) {
        request.form = parse_query(&String::from_utf8_lossy(body));
    }
    request.protocol = header(&parts.headers, FORWARDED_PROTO_HEADER)
        .and_then(|value| value.split(',').next())
        .map(|proto| proto.trim().to_ascii_lowercase())
        .filter(|proto| !proto.is_empty())
        .unwrap_or_else(|| config.default_protocol.to_string());
    if let Some(host) = header(&parts.headers, HOST.as_str()).or_else(|| parts.uri.host()) {
        request.host = host.to_string();
    }
    request.session_id = cookie(&parts.headers, config.session_cookie);
    request.customer = customers.resolve(parts);
    request
}

/// Reads the AJAX handler call, if the request is one.
pub fn ajax_call(headers: &HeaderMap) -> Option<AjaxCall> {
    let handler = header(headers, HANDLER_HEADER)?.trim();
    if handler.is_empty() {
        return None;
    }
    let updates = header(headers, UPDATE_HEADER)
        .map(parse_query)
        .unwrap_or_default();
    Some(AjaxCall {
        handler: handler.to_string(),
        updates,
    })
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn is_form(headers: &HeaderMap) -> bool {
    header(headers, CONTENT_TYPE.as_str())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    const CONFIG: ExtractConfig<'static> = ExtractConfig {
        default_protocol: "http",
        session_cookie: "cms_session_id",
    };

    fn parts(builder: http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_extracts_path_query_and_form() {
        let parts = parts(
            Request::post("/shop/cart?coupon=A%201")
                .header(HOST, "shop.example")
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8")
                .header(COOKIE, "theme=dark; cms_session_id=s42"),
        );
        let request = cms_request(&parts, b"qty=2&sku=X", &CONFIG, &GuestsOnly);
        assert_eq!(request.path, "/shop/cart");
        assert_eq!(request.query_param("coupon"), Some("A 1"));
        assert_eq!(request.field("qty"), Some("2"));
        assert_eq!(request.host, "shop.example");
        assert_eq!(request.protocol, "http");
        assert_eq!(request.session_id.as_deref(), Some("s42"));
        assert!(request.customer.is_none());
    }

    #[test]
    fn test_forwarded_proto_wins() {
        let parts = parts(Request::get("/").header("X-Forwarded-Proto", "HTTPS, http"));
        assert_eq!(cms_request(&parts, b"", &CONFIG, &GuestsOnly).protocol, "https");
    }

    #[test]
    fn test_non_form_body_is_ignored() {
        let parts = parts(Request::post("/").header(CONTENT_TYPE, "application/json"));
        let request = cms_request(&parts, br#"{"a":1}"#, &CONFIG, &GuestsOnly);
        assert!(request.form.is_empty());
    }

    #[test]
    fn test_ajax_call_keeps_update_order() {
        let mut headers = HeaderMap::new();
        headers.insert(HANDLER_HEADER, "shop:on_add".parse().unwrap());
        headers.insert(UPDATE_HEADER, "z-box=mini&a-box=shop%3Acart".parse().unwrap());
        assert_eq!(
            ajax_call(&headers),
            Some(AjaxCall {
                handler: "shop:on_add".into(),
                updates: vec![
                    ("z-box".into(), "mini".into()),
                    ("a-box".into(), "shop:cart".into()),
                ],
            })
        );
        assert_eq!(ajax_call(&HeaderMap::new()), None);
    }
}
