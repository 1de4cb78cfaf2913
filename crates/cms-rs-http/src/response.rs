//! Mapping render outcomes and errors onto HTTP responses.

use axum::body::Body;
use axum::response::Response;
use http::header::{CONTENT_TYPE, LOCATION};
use http::StatusCode;

use cms_rs_core::{CmsError, CmsResult};
use cms_rs_render::outcome::PAGE_NOT_FOUND_MESSAGE;
use cms_rs_render::{AjaxOutcome, RenderOutcome};

const HTML: &str = "text/html; charset=utf-8";
const TEXT: &str = "text/plain; charset=utf-8";

pub fn page_response(result: CmsResult<RenderOutcome>, debug: bool) -> Response {
    match result {
        Ok(RenderOutcome::Rendered(html)) => respond(StatusCode::OK, HTML, html),
        Ok(RenderOutcome::NotFound(html)) => respond(StatusCode::NOT_FOUND, HTML, html),
        Ok(RenderOutcome::Redirect(url)) => redirect(&url),
        Ok(RenderOutcome::Denied) => not_found(),
        Err(err) => error_response(&err, debug),
    }
}

pub fn ajax_response(result: CmsResult<AjaxOutcome>, debug: bool) -> Response {
    match result {
        Ok(AjaxOutcome::Patch(body) | AjaxOutcome::Error(body)) => {
            respond(StatusCode::OK, HTML, body)
        }
        Ok(AjaxOutcome::Redirect(url)) => redirect(&url),
        Ok(AjaxOutcome::Denied) => not_found(),
        Err(err) => error_response(&err, debug),
    }
}

/// The response for a failed render. Only debug mode reveals the error.
pub fn error_response(err: &CmsError, debug: bool) -> Response {
    if matches!(err, CmsError::NotFound(_)) {
        tracing::debug!(error = %err, "no page for request");
        return not_found();
    }

    tracing::error!(error = %err, "render failed");
    if !debug {
        return respond(StatusCode::INTERNAL_SERVER_ERROR, TEXT, "Internal Server Error".to_string());
    }

    let mut body = format!("<h1>{}</h1>\n", escape(&err.to_string()));
    if let CmsError::Execution(e) = err {
        body.push_str(&format!("<pre>{}</pre>\n", escape(&e.trace())));
    }
    respond(StatusCode::INTERNAL_SERVER_ERROR, HTML, body)
}

pub fn payload_too_large() -> Response {
    respond(StatusCode::PAYLOAD_TOO_LARGE, TEXT, "Payload Too Large".to_string())
}

fn not_found() -> Response {
    respond(StatusCode::NOT_FOUND, HTML, PAGE_NOT_FOUND_MESSAGE.to_string())
}

fn redirect(url: &str) -> Response {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(LOCATION, url)
        .body(Body::empty())
        .unwrap_or_else(|_| respond(StatusCode::INTERNAL_SERVER_ERROR, TEXT, "Invalid redirect".to_string()))
}

fn respond(status: StatusCode, content_type: &'static str, body: String) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, http::HeaderValue::from_static(content_type));
    response
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
