//! The Axum application.
//!
//! [`CmsApp`] routes every path to a [`Site`]. Rendering is synchronous, so
//! each request runs on Tokio's blocking pool inside its own tracing span.
//!
//! # Examples
//!
//! ```no_run
//! use cms_rs_core::Settings;
//! use cms_rs_http::CmsApp;
//! use cms_rs_render::Site;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let site = Site::builder(Settings::default()).build()?;
//! CmsApp::new(site).run("127.0.0.1:8000").await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::response::Response;
use axum::routing::any;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use cms_rs_core::logging::request_span;
use cms_rs_core::{CmsError, CmsResult};
use cms_rs_render::{AjaxOutcome, RenderOutcome, Site};

use crate::extract::{self, CustomerResolver, ExtractConfig, GuestsOnly};
use crate::response;

/// Largest request body read into memory.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// A [`Site`] served over HTTP.
pub struct CmsApp {
    site: Site,
    customers: Arc<dyn CustomerResolver>,
}

enum Rendered {
    Page(CmsResult<RenderOutcome>),
    Ajax(CmsResult<AjaxOutcome>),
}

impl CmsApp {
    pub fn new(site: Site) -> Self {
        Self {
            site,
            customers: Arc::new(GuestsOnly),
        }
    }

    /// Sets how signed-in customers are recognised. Defaults to [`GuestsOnly`].
    #[must_use]
    pub fn customers(mut self, resolver: Arc<dyn CustomerResolver>) -> Self {
        self.customers = resolver;
        self
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn into_axum_router(self) -> axum::Router {
        let app = Arc::new(self);
        let handler = move |req: Request<Body>| {
            let app = Arc::clone(&app);
            async move { app.serve(req).await }
        };

        axum::Router::new()
            .route("/{*path}", any(handler.clone()))
            .route("/", any(handler))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    async fn serve(&self, req: Request<Body>) -> Response {
        let settings = self.site.settings();
        let debug = settings.debug;
        let (parts, body) = req.into_parts();
        let Ok(body) = axum::body::to_bytes(body, MAX_BODY_BYTES).await else {
            return response::payload_too_large();
        };

        let config = ExtractConfig {
            default_protocol: &settings.server.default_protocol,
            session_cookie: &settings.security.session_param_name,
        };
        let request = extract::cms_request(&parts, &body, &config, self.customers.as_ref());
        let ajax = extract::ajax_call(&parts.headers);

        let request_id = uuid::Uuid::new_v4().simple().to_string();
        let span = request_span(&request_id, &request.path);
        let site = self.site.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            match ajax {
                Some(call) => Rendered::Ajax(site.handle_ajax(request, &call.handler, &call.updates)),
                None => Rendered::Page(site.display(request)),
            }
        })
        .await;

        match joined {
            Ok(Rendered::Page(result)) => response::page_response(result, debug),
            Ok(Rendered::Ajax(result)) => response::ajax_response(result, debug),
            Err(e) => response::error_response(&CmsError::Internal(format!("render task failed: {e}")), debug),
        }
    }

    /// Binds `addr` and serves until the server stops.
    ///
    /// # Errors
    ///
    /// [`CmsError::Configuration`] if the address cannot be bound, or
    /// [`CmsError::Io`] if the server fails.
    pub async fn run(self, addr: &str) -> CmsResult<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| CmsError::Configuration(format!("Failed to bind to {addr}: {e}")))?;
        tracing::info!(addr, "serving CMS");

        axum::serve(listener, self.into_axum_router())
            .await
            .map_err(|e| CmsError::Io(format!("Server error: {e}")))
    }
}

impl std::fmt::Debug for CmsApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmsApp")
            .field("site", &self.site)
            .finish_non_exhaustive()
    }
}
