//! # depot: File Management over Object Storage
//!
//! `depot` is a small, self-hostable control layer for files kept in an
//! object-storage bucket. It exposes a RESTful API for listing, uploading,
//! deleting, and linking to files, and bridges two incompatible shapes of
//! storage backend behind one contract.
//!
//! ## Overview
//!
//! Applications that outgrow "a directory on disk" usually reach for a hosted
//! object store, and then immediately re-implement the same handful of
//! operations against whichever vendor API they picked. `depot` extracts that
//! layer: clients talk about files by name over a stable JSON API, and the
//! serving process translates to the configured backend.
//!
//! Two backend families are supported:
//!
//! - **ID-indexed** (Appwrite-compatible): objects live under
//!   server-generated IDs and the filename is metadata. Name-addressed
//!   operations resolve the name through a filtered listing first, and
//!   replacing a file is a delete-then-create sequence.
//! - **Path-indexed** (Supabase-compatible): the filename is the object key.
//!   Operations map one-to-one onto backend calls and overwrite semantics are
//!   delegated to the backend.
//!
//! The API surface never exposes which family is configured. Where the
//! families genuinely differ in capability (signed URLs with enforced expiry
//! versus permanent download links), the difference is reported as metadata
//! on the response rather than a different shape.
//!
//! ### Request Flow
//!
//! Requests to `/api/*` pass through the API-key middleware
//! ([`auth::require_api_key_middleware`]), which compares the `x-api-key`
//! header against the configured secret before any handler runs. Handlers
//! ([`api::handlers`]) validate the request, call the storage backend through
//! the [`storage::FileStore`] trait object held in [`AppState`], and shape
//! the outcome into the wire models ([`api::models`]). Failures funnel
//! through [`errors::Error`], which maps them onto the HTTP taxonomy and a
//! JSON `{"error": "..."}` body.
//!
//! The `/health` endpoint and the generated API documentation under `/docs`
//! are public.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use depot::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Parse CLI arguments and load configuration
//!     let args = depot::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     // Initialize telemetry (structured logging)
//!     depot::telemetry::init_telemetry()?;
//!
//!     // Create and start the application with graceful shutdown on Ctrl+C
//!     Application::new(config)?
//!         .serve(async {
//!             tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!         })
//!         .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
mod openapi;
pub mod storage;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

#[cfg(test)]
mod test;

use crate::auth::require_api_key_middleware;
use crate::config::CorsOrigin;
use crate::openapi::ApiDoc;
use crate::storage::FileStore;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
pub use config::Config;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// Application state shared across all request handlers.
///
/// Holds the loaded configuration and the storage backend selected from it
/// at startup. The backend sits behind a trait object so handlers stay
/// oblivious to which one is running.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn FileStore>,
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let has_wildcard = config
        .cors
        .allowed_origins
        .iter()
        .any(|origin| matches!(origin, CorsOrigin::Wildcard));

    // tower-http rejects a literal `*` inside an origin list; the wildcard
    // goes through the `Any` marker instead.
    let mut cors = if has_wildcard {
        CorsLayer::new().allow_origin(Any)
    } else {
        let mut origins = Vec::new();
        for origin in &config.cors.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                // Serialize as an RFC 6454 origin; Url::as_str carries a
                // trailing slash browsers never send.
                origins.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        CorsLayer::new().allow_origin(origins)
    };

    cors = cors
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(auth::API_KEY_HEADER)])
        .allow_credentials(config.cors.allow_credentials);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Unmatched paths. Bare OPTIONS still answers 200 so permissive clients
/// that probe before sending do not see an error.
async fn route_not_found(method: Method) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}

/// Matched path, unsupported method.
async fn method_not_allowed(method: Method) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    (StatusCode::METHOD_NOT_ALLOWED, Json(json!({ "error": "Method not allowed" }))).into_response()
}

/// Build the application router with all endpoints and middleware.
///
/// Routes under `/api` require the `x-api-key` header. `/health`, the
/// interactive documentation at `/docs`, and the raw OpenAPI document at
/// `/api-docs/openapi.json` are public. The delete endpoint is additionally
/// registered for POST, for clients that cannot send DELETE bodies.
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        .route("/list", get(api::handlers::files::list_files))
        .route("/upload", post(api::handlers::files::upload_file))
        .route(
            "/delete",
            delete(api::handlers::files::delete_file).post(api::handlers::files::delete_file),
        )
        .route("/signed-url", post(api::handlers::files::signed_url))
        .method_not_allowed_fallback(method_not_allowed)
        .route_layer(from_fn_with_state(state.clone(), require_api_key_middleware))
        .with_state(state.clone());

    let router = Router::new()
        .route("/health", get(api::handlers::health::health))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .fallback(route_not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(create_cors_layer(&state.config)?)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// The running service: configuration, state, and the serving lifecycle.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!(
            backend = config.storage.kind(),
            bucket = config.storage.bucket(),
            "Starting depot"
        );

        let store = storage::from_config(&config)?;
        let state = AppState {
            config: config.clone(),
            store,
        };
        let router = build_router(&state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "depot listening on http://{}, backend: {} (bucket: {})",
            bind_addr,
            self.config.storage.kind(),
            self.config.storage.bucket()
        );

        // Run the server with graceful shutdown
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Server stopped");
        Ok(())
    }
}
