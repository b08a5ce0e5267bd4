//! Axum router construction.
//!
//! The [`app`] function wires the public, read-only catalog routes to their
//! handlers and returns a ready-to-serve [`axum::Router`].  Writes happen
//! only through the core API (the CLI); the HTTP surface browses, searches
//! and serves photos.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::errors::CatalogError;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the public catalog API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "carlot catalog API",
        version = "0.1.0",
        description = "Read-only vehicle listing catalog"
    ),
    paths(
        health_check,
        crate::handlers::listings::list_listings,
        crate::handlers::listings::get_listing,
        crate::handlers::images::get_image,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Listings", description = "Browse and search listings"),
        (name = "Images", description = "Listing photos"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`] with every public route.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS]);
    let metrics_enabled = state.config.observability.metrics;

    let router = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        .route("/listings", get(handle_list_listings))
        .route("/listings/:id", get(handle_get_listing))
        .route("/images/*rest", get(handle_get_image))
        .with_state(state);

    // metrics_middleware wraps the routes; trace and CORS sit outside it.
    let router = if metrics_enabled {
        router.layer(middleware::from_fn(metrics_middleware))
    } else {
        router
    };
    router.layer(cors).layer(TraceLayer::new_for_http())
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

/// `GET /openapi.json` -- The generated OpenAPI document.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// -- Dispatch ----------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListParams {
    q: Option<String>,
}

async fn handle_list_listings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Response, CatalogError> {
    crate::handlers::listings::list_listings(state, params.q.as_deref()).await
}

async fn handle_get_listing(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, CatalogError> {
    crate::handlers::listings::get_listing(state, &id).await
}

async fn handle_get_image(
    State(state): State<Arc<AppState>>,
    Path(rest): Path<String>,
) -> Result<Response, CatalogError> {
    crate::handlers::images::get_image(state, &rest).await
}
