//! Prometheus metrics for carlot.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides a middleware for HTTP RED
//! metrics, and exposes the `/metrics` endpoint handler.  Without an
//! installed recorder every `counter!` call is a no-op, so the core records
//! unconditionally.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "carlot_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "carlot_http_request_duration_seconds";

/// Total catalog operations (counter). Labels: operation, status.
pub const CATALOG_OPERATIONS_TOTAL: &str = "carlot_catalog_operations_total";

/// Total asset operations (counter). Labels: operation, status.
pub const ASSET_OPERATIONS_TOTAL: &str = "carlot_asset_operations_total";

/// Total bytes uploaded to the blob store (counter).
pub const BYTES_UPLOADED_TOTAL: &str = "carlot_bytes_uploaded_total";

/// Blobs left behind by a failed delete (counter).
pub const ORPHAN_BLOBS_TOTAL: &str = "carlot_orphan_blobs_total";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(CATALOG_OPERATIONS_TOTAL, "Total catalog operations by type");
    describe_counter!(ASSET_OPERATIONS_TOTAL, "Total asset operations by type");
    describe_counter!(BYTES_UPLOADED_TOTAL, "Total photo bytes uploaded");
    describe_counter!(
        ORPHAN_BLOBS_TOTAL,
        "Blobs left unreferenced after a failed delete"
    );
}

/// Count one catalog operation outcome.
pub fn record_catalog_op(operation: &'static str, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    counter!(CATALOG_OPERATIONS_TOTAL, "operation" => operation, "status" => status).increment(1);
}

/// Count one asset operation outcome.
pub fn record_asset_op(operation: &'static str, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    counter!(ASSET_OPERATIONS_TOTAL, "operation" => operation, "status" => status).increment(1);
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize a request path to its route template for metric labels.
///
/// - `/listings/abc123` -> `/listings/{id}`
/// - `/images/uid/asset` -> `/images/{key}`
/// - anything unrouted -> `/{other}`
fn normalize_path(path: &str) -> String {
    match path {
        "/" | "/health" | "/metrics" | "/openapi.json" | "/listings" => path.to_string(),
        _ if path.starts_with("/listings/") => "/listings/{id}".to_string(),
        _ if path.starts_with("/images/") => "/images/{key}".to_string(),
        _ => "/{other}".to_string(),
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics are disabled").into_response(),
    }
}

// -- Tests --------------------------------------------------------------------
