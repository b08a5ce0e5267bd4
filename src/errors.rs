//! Catalog error types.
//!
//! Every fallible core operation returns [`CatalogError`].  The enum
//! implements [`axum::response::IntoResponse`] so handlers can simply
//! return `Err(CatalogError::NotFound { .. })`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Error kinds surfaced by the session, asset coordinator and catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The operation requires a signed-in identity and none is present.
    #[error("You must be signed in to perform this operation")]
    Unauthenticated,

    /// Input was rejected before any store was contacted.
    #[error("{message}")]
    ValidationFailed { message: String },

    /// The signed-in identity does not own the target resource.
    #[error("{message}")]
    PermissionDenied { message: String },

    /// A referenced record or blob is absent.
    #[error("{what} was not found")]
    NotFound { what: String },

    /// Network or backend failure from a blob store, document store or
    /// identity provider.
    #[error("The backing store is unavailable: {0}")]
    StoreUnavailable(#[from] anyhow::Error),
}

impl CatalogError {
    /// Shorthand for [`CatalogError::ValidationFailed`].
    pub fn validation(message: impl Into<String>) -> Self {
        CatalogError::ValidationFailed {
            message: message.into(),
        }
    }

    /// Shorthand for [`CatalogError::NotFound`].
    pub fn not_found(what: impl Into<String>) -> Self {
        CatalogError::NotFound { what: what.into() }
    }

    /// Return the stable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::Unauthenticated => "Unauthenticated",
            CatalogError::ValidationFailed { .. } => "ValidationFailed",
            CatalogError::PermissionDenied { .. } => "PermissionDenied",
            CatalogError::NotFound { .. } => "NotFound",
            CatalogError::StoreUnavailable(_) => "StoreUnavailable",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CatalogError::Unauthenticated => StatusCode::UNAUTHORIZED,
            CatalogError::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
            CatalogError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            CatalogError::NotFound { .. } => StatusCode::NOT_FOUND,
            CatalogError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<garde::Report> for CatalogError {
    fn from(report: garde::Report) -> Self {
        CatalogError::validation(report.to_string().trim().to_string())
    }
}

/// JSON body rendered for every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    request_id: String,
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let request_id = generate_request_id();
        let status = self.status_code();

        if let CatalogError::StoreUnavailable(ref err) = self {
            tracing::error!(request_id = %request_id, "Store failure: {err:#}");
        }

        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
            request_id: request_id.clone(),
        };

        (status, [("x-request-id", request_id)], Json(body)).into_response()
    }
}
