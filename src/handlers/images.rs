//! Photo download handler.
//!
//! Serves blobs stored under `images/` so that the `remote_url` of an
//! asset kept by the local blob store is publicly fetchable.

use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::errors::CatalogError;
use crate::storage::backend::validate_key;
use crate::AppState;

/// Content type from the leading magic bytes.  Blob stores keep no
/// content type, and only JPEG and PNG are accepted by default.
pub fn sniff_content_type(data: &[u8]) -> &'static str {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if data.starts_with(b"GIF8") {
        "image/gif"
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}

/// `GET /images/{owner_uid}/{asset_id}` -- Raw photo bytes.
#[utoipa::path(
    get,
    path = "/images/{owner_uid}/{asset_id}",
    tag = "Images",
    operation_id = "GetImage",
    params(
        ("owner_uid" = String, Path, description = "Seller uid"),
        ("asset_id" = String, Path, description = "Asset id")
    ),
    responses(
        (status = 200, description = "Photo bytes"),
        (status = 404, description = "No such photo"),
        (status = 503, description = "Store unavailable")
    )
)]
pub async fn get_image(state: Arc<AppState>, rest: &str) -> Result<Response, CatalogError> {
    let key = format!("images/{rest}");
    if validate_key(&key).is_err() {
        return Err(CatalogError::not_found(format!("photo {rest}")));
    }
    let data = state
        .blobs
        .get(&key)
        .await?
        .ok_or_else(|| CatalogError::not_found(format!("photo {rest}")))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, sniff_content_type(&data)),
            // Asset ids are never reused, so a key's bytes never change.
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        data,
    )
        .into_response())
}
