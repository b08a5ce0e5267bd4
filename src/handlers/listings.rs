//! Listing browse, search and detail handlers.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::catalog::Listing;
use crate::errors::CatalogError;
use crate::AppState;

/// A listing plus the link that opens a chat with its seller.
#[derive(Debug, Serialize, ToSchema)]
pub struct ListingDetail {
    #[serde(flatten)]
    pub listing: Listing,
    pub contact_link: String,
}

/// `GET /listings` -- Newest first, or a title prefix search with `?q=`.
///
/// Search results come back in store order, not newest first.
#[utoipa::path(
    get,
    path = "/listings",
    tag = "Listings",
    operation_id = "ListListings",
    params(
        ("q" = Option<String>, Query, description = "Case-insensitive title prefix")
    ),
    responses(
        (status = 200, description = "Listings", body = Vec<Listing>),
        (status = 503, description = "Store unavailable")
    )
)]
pub async fn list_listings(
    state: Arc<AppState>,
    q: Option<&str>,
) -> Result<Response, CatalogError> {
    let listings = match q {
        Some(prefix) => state.catalog.search_by_name(prefix).await?,
        None => state.catalog.list_all().await?,
    };
    Ok((StatusCode::OK, Json(listings)).into_response())
}

/// `GET /listings/{id}` -- One listing with its contact link.
#[utoipa::path(
    get,
    path = "/listings/{id}",
    tag = "Listings",
    operation_id = "GetListing",
    params(
        ("id" = String, Path, description = "Listing id")
    ),
    responses(
        (status = 200, description = "Listing detail", body = ListingDetail),
        (status = 404, description = "No such listing"),
        (status = 503, description = "Store unavailable")
    )
)]
pub async fn get_listing(state: Arc<AppState>, id: &str) -> Result<Response, CatalogError> {
    let listing = state.catalog.get_listing(id).await?;
    let contact_link = listing.contact_link(&state.config.catalog.site_name);
    Ok((
        StatusCode::OK,
        Json(ListingDetail {
            listing,
            contact_link,
        }),
    )
        .into_response())
}
