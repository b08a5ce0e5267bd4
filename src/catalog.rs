//! The listing catalog.
//!
//! A listing lives in two stores that share no transaction: its record in
//! the document store and its photos in the blob store.  Creation requires
//! the photos to be uploaded first; deletion removes the record first and
//! then each photo independently.  A photo whose delete fails stays behind
//! as an orphan and is reported in the [`DeleteReport`], never retried.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::join_all;
use garde::Validate;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::assets::{Asset, AssetCoordinator, Draft};
use crate::errors::CatalogError;
use crate::identity::provider::Identity;
use crate::metadata::store::{Direction, DocumentStore, Filter, Query, StoredDocument};
use crate::metrics::{record_catalog_op, ORPHAN_BLOBS_TOTAL};

/// Collection used when none is configured.
pub const DEFAULT_COLLECTION: &str = "listings";

/// Largest Unicode scalar value; closes the prefix range of a title search.
const MAX_CODE_POINT: char = '\u{10FFFF}';

/// Source of `created_at` timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Seller-entered listing details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct ListingFields {
    #[garde(length(min = 1))]
    pub title: String,
    #[garde(length(min = 1))]
    pub model: String,
    #[garde(length(min = 1))]
    pub city: String,
    #[garde(range(min = 1886, max = 2100))]
    pub year: u16,
    #[garde(skip)]
    pub odometer_km: u64,
    #[garde(skip)]
    pub price: u64,
    /// Chat number, 10 or 11 digits.
    #[garde(pattern(r"^\d{10,11}$"))]
    pub phone_contact: String,
    #[garde(length(min = 1))]
    pub description: String,
}

impl ListingFields {
    /// Trim free text and upper-case the title.
    fn normalized(self) -> Self {
        Self {
            title: self.title.trim().to_uppercase(),
            model: self.model.trim().to_string(),
            city: self.city.trim().to_string(),
            phone_contact: self.phone_contact.trim().to_string(),
            description: self.description.trim().to_string(),
            ..self
        }
    }
}

/// A persisted listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Listing {
    /// Assigned by the document store.
    pub id: String,
    pub owner_uid: String,
    pub owner_name: String,
    /// Always upper case.
    pub title: String,
    pub model: String,
    pub city: String,
    pub year: u16,
    pub odometer_km: u64,
    pub price: u64,
    pub phone_contact: String,
    pub description: String,
    /// RFC 3339 UTC with microseconds; sorts chronologically as a string.
    pub created_at: String,
    /// Photos in display order.
    pub assets: Vec<Asset>,
}

impl Listing {
    /// Chat deep link that opens a conversation with the seller.
    pub fn contact_link(&self, site_name: &str) -> String {
        let message = format!(
            "Hello, I saw the {} on {} and I'm interested. Is it still available?",
            self.title, site_name
        );
        format!(
            "https://api.whatsapp.com/send?phone={}&text={}",
            utf8_percent_encode(&self.phone_contact, NON_ALPHANUMERIC),
            utf8_percent_encode(&message, NON_ALPHANUMERIC)
        )
    }

    fn from_document(doc: StoredDocument) -> Result<Self, CatalogError> {
        let mut fields = doc.fields;
        fields.insert("id".to_string(), Value::String(doc.id.clone()));
        serde_json::from_value(Value::Object(fields)).map_err(|e| {
            CatalogError::StoreUnavailable(
                anyhow::Error::new(e).context(format!("malformed listing record {}", doc.id)),
            )
        })
    }
}

/// A photo whose blob could not be deleted.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AssetFailure {
    pub asset_id: String,
    pub storage_key: String,
    pub reason: String,
}

/// Per-step outcome of a cascade delete.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DeleteReport {
    pub listing_id: String,
    /// Assets whose blobs were deleted.
    pub deleted: Vec<String>,
    /// Assets whose blobs remain.
    pub failed: Vec<AssetFailure>,
}

impl DeleteReport {
    /// Whether every blob was deleted.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Catalog {
    documents: Arc<dyn DocumentStore>,
    coordinator: Arc<AssetCoordinator>,
    collection: String,
    clock: Clock,
}

impl Catalog {
    pub fn new(documents: Arc<dyn DocumentStore>, coordinator: Arc<AssetCoordinator>) -> Self {
        Self {
            documents,
            coordinator,
            collection: DEFAULT_COLLECTION.to_string(),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_collection(mut self, collection: &str) -> Self {
        self.collection = collection.to_string();
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn coordinator(&self) -> &Arc<AssetCoordinator> {
        &self.coordinator
    }

    /// Persist a listing referencing a copy of `staged`.
    ///
    /// All checks run before the document store is contacted.  Not
    /// idempotent: a retry after an ambiguous failure can create a second
    /// record.
    pub async fn create_listing(
        &self,
        owner: Option<&Identity>,
        fields: ListingFields,
        staged: &[Asset],
    ) -> Result<String, CatalogError> {
        let owner = owner.ok_or(CatalogError::Unauthenticated)?;
        if staged.is_empty() {
            return Err(CatalogError::validation(
                "A listing needs at least one photo",
            ));
        }
        if let Some(foreign) = staged.iter().find(|a| a.owner_uid != owner.uid) {
            return Err(CatalogError::validation(format!(
                "Photo {} belongs to another seller",
                foreign.asset_id
            )));
        }
        let fields = fields.normalized();
        fields.validate()?;

        let listing = Listing {
            id: String::new(),
            owner_uid: owner.uid.clone(),
            owner_name: owner.display_name.clone(),
            title: fields.title,
            model: fields.model,
            city: fields.city,
            year: fields.year,
            odometer_km: fields.odometer_km,
            price: fields.price,
            phone_contact: fields.phone_contact,
            description: fields.description,
            created_at: (self.clock)().to_rfc3339_opts(SecondsFormat::Micros, true),
            assets: staged.to_vec(),
        };
        let Value::Object(mut document) = serde_json::to_value(&listing)
            .map_err(|e| CatalogError::StoreUnavailable(e.into()))?
        else {
            return Err(CatalogError::StoreUnavailable(anyhow::anyhow!(
                "listing did not encode as a JSON object"
            )));
        };
        document.remove("id");

        let result = self.documents.insert(&self.collection, document).await;
        record_catalog_op("create", result.is_ok());
        let id = result?;
        info!(
            listing_id = %id,
            owner = %owner.uid,
            photos = staged.len(),
            "Created listing {}",
            listing.title
        );
        Ok(id)
    }

    /// Create a listing from everything staged in `draft`.
    ///
    /// On success the draft is cleared.  Errors raised before the document
    /// store is contacted abandon the draft and delete its blobs.  A store
    /// failure is ambiguous (the record may have landed), so the draft and
    /// its blobs are kept for the caller to retry or inspect.
    pub async fn publish_draft(
        &self,
        owner: Option<&Identity>,
        fields: ListingFields,
        draft: &Draft,
    ) -> Result<String, CatalogError> {
        match self.create_listing(owner, fields, &draft.snapshot()).await {
            Ok(id) => {
                draft.clear();
                Ok(id)
            }
            Err(err @ CatalogError::StoreUnavailable(_)) => {
                let staged: Vec<String> = draft
                    .snapshot()
                    .into_iter()
                    .map(|a| a.asset_id)
                    .collect();
                warn!(
                    staged = ?staged,
                    "Listing may or may not have been saved; keeping staged photos"
                );
                Err(err)
            }
            Err(err) => {
                draft.abandon().await;
                Err(err)
            }
        }
    }

    /// Every listing, newest first.  No pagination.
    pub async fn list_all(&self) -> Result<Vec<Listing>, CatalogError> {
        let query = Query::all().order_by("created_at", Direction::Descending);
        self.run_query("list_all", query).await
    }

    /// Listings whose title starts with `prefix`, ignoring case.
    ///
    /// Results come in the store's native order, unlike [`Self::list_all`].
    /// An empty prefix lists everything.
    pub async fn search_by_name(&self, prefix: &str) -> Result<Vec<Listing>, CatalogError> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return self.list_all().await;
        }
        let start = prefix.to_uppercase();
        let end = format!("{start}{MAX_CODE_POINT}");
        let query = Query::all().filter(Filter::range("title", start, end));
        self.run_query("search", query).await
    }

    /// Listings of one seller, in no particular order.
    pub async fn list_owned_by(&self, owner_uid: &str) -> Result<Vec<Listing>, CatalogError> {
        let query = Query::all().filter(Filter::eq("owner_uid", owner_uid));
        self.run_query("list_owned_by", query).await
    }

    pub async fn get_listing(&self, id: &str) -> Result<Listing, CatalogError> {
        let result = self.documents.get(&self.collection, id).await;
        record_catalog_op("get", result.is_ok());
        match result? {
            Some(doc) => Listing::from_document(doc),
            None => Err(CatalogError::not_found(format!("listing {id}"))),
        }
    }

    /// Delete a listing and then its photos.
    ///
    /// The record goes first; if that fails no photo is touched.  Photos
    /// are then deleted concurrently and independently, and each outcome
    /// lands in the report.
    pub async fn delete_listing(
        &self,
        owner: Option<&Identity>,
        listing: &Listing,
    ) -> Result<DeleteReport, CatalogError> {
        let owner = owner.ok_or(CatalogError::Unauthenticated)?;
        if owner.uid != listing.owner_uid {
            return Err(CatalogError::PermissionDenied {
                message: format!("Listing {} belongs to another seller", listing.id),
            });
        }

        let result = self.documents.delete(&self.collection, &listing.id).await;
        record_catalog_op("delete", result.is_ok());
        if !result? {
            return Err(CatalogError::not_found(format!("listing {}", listing.id)));
        }

        let outcomes = join_all(
            listing
                .assets
                .iter()
                .map(|asset| self.coordinator.discard_persisted(asset)),
        )
        .await;

        let mut report = DeleteReport {
            listing_id: listing.id.clone(),
            deleted: Vec::new(),
            failed: Vec::new(),
        };
        for (asset, outcome) in listing.assets.iter().zip(outcomes) {
            match outcome {
                Ok(()) => report.deleted.push(asset.asset_id.clone()),
                Err(e) => {
                    let storage_key = asset.storage_key();
                    if !matches!(e, CatalogError::NotFound { .. }) {
                        metrics::counter!(ORPHAN_BLOBS_TOTAL).increment(1);
                        warn!(
                            listing_id = %listing.id,
                            key = %storage_key,
                            "Orphaned blob after listing delete: {e}"
                        );
                    }
                    report.failed.push(AssetFailure {
                        asset_id: asset.asset_id.clone(),
                        storage_key,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            listing_id = %listing.id,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Deleted listing"
        );
        Ok(report)
    }

    async fn run_query(
        &self,
        operation: &'static str,
        query: Query,
    ) -> Result<Vec<Listing>, CatalogError> {
        let result = self.documents.query(&self.collection, query).await;
        record_catalog_op(operation, result.is_ok());
        result?.into_iter().map(Listing::from_document).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::SelectedFile;
    use crate::storage::backend::BlobStore;
    use crate::testing::{seller, CountingDocumentStore, FaultyBlobStore};
    use bytes::Bytes;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct Fixture {
        documents: Arc<CountingDocumentStore>,
        blobs: Arc<FaultyBlobStore>,
        catalog: Catalog,
    }

    /// Catalog whose clock advances one second per listing.
    fn fixture() -> Fixture {
        let documents = Arc::new(CountingDocumentStore::new());
        let blobs = Arc::new(FaultyBlobStore::new());
        let coordinator = Arc::new(AssetCoordinator::new(blobs.clone()));
        let tick = Arc::new(AtomicI64::new(0));
        let clock: Clock = Arc::new(move || {
            let n = tick.fetch_add(1, Ordering::SeqCst);
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(n)
        });
        let catalog = Catalog::new(documents.clone(), coordinator).with_clock(clock);
        Fixture {
            documents,
            blobs,
            catalog,
        }
    }

    fn fields(title: &str) -> ListingFields {
        ListingFields {
            title: title.to_string(),
            model: "1.0 flex".to_string(),
            city: "Campinas".to_string(),
            year: 2020,
            odometer_km: 42_000,
            price: 65_000,
            phone_contact: "11999998888".to_string(),
            description: "Single owner".to_string(),
        }
    }

    async fn stage(f: &Fixture, owner: &Identity, data: &'static [u8]) -> Asset {
        f.catalog
            .coordinator()
            .stage_upload(
                Some(&owner.uid),
                SelectedFile::new("photo.jpg", "image/jpeg", Bytes::from_static(data)),
            )
            .await
            .unwrap()
    }

    async fn publish(f: &Fixture, owner: &Identity, title: &str) -> Listing {
        let asset = stage(f, owner, b"photo").await;
        let id = f
            .catalog
            .create_listing(Some(owner), fields(title), &[asset])
            .await
            .unwrap();
        f.catalog.get_listing(&id).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_stores_snapshot_with_upper_case_title() {
        let f = fixture();
        let ana = seller("u1", "Ana");
        let a = stage(&f, &ana, b"a").await;
        let b = stage(&f, &ana, b"b").await;
        let mut staged = vec![a.clone(), b.clone()];

        let id = f
            .catalog
            .create_listing(Some(&ana), fields("  Onix 1.0 "), &staged)
            .await
            .unwrap();
        staged.clear();

        let listing = f.catalog.get_listing(&id).await.unwrap();
        assert_eq!(listing.id, id);
        assert_eq!(listing.title, "ONIX 1.0");
        assert_eq!(listing.owner_uid, "u1");
        assert_eq!(listing.owner_name, "Ana");
        let ids: Vec<_> = listing.assets.iter().map(|x| x.asset_id.clone()).collect();
        assert_eq!(ids, [a.asset_id, b.asset_id]);
        assert!(listing.assets.iter().all(|x| x.local_preview.is_none()));
        assert_eq!(listing.created_at, "2024-05-01T12:00:00.000000Z");
    }

    #[tokio::test]
    async fn test_create_without_assets_makes_no_store_calls() {
        let f = fixture();
        let ana = seller("u1", "Ana");
        let err = f
            .catalog
            .create_listing(Some(&ana), fields("Onix"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::ValidationFailed { .. }));
        assert_eq!(f.documents.calls(), 0);
        assert_eq!(f.blobs.calls(), 0);
    }

    #[tokio::test]
    async fn test_create_requires_identity() {
        let f = fixture();
        let ana = seller("u1", "Ana");
        let asset = stage(&f, &ana, b"a").await;
        let err = f
            .catalog
            .create_listing(None, fields("Onix"), &[asset])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Unauthenticated));
        assert_eq!(f.documents.calls(), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_fields() {
        let f = fixture();
        let ana = seller("u1", "Ana");
        let asset = stage(&f, &ana, b"a").await;

        let mut bad_phone = fields("Onix");
        bad_phone.phone_contact = "12345".to_string();
        let mut bad_year = fields("Onix");
        bad_year.year = 1700;
        let mut blank_city = fields("Onix");
        blank_city.city = "   ".to_string();

        for bad in [bad_phone, bad_year, blank_city] {
            let err = f
                .catalog
                .create_listing(Some(&ana), bad, &[asset.clone()])
                .await
                .unwrap_err();
            assert!(matches!(err, CatalogError::ValidationFailed { .. }));
        }
        assert_eq!(f.documents.calls(), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_foreign_assets() {
        let f = fixture();
        let ana = seller("u1", "Ana");
        let bia = seller("u2", "Bia");
        let asset = stage(&f, &bia, b"a").await;
        let err = f
            .catalog
            .create_listing(Some(&ana), fields("Onix"), &[asset])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::ValidationFailed { .. }));
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_prefix() {
        let f = fixture();
        let ana = seller("u1", "Ana");
        let onix = publish(&f, &ana, "Onix 1.0").await;
        publish(&f, &ana, "Gol").await;

        let found = f.catalog.search_by_name("onix").await.unwrap();
        assert_eq!(found, vec![onix]);
        assert!(f.catalog.search_by_name("zzz").await.unwrap().is_empty());
        assert!(f.catalog.search_by_name("nix").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_search_lists_everything() {
        let f = fixture();
        let ana = seller("u1", "Ana");
        publish(&f, &ana, "Onix").await;
        publish(&f, &ana, "Gol").await;
        assert_eq!(f.catalog.search_by_name("  ").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_all_newest_first() {
        let f = fixture();
        let ana = seller("u1", "Ana");
        let t1 = publish(&f, &ana, "First").await;
        let t2 = publish(&f, &ana, "Second").await;
        let t3 = publish(&f, &ana, "Third").await;

        let ids: Vec<_> = f
            .catalog
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(ids, [t3.id, t2.id, t1.id]);
    }

    #[tokio::test]
    async fn test_list_owned_by_filters_owner() {
        let f = fixture();
        let ana = seller("u1", "Ana");
        let bia = seller("u2", "Bia");
        let mine = publish(&f, &ana, "Onix").await;
        publish(&f, &bia, "Gol").await;

        assert_eq!(f.catalog.list_owned_by("u1").await.unwrap(), vec![mine]);
        assert!(f.catalog.list_owned_by("u3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_listing_is_not_found() {
        let f = fixture();
        let err = f.catalog.get_listing("missing").await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_reports_partial_blob_failure() {
        let f = fixture();
        let ana = seller("u1", "Ana");
        let a = stage(&f, &ana, b"a").await;
        let b = stage(&f, &ana, b"b").await;
        let id = f
            .catalog
            .create_listing(Some(&ana), fields("Onix"), &[a.clone(), b.clone()])
            .await
            .unwrap();
        let listing = f.catalog.get_listing(&id).await.unwrap();
        f.blobs.fail_delete(&b.storage_key());

        let report = f.catalog.delete_listing(Some(&ana), &listing).await.unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.deleted, vec![a.asset_id.clone()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].asset_id, b.asset_id);
        assert_eq!(report.failed[0].storage_key, b.storage_key());

        assert!(matches!(
            f.catalog.get_listing(&id).await.unwrap_err(),
            CatalogError::NotFound { .. }
        ));
        assert!(f.catalog.list_owned_by("u1").await.unwrap().is_empty());
        assert!(!f.blobs.exists(&a.storage_key()).await.unwrap());
        assert!(f.blobs.exists(&b.storage_key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_publish_draft_clears_on_success() {
        let f = fixture();
        let ana = seller("u1", "Ana");
        let draft = Draft::new(Arc::clone(f.catalog.coordinator()));
        draft
            .stage(
                Some(&ana.uid),
                SelectedFile::new("a.jpg", "image/jpeg", Bytes::from_static(b"a")),
            )
            .await
            .unwrap();

        let id = f
            .catalog
            .publish_draft(Some(&ana), fields("Onix"), &draft)
            .await
            .unwrap();
        assert!(draft.is_empty());
        assert_eq!(f.catalog.get_listing(&id).await.unwrap().assets.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_draft_abandons_on_invalid_fields() {
        let f = fixture();
        let ana = seller("u1", "Ana");
        let draft = Draft::new(Arc::clone(f.catalog.coordinator()));
        let asset = draft
            .stage(
                Some(&ana.uid),
                SelectedFile::new("a.jpg", "image/jpeg", Bytes::from_static(b"a")),
            )
            .await
            .unwrap();

        let mut bad = fields("Onix");
        bad.phone_contact = "123".to_string();
        let err = f
            .catalog
            .publish_draft(Some(&ana), bad, &draft)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::ValidationFailed { .. }));
        assert!(draft.is_empty());
        assert!(!f.blobs.exists(&asset.storage_key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_publish_draft_keeps_blobs_when_insert_is_ambiguous() {
        let f = fixture();
        let ana = seller("u1", "Ana");
        let draft = Draft::new(Arc::clone(f.catalog.coordinator()));
        let asset = draft
            .stage(
                Some(&ana.uid),
                SelectedFile::new("a.jpg", "image/jpeg", Bytes::from_static(b"a")),
            )
            .await
            .unwrap();
        // The record is written but the caller sees a failure.
        f.documents.fail_inserts_after_write();

        let err = f
            .catalog
            .publish_draft(Some(&ana), fields("Onix"), &draft)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::StoreUnavailable(_)));
        assert_eq!(draft.snapshot(), vec![asset.clone()]);
        assert!(f.blobs.exists(&asset.storage_key()).await.unwrap());

        let saved = f.catalog.list_owned_by("u1").await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].assets[0].asset_id, asset.asset_id);
    }

    #[tokio::test]
    async fn test_delete_keeps_blobs_when_record_delete_fails() {
        let f = fixture();
        let ana = seller("u1", "Ana");
        let listing = publish(&f, &ana, "Onix").await;
        f.documents.fail_deletes();
        let blob_calls = f.blobs.calls();

        let err = f
            .catalog
            .delete_listing(Some(&ana), &listing)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::StoreUnavailable(_)));
        assert_eq!(f.blobs.calls(), blob_calls);
        assert!(f.blobs.exists(&listing.assets[0].storage_key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_absent_record_is_not_found() {
        let f = fixture();
        let ana = seller("u1", "Ana");
        let listing = publish(&f, &ana, "Onix").await;
        f.catalog.delete_listing(Some(&ana), &listing).await.unwrap();
        let blob_calls = f.blobs.calls();

        let err = f
            .catalog
            .delete_listing(Some(&ana), &listing)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
        assert_eq!(f.blobs.calls(), blob_calls);
    }

    #[tokio::test]
    async fn test_delete_checks_ownership() {
        let f = fixture();
        let ana = seller("u1", "Ana");
        let bia = seller("u2", "Bia");
        let listing = publish(&f, &ana, "Onix").await;

        let err = f.catalog.delete_listing(None, &listing).await.unwrap_err();
        assert!(matches!(err, CatalogError::Unauthenticated));
        let err = f
            .catalog
            .delete_listing(Some(&bia), &listing)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::PermissionDenied { .. }));
        assert!(f.catalog.get_listing(&listing.id).await.is_ok());
    }

    #[test]
    fn test_contact_link_encodes_message() {
        let listing = Listing {
            id: "l1".to_string(),
            owner_uid: "u1".to_string(),
            owner_name: "Ana".to_string(),
            title: "ONIX 1.0".to_string(),
            model: "flex".to_string(),
            city: "Campinas".to_string(),
            year: 2020,
            odometer_km: 0,
            price: 1,
            phone_contact: "11999998888".to_string(),
            description: "x".to_string(),
            created_at: "2024-05-01T12:00:00.000000Z".to_string(),
            assets: Vec::new(),
        };
        let link = listing.contact_link("carlot");
        assert!(link.starts_with("https://api.whatsapp.com/send?phone=11999998888&text=Hello"));
        assert!(link.contains("ONIX%201%2E0%20on%20carlot"));
        assert!(!link.contains(' '));
    }
}
