//! Abstract blob store trait.
//!
//! Every photo backend must implement [`BlobStore`].  Keys live in a
//! hierarchical namespace (`images/{owner_uid}/{asset_id}`) and the store
//! hands back a URL from which the blob can be fetched publicly.

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters escaped inside a single URL path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Async blob storage contract.
pub trait BlobStore: Send + Sync + 'static {
    /// Write `data` to `key`, returning the public URL of the blob.
    ///
    /// Writing the same key twice replaces the blob, which makes uploads
    /// idempotent per key.
    fn put(
        &self,
        key: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>>;

    /// Read the blob at `key`, or `None` if it does not exist.
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<Bytes>>> + Send + '_>>;

    /// Delete the blob at `key`. Returns `false` if there was nothing to
    /// delete.
    fn delete(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>>;

    /// Check whether a blob exists at `key`.
    fn exists(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>>;

    /// The public URL a blob at `key` is (or would be) served from.
    fn url_for(&self, key: &str) -> String;
}

/// Join `base` and a `/`-separated key, percent-encoding each segment.
pub fn public_url(base: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect();
    format!("{}/{}", base.trim_end_matches('/'), encoded.join("/"))
}

/// Reject keys that could escape the namespace they are stored under.
pub fn validate_key(key: &str) -> anyhow::Result<()> {
    if key.is_empty() {
        anyhow::bail!("Empty blob key");
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            anyhow::bail!("Invalid segment in blob key: {key}");
        }
    }
    Ok(())
}
