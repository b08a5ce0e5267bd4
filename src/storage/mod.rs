//! Photo blob storage.
//!
//! The [`backend::BlobStore`] trait abstracts over where photo bytes
//! physically live.  Implementations include local disk and an in-memory
//! map.

pub mod backend;
pub mod local;
pub mod memory;
