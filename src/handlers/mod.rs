//! HTTP handlers for the public, read-only catalog surface.

pub mod images;
pub mod listings;
