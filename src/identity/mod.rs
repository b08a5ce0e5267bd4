//! Identity providers.
//!
//! [`provider::IdentityProvider`] is the seam the session is built on;
//! [`local::LocalIdentityProvider`] keeps accounts in a local SQLite file.

pub mod local;
pub mod provider;
