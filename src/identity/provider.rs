//! Identity provider contract.
//!
//! The provider owns credentials; the rest of the crate only sees
//! [`Identity`] values and a stream of changes.  Subscribers receive the
//! provider's current state as the first message, then one message per
//! sign-in, sign-up, rename or sign-out.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::CatalogError;

/// An authenticated seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider-assigned user id; also the blob namespace for the user's
    /// photos.
    pub uid: String,
    /// Name shown on the seller's listings.
    pub display_name: String,
    pub email: String,
}

/// One message on a provider's change stream: the new identity (or `None`
/// when signed out), or an error while resolving it.
pub type IdentityChange = Result<Option<Identity>, CatalogError>;

/// Receiving half of a provider's change stream.
pub type IdentityChanges = mpsc::UnboundedReceiver<IdentityChange>;

/// Async identity provider contract.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Authenticate an existing account.
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, CatalogError>> + Send + '_>>;

    /// Create an account and authenticate as it.
    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, CatalogError>> + Send + '_>>;

    /// Invalidate the current credential.
    fn sign_out(&self) -> Pin<Box<dyn Future<Output = Result<(), CatalogError>> + Send + '_>>;

    /// Change the display name of `identity`, returning the updated value.
    fn update_display_name(
        &self,
        identity: &Identity,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, CatalogError>> + Send + '_>>;

    /// Open a change stream.  The first message is the current state.
    fn subscribe(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<IdentityChanges, CatalogError>> + Send + '_>>;
}

/// Fan-out of identity changes to every open subscription.
///
/// Closed subscriptions are pruned on the next publish.
#[derive(Default)]
pub struct ChangeFeed {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<IdentityChange>>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and deliver `initial` to it first.
    pub fn register(&self, initial: IdentityChange) -> IdentityChanges {
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is still in hand, so this send cannot fail.
        let _ = tx.send(initial);
        self.subscribers
            .lock()
            .expect("mutex poisoned")
            .push(tx);
        rx
    }

    /// Deliver `identity` to every live subscriber.
    pub fn publish(&self, identity: Option<Identity>) {
        let mut subscribers = self.subscribers.lock().expect("mutex poisoned");
        subscribers.retain(|tx| tx.send(Ok(identity.clone())).is_ok());
    }

    /// Number of live subscribers as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("mutex poisoned").len()
    }
}
