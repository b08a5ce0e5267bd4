//! Process-wide session state.
//!
//! A [`Session`] subscribes to its identity provider exactly once, on
//! [`Session::start`], and republishes every change through a
//! `tokio::sync::watch` channel.  Consumers hold read-only receivers; the
//! only writers are the provider listener and the session's own sign-in,
//! sign-up and sign-out paths.
//!
//! A local write wins over provider messages queued before it: until the
//! provider reports the same signed-in uid (or the same signed-out state),
//! its messages are dropped.  A sign-out whose invalidation failed therefore
//! stays signed out until the next local sign-in.

use std::sync::{Arc, Mutex};

use garde::Validate;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::CatalogError;
use crate::identity::provider::{Identity, IdentityChanges, IdentityProvider};

/// What consumers observe about the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    /// `true` until the provider reports its initial state.
    pub loading: bool,
}

impl SessionSnapshot {
    fn loading() -> Self {
        Self {
            identity: None,
            loading: true,
        }
    }

    /// Whether an identity is present.
    pub fn signed_in(&self) -> bool {
        self.identity.is_some()
    }
}

/// Result of [`Session::sign_out`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignOutOutcome {
    /// Local state cleared and the provider invalidated the credential.
    Complete,
    /// Local state cleared but the provider could not invalidate the
    /// credential; it may still be accepted server-side.
    LocalOnly { reason: String },
}

/// Sign-up form, checked before the provider is contacted.
#[derive(Debug, Validate)]
pub struct SignUpInput {
    #[garde(length(min = 1))]
    pub display_name: String,
    #[garde(pattern(r"^[^@\s]+@[^@\s]+\.[^@\s]+$"))]
    pub email: String,
    #[garde(length(min = 6))]
    pub password: String,
}

pub struct Session {
    provider: Arc<dyn IdentityProvider>,
    state: Arc<watch::Sender<SessionSnapshot>>,
    pending: Arc<Mutex<Option<LocalWrite>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// The identity written locally that the provider has not yet confirmed.
#[derive(Debug)]
struct LocalWrite {
    identity: Option<Identity>,
}

impl LocalWrite {
    fn confirmed_by(&self, reported: &Option<Identity>) -> bool {
        match (&self.identity, reported) {
            (Some(ours), Some(theirs)) => ours.uid == theirs.uid,
            (None, None) => true,
            _ => false,
        }
    }
}

impl Session {
    /// Subscribe to `provider` and start tracking its identity.
    ///
    /// Must be called from within a tokio runtime.  The session is in the
    /// loading state until the provider's first message arrives.
    pub fn start(provider: Arc<dyn IdentityProvider>) -> Arc<Self> {
        let (tx, _rx) = watch::channel(SessionSnapshot::loading());
        let state = Arc::new(tx);
        let pending = Arc::new(Mutex::new(None));

        let listener = tokio::spawn(listen(
            Arc::clone(&provider),
            Arc::clone(&state),
            Arc::clone(&pending),
        ));

        Arc::new(Self {
            provider,
            state,
            pending,
            listener: Mutex::new(Some(listener)),
        })
    }

    /// The signed-in identity, if any.
    pub fn current_identity(&self) -> Option<Identity> {
        self.state.borrow().identity.clone()
    }

    /// Whether the provider has yet to report its initial state.
    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// A read-only view that observes every subsequent change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Wait until the provider has reported its initial state.
    pub async fn ready(&self) -> SessionSnapshot {
        let mut rx = self.state.subscribe();
        let snapshot = match rx.wait_for(|s| !s.loading).await {
            Ok(snapshot) => snapshot.clone(),
            // Sender lives as long as `self`.
            Err(_) => self.snapshot(),
        };
        snapshot
    }

    /// Publish a locally decided identity and hold it until the provider
    /// reports the same state.
    fn write_local(&self, identity: Option<Identity>) {
        let mut pending = self.pending.lock().expect("mutex poisoned");
        publish(&self.state, identity.clone());
        *pending = Some(LocalWrite { identity });
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, CatalogError> {
        let identity = self.provider.sign_in(email, password).await?;
        self.write_local(Some(identity.clone()));
        Ok(identity)
    }

    /// Create an account, set its display name, and sign in as it.
    ///
    /// The provider announces the new account before the rename lands, so
    /// the renamed identity is published once more afterwards.
    pub async fn sign_up(&self, input: SignUpInput) -> Result<Identity, CatalogError> {
        input.validate()?;
        let created = self.provider.sign_up(&input.email, &input.password).await?;
        let identity = self
            .provider
            .update_display_name(&created, &input.display_name)
            .await?;
        self.write_local(Some(identity.clone()));
        info!(uid = %identity.uid, "Signed up as {}", identity.display_name);
        Ok(identity)
    }

    /// Clear the local identity, then ask the provider to invalidate the
    /// credential.
    ///
    /// The local state is cleared even when invalidation fails; that case is
    /// reported as [`SignOutOutcome::LocalOnly`].
    pub async fn sign_out(&self) -> SignOutOutcome {
        self.write_local(None);
        match self.provider.sign_out().await {
            Ok(()) => {
                info!("Signed out");
                SignOutOutcome::Complete
            }
            Err(e) => {
                warn!(
                    "Signed out locally but the credential could not be invalidated: {e}"
                );
                SignOutOutcome::LocalOnly {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Release the provider subscription.  Later provider changes are no
    /// longer observed; the last snapshot stays readable.
    pub fn shutdown(&self) {
        if let Some(handle) = self.listener.lock().expect("mutex poisoned").take() {
            handle.abort();
            debug!("Session listener stopped");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn publish(state: &watch::Sender<SessionSnapshot>, identity: Option<Identity>) {
    state.send_replace(SessionSnapshot {
        identity,
        loading: false,
    });
}

/// Apply a provider report unless an unconfirmed local write overrides it.
fn apply_reported(
    state: &watch::Sender<SessionSnapshot>,
    pending: &Mutex<Option<LocalWrite>>,
    reported: Option<Identity>,
) {
    let mut pending = pending.lock().expect("mutex poisoned");
    match pending.as_ref() {
        Some(local) if !local.confirmed_by(&reported) => {
            debug!(
                signed_in = reported.is_some(),
                "Dropping identity change that predates a local write"
            );
        }
        _ => {
            *pending = None;
            debug!(signed_in = reported.is_some(), "Identity changed");
            publish(state, reported);
        }
    }
}

/// Provider listener: the single subscription for the session's lifetime.
async fn listen(
    provider: Arc<dyn IdentityProvider>,
    state: Arc<watch::Sender<SessionSnapshot>>,
    pending: Arc<Mutex<Option<LocalWrite>>>,
) {
    let mut changes: IdentityChanges = match provider.subscribe().await {
        Ok(changes) => changes,
        Err(e) => {
            warn!("Identity provider unavailable, continuing anonymously: {e}");
            apply_reported(&state, &pending, None);
            return;
        }
    };

    let mut initial = true;
    while let Some(change) = changes.recv().await {
        match change {
            Ok(identity) => apply_reported(&state, &pending, identity),
            Err(e) if initial => {
                warn!("Could not resolve the initial identity, continuing anonymously: {e}");
                apply_reported(&state, &pending, None);
            }
            Err(e) => warn!("Identity provider reported an error: {e}"),
        }
        initial = false;
    }
    debug!("Identity provider closed its change stream");
}
