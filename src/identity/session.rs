//! Session context — the per-session holder of the current identity.
//!
//! Replaces a process-wide "current user" global. One context exists per
//! signed-in browser session; everything that needs to know who is signed in
//! reads it from here or subscribes to changes. Only the context writes the
//! state.

use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::watch;
use tracing::{info, warn};

use super::{FederatedCredential, Identity, IdentityProvider, IdentityState};
use crate::error::AuthError;

pub struct SessionContext {
    provider: Arc<dyn IdentityProvider>,
    state_tx: watch::Sender<IdentityState>,
}

impl SessionContext {
    /// Start a session whose identity has not been resolved yet.
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (state_tx, _) = watch::channel(IdentityState::Resolving);
        Self { provider, state_tx }
    }

    /// Start a session for an identity that is already known.
    pub fn with_identity(provider: Arc<dyn IdentityProvider>, identity: Identity) -> Self {
        let (state_tx, _) = watch::channel(IdentityState::Present { identity });
        Self { provider, state_tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<IdentityState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> IdentityState {
        self.state_tx.borrow().clone()
    }

    pub fn current(&self) -> Option<Identity> {
        self.state_tx.borrow().identity().cloned()
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Identity, AuthError> {
        let previous = self.state_tx.send_replace(IdentityState::Resolving);
        let result = self.provider.sign_in_with_password(email, password).await;
        self.settle(previous, result, "password sign-in")
    }

    pub async fn sign_up_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Identity, AuthError> {
        let previous = self.state_tx.send_replace(IdentityState::Resolving);
        let result = self.provider.sign_up_with_password(email, password).await;
        self.settle(previous, result, "sign-up")
    }

    pub async fn sign_in_with_federated(
        &self,
        credential: &FederatedCredential,
    ) -> Result<Identity, AuthError> {
        let previous = self.state_tx.send_replace(IdentityState::Resolving);
        let result = self.provider.sign_in_with_federated(credential).await;
        self.settle(previous, result, "federated sign-in")
    }

    /// Sign out. On failure the current identity is left untouched.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let Some(identity) = self.current() else {
            self.state_tx.send_replace(IdentityState::Absent);
            return Ok(());
        };

        match self.provider.sign_out(&identity).await {
            Ok(()) => {
                info!(uid = %identity.uid, provider = self.provider.name(), "Signed out");
                self.state_tx.send_replace(IdentityState::Absent);
                Ok(())
            }
            Err(e) => {
                warn!(uid = %identity.uid, error = %e, "Sign-out failed");
                Err(e)
            }
        }
    }

    fn settle(
        &self,
        previous: IdentityState,
        result: Result<Identity, AuthError>,
        action: &str,
    ) -> Result<Identity, AuthError> {
        match result {
            Ok(identity) => {
                info!(uid = %identity.uid, provider = self.provider.name(), action, "Signed in");
                self.state_tx.send_replace(IdentityState::Present {
                    identity: identity.clone(),
                });
                Ok(identity)
            }
            Err(e) => {
                warn!(provider = self.provider.name(), action, error = %e, "Authentication failed");
                let restored = match previous {
                    IdentityState::Resolving => IdentityState::Absent,
                    other => other,
                };
                self.state_tx.send_replace(restored);
                Err(e)
            }
        }
    }
}
