//! Identity — who is signed in, and the providers that decide it.
//!
//! The identity provider is the source of truth. This crate only ever holds a
//! read-only, possibly-absent reference to the current identity, owned by a
//! [`SessionContext`].

pub mod firebase;
pub mod local;
pub mod session;

pub use firebase::FirebaseIdentity;
pub use local::LocalIdentity;
pub use session::SessionContext;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// An authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Identity {
    /// First word of the display name, for greetings.
    pub fn first_name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .and_then(|name| name.split_whitespace().next())
    }
}

/// Observable identity state of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IdentityState {
    /// A sign-in call is in flight.
    Resolving,
    /// Nobody is signed in.
    Absent,
    Present { identity: Identity },
}

impl IdentityState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Present { identity } => Some(identity),
            _ => None,
        }
    }
}

/// Credential obtained by the client from a federated (OAuth) sign-in popup.
#[derive(Debug, Clone, Deserialize)]
pub struct FederatedCredential {
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    /// OAuth id token. Empty when the user closed the popup.
    #[serde(default)]
    pub id_token: String,
}

fn default_provider_id() -> String {
    "google.com".to_string()
}

/// An identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Identity, AuthError>;

    async fn sign_up_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Identity, AuthError>;

    async fn sign_in_with_federated(
        &self,
        credential: &FederatedCredential,
    ) -> Result<Identity, AuthError>;

    async fn sign_out(&self, identity: &Identity) -> Result<(), AuthError>;
}
