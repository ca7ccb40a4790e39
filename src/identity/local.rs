//! Local identity provider backed by the accounts table.
//!
//! Intended for self-hosted and test deployments. Passwords are stored as
//! Argon2id PHC strings and hashed on the blocking pool. Federated sign-in is
//! not available.

use std::sync::{Arc, LazyLock};

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};
use uuid::Uuid;

use super::{FederatedCredential, Identity, IdentityProvider};
use crate::error::{AuthError, DatabaseError};
use crate::store::{AccountStore, StoredAccount};

/// Minimum password length, matching Firebase's rule.
const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

pub struct LocalIdentity {
    accounts: Arc<dyn AccountStore>,
}

impl LocalIdentity {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Hash a password into an Argon2id PHC string with a fresh salt.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| internal_error("hash", e))
}

fn verify_password(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!(error = %e, "Stored password hash is malformed");
            false
        }
    }
}

fn internal_error(stage: &str, e: impl std::fmt::Display) -> AuthError {
    warn!(stage, error = %e, "Local identity failure");
    AuthError::Provider {
        code: "INTERNAL_ERROR".to_string(),
    }
}

/// Run the Argon2 work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, AuthError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| internal_error("join", e))
}

fn store_failure(e: DatabaseError) -> AuthError {
    internal_error("account store", e)
}

fn to_identity(account: StoredAccount) -> Identity {
    Identity {
        uid: account.uid,
        email: account.email,
        display_name: Some(account.display_name).filter(|n| !n.is_empty()),
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentity {
    fn name(&self) -> &str {
        "local"
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Identity, AuthError> {
        let email = normalize_email(email);
        let account = self
            .accounts
            .get_account_by_email(&email)
            .await
            .map_err(store_failure)?
            .ok_or(AuthError::InvalidCredentials)?;

        let candidate = password.expose_secret().to_string();
        let phc = account.password_hash.clone();
        if !blocking(move || verify_password(&candidate, &phc)).await? {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(to_identity(account))
    }

    async fn sign_up_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Identity, AuthError> {
        let email = normalize_email(email);
        if !EMAIL_RE.is_match(&email) {
            return Err(AuthError::InvalidEmail);
        }
        if password.expose_secret().chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword(format!(
                "Password should be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let secret = password.expose_secret().to_string();
        let password_hash = blocking(move || hash_password(&secret)).await??;
        let display_name = email.split('@').next().unwrap_or_default().to_string();
        let account = StoredAccount {
            uid: Uuid::new_v4().to_string(),
            password_hash,
            email,
            display_name,
            created_at: Utc::now(),
        };

        match self.accounts.insert_account(&account).await {
            Ok(()) => {
                info!(uid = %account.uid, "Local account created");
                Ok(to_identity(account))
            }
            Err(DatabaseError::Constraint(_)) => Err(AuthError::AccountExists),
            Err(e) => Err(store_failure(e)),
        }
    }

    async fn sign_in_with_federated(
        &self,
        credential: &FederatedCredential,
    ) -> Result<Identity, AuthError> {
        if credential.id_token.trim().is_empty() {
            return Err(AuthError::ProviderCancelled);
        }
        Err(AuthError::Provider {
            code: "FEDERATED_UNSUPPORTED".to_string(),
        })
    }

    async fn sign_out(&self, _identity: &Identity) -> Result<(), AuthError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    async fn provider() -> LocalIdentity {
        let db = LibSqlBackend::new_memory().await.unwrap();
        LocalIdentity::new(Arc::new(db))
    }

    fn pw(s: &str) -> SecretString {
        SecretString::from(s)
    }

    #[test]
    fn password_hashes_are_salted_phc_strings() {
        let first = hash_password("hunter22").unwrap();
        let second = hash_password("hunter22").unwrap();
        assert!(first.starts_with("$argon2id$"));
        assert_ne!(first, second);
        assert!(verify_password("hunter22", &first));
        assert!(verify_password("hunter22", &second));
        assert!(!verify_password("hunter23", &first));
    }

    #[test]
    fn malformed_stored_hash_never_verifies() {
        assert!(!verify_password("hunter22", "deadbeef"));
        assert!(!verify_password("", ""));
    }

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let local = provider().await;
        let created = local
            .sign_up_with_password(" Ada@Example.com ", &pw("hunter22"))
            .await
            .unwrap();
        assert_eq!(created.email, "ada@example.com");
        assert_eq!(created.display_name.as_deref(), Some("ada"));

        let signed_in = local
            .sign_in_with_password("ada@example.com", &pw("hunter22"))
            .await
            .unwrap();
        assert_eq!(signed_in.uid, created.uid);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_are_invalid_credentials() {
        let local = provider().await;
        local
            .sign_up_with_password("ada@example.com", &pw("hunter22"))
            .await
            .unwrap();

        let err = local
            .sign_in_with_password("ada@example.com", &pw("hunter23"))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);

        let err = local
            .sign_in_with_password("nobody@example.com", &pw("hunter22"))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn duplicate_sign_up_is_account_exists() {
        let local = provider().await;
        local
            .sign_up_with_password("ada@example.com", &pw("hunter22"))
            .await
            .unwrap();
        let err = local
            .sign_up_with_password("ADA@example.com", &pw("another1"))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::AccountExists);
    }

    #[tokio::test]
    async fn sign_up_validates_email_and_password() {
        let local = provider().await;
        assert_eq!(
            local
                .sign_up_with_password("not-an-email", &pw("hunter22"))
                .await
                .unwrap_err(),
            AuthError::InvalidEmail
        );
        assert!(matches!(
            local
                .sign_up_with_password("ada@example.com", &pw("abc"))
                .await
                .unwrap_err(),
            AuthError::WeakPassword(_)
        ));
    }

    #[tokio::test]
    async fn federated_is_unsupported() {
        let local = provider().await;
        let err = local
            .sign_in_with_federated(&FederatedCredential {
                provider_id: "google.com".into(),
                id_token: "tok".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Provider { ref code } if code == "FEDERATED_UNSUPPORTED"));
    }
}
