//! Store traits and the records they persist.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, ProfileError};

/// Per-user profile record, keyed by identity uid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A partial profile write. `None` fields are left untouched by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub email: Option<String>,
    pub role: Option<String>,
    pub goal: Option<String>,
    pub webhook_url: Option<String>,
}

impl ProfilePatch {
    /// Patch carrying only the user-editable fields.
    pub fn editable(role: &str, goal: &str, webhook_url: &str) -> Self {
        Self {
            email: None,
            role: Some(role.to_string()),
            goal: Some(goal.to_string()),
            webhook_url: Some(webhook_url.to_string()),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Profile persistence with merge-upsert writes.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Load the profile for `uid`, or `None` if it has never been written.
    async fn load_profile(&self, uid: &str) -> Result<Option<UserProfile>, ProfileError>;

    /// Create the profile if absent, otherwise update only the fields present
    /// in `patch`. Always stamps `updated_at`.
    async fn save_profile(&self, uid: &str, patch: &ProfilePatch) -> Result<(), ProfileError>;
}

/// A locally managed sign-in account.
#[derive(Debug, Clone)]
pub struct StoredAccount {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Account persistence for the local identity provider.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account. Fails with `DatabaseError::Constraint` when the
    /// e-mail is already registered.
    async fn insert_account(&self, account: &StoredAccount) -> Result<(), DatabaseError>;

    /// Look up an account by (normalized) e-mail.
    async fn get_account_by_email(&self, email: &str)
    -> Result<Option<StoredAccount>, DatabaseError>;
}
