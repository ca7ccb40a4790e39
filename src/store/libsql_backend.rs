//! libSQL backend — profile and account persistence.
//!
//! Supports local file and in-memory databases. The `users` table plays the
//! role of a per-uid document collection: writes are merge-upserts, so a
//! partial write never erases columns it does not mention.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::{DatabaseError, ProfileError};
use crate::store::migrations;
use crate::store::traits::{AccountStore, ProfilePatch, ProfileStore, StoredAccount, UserProfile};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn query_profile(&self, uid: &str) -> Result<Option<UserProfile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROFILE_COLUMNS} FROM users WHERE uid = ?1"),
                params![uid],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let profile = row_to_profile(&row)
                    .map_err(|e| DatabaseError::Query(format!("load_profile row parse: {e}")))?;
                Ok(Some(profile))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("load_profile: {e}"))),
        }
    }

    async fn upsert_profile(&self, uid: &str, patch: &ProfilePatch) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO users (uid, email, role, goal, zapier_webhook, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (uid) DO UPDATE SET
                    email = COALESCE(excluded.email, users.email),
                    role = COALESCE(excluded.role, users.role),
                    goal = COALESCE(excluded.goal, users.goal),
                    zapier_webhook = COALESCE(excluded.zapier_webhook, users.zapier_webhook),
                    updated_at = excluded.updated_at",
                params![
                    uid,
                    opt_text(patch.email.as_deref()),
                    opt_text(patch.role.as_deref()),
                    opt_text(patch.goal.as_deref()),
                    opt_text(patch.webhook_url.as_deref()),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_profile: {e}")))?;
        Ok(())
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

const PROFILE_COLUMNS: &str = "uid, email, role, goal, zapier_webhook, updated_at";

const ACCOUNT_COLUMNS: &str = "uid, email, display_name, password_hash, created_at";

fn row_to_profile(row: &libsql::Row) -> Result<UserProfile, libsql::Error> {
    let updated_str: String = row.get(5)?;
    Ok(UserProfile {
        uid: row.get(0)?,
        email: row.get(1).ok(),
        role: row.get(2).ok(),
        goal: row.get(3).ok(),
        webhook_url: row.get(4).ok(),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_account(row: &libsql::Row) -> Result<StoredAccount, libsql::Error> {
    let created_str: String = row.get(4)?;
    Ok(StoredAccount {
        uid: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: parse_datetime(&created_str),
    })
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl ProfileStore for LibSqlBackend {
    async fn load_profile(&self, uid: &str) -> Result<Option<UserProfile>, ProfileError> {
        self.query_profile(uid)
            .await
            .map_err(|source| ProfileError::Read {
                uid: uid.to_string(),
                source,
            })
    }

    async fn save_profile(&self, uid: &str, patch: &ProfilePatch) -> Result<(), ProfileError> {
        self.upsert_profile(uid, patch)
            .await
            .map_err(|source| ProfileError::Write {
                uid: uid.to_string(),
                source,
            })?;
        debug!(uid = %uid, "Profile saved");
        Ok(())
    }
}

#[async_trait]
impl AccountStore for LibSqlBackend {
    async fn insert_account(&self, account: &StoredAccount) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO accounts ({ACCOUNT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
                params![
                    account.uid.as_str(),
                    account.email.as_str(),
                    account.display_name.as_str(),
                    account.password_hash.as_str(),
                    account.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("UNIQUE constraint failed") {
                    DatabaseError::Constraint(format!("insert_account: {msg}"))
                } else {
                    DatabaseError::Query(format!("insert_account: {msg}"))
                }
            })?;
        debug!(uid = %account.uid, "Account inserted");
        Ok(())
    }

    async fn get_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<StoredAccount>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?1"),
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_account_by_email: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_account(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("get_account_by_email row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_account_by_email: {e}"))),
        }
    }
}
