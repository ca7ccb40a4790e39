//! Schema for profiles and local accounts.
//!
//! Applied steps are recorded in `_migrations`; startup replays whatever is
//! newer than the recorded version.

use libsql::Connection;

use crate::error::DatabaseError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Append only; versions are applied in slice order.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "user_profiles",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                uid TEXT PRIMARY KEY,
                email TEXT,
                role TEXT,
                goal TEXT,
                zapier_webhook TEXT,
                updated_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        name: "local_accounts",
        sql: r#"
            CREATE TABLE IF NOT EXISTS accounts (
                uid TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                -- PHC string; carries its own salt and parameters
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_accounts_email ON accounts(email);
        "#,
    },
];

const LEDGER_DDL: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
)";

fn migration_error(what: &str, e: libsql::Error) -> DatabaseError {
    DatabaseError::Migration(format!("{what}: {e}"))
}

/// Bring the profile and account tables up to the latest schema.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(LEDGER_DDL, ())
        .await
        .map_err(|e| migration_error("creating migration ledger", e))?;

    let applied = schema_version(conn).await?;
    let pending = MIGRATIONS.iter().filter(|m| m.version > applied);

    let mut latest = applied;
    for step in pending {
        tracing::info!(version = step.version, step = step.name, "Upgrading schema");
        conn.execute_batch(step.sql).await.map_err(|e| {
            migration_error(&format!("schema V{} ({})", step.version, step.name), e)
        })?;
        record_applied(conn, step).await?;
        latest = step.version;
    }

    if latest == applied {
        tracing::debug!(version = applied, "Schema up to date");
    } else {
        tracing::info!(from = applied, to = latest, "Schema upgraded");
    }
    Ok(())
}

/// Highest recorded version; 0 for a fresh database.
async fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| migration_error("reading schema version", e))?;

    match rows
        .next()
        .await
        .map_err(|e| migration_error("reading schema version", e))?
    {
        Some(row) => row
            .get::<i64>(0)
            .map_err(|e| migration_error("decoding schema version", e)),
        None => Ok(0),
    }
}

async fn record_applied(conn: &Connection, step: &Migration) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![step.version, step.name],
    )
    .await
    .map_err(|e| migration_error(&format!("recording schema V{}", step.version), e))?;
    Ok(())
}
