//! All SQL spoken by the gateway, in one place: the token store and the
//! operation-instance store. Both tables live in a single SQLite database;
//! every cross-request coordination point is a conditional UPDATE on a row,
//! so concurrent requests serialize through the database and nothing
//! in-memory has to survive a restart.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

pub mod instances;
pub mod tokens;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tokens (
    token         TEXT PRIMARY KEY NOT NULL,
    class         TEXT NOT NULL,
    principal     TEXT NOT NULL,
    scopes        TEXT NOT NULL,            -- JSON array of scope strings
    expires_at    INTEGER NOT NULL,         -- unix seconds
    created_at    INTEGER NOT NULL,
    analytics_ref TEXT
);

CREATE TABLE IF NOT EXISTS operation_instances (
    request_id      TEXT PRIMARY KEY NOT NULL,
    session_id      TEXT,
    op              TEXT NOT NULL,
    args            TEXT NOT NULL,          -- frozen JSON copy of validated args
    principal       TEXT NOT NULL,
    state           TEXT NOT NULL,
    result_location TEXT,
    result_data     TEXT,
    result_mime     TEXT,
    error           TEXT,                   -- JSON {code, message, cause?}
    created_at      INTEGER NOT NULL,       -- unix seconds
    updated_at      INTEGER NOT NULL,
    expires_at      INTEGER NOT NULL,
    last_polled_at  INTEGER                 -- unix milliseconds
);

CREATE INDEX IF NOT EXISTS idx_operation_instances_expires_at
    ON operation_instances (expires_at);
"#;

/// Open (creating if needed) the gateway database at `path` and apply the
/// schema. `path` may also be `:memory:` for tests; in-memory databases are
/// capped at one connection since each SQLite connection would otherwise
/// get its own private memory.
pub async fn open(path: &str, max_connections: u32) -> sqlx::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(path)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let max_connections = if path.contains(":memory:") {
        1
    } else {
        max_connections
    };

    // An idle in-memory connection must never be reaped: the connection
    // *is* the database.
    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

/// A single-connection in-memory database, fully migrated.
pub async fn open_in_memory() -> sqlx::Result<SqlitePool> {
    open("sqlite::memory:", 1).await
}

async fn migrate(pool: &SqlitePool) -> sqlx::Result<()> {
    for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!("applied gateway schema");
    Ok(())
}

/// Decode a JSON-valued TEXT column, surfacing failures as decode errors
/// rather than panics.
fn decode_json<T: serde::de::DeserializeOwned>(
    column: &'static str,
    raw: &str,
) -> sqlx::Result<T> {
    serde_json::from_str(raw).map_err(|err| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(err),
    })
}
