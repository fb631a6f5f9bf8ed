use models::{ErrorBody, OpState, OperationInstance};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use uuid::Uuid;

/// Insert a fresh instance row. Returns false when the `request_id` is
/// already taken, without touching the existing row.
pub async fn insert(pool: &SqlitePool, instance: &OperationInstance) -> sqlx::Result<bool> {
    let done = sqlx::query(
        r#"INSERT OR IGNORE INTO operation_instances
            (request_id, session_id, op, args, principal, state,
             result_location, result_data, result_mime, error,
             created_at, updated_at, expires_at, last_polled_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"#,
    )
    .bind(instance.request_id.to_string())
    .bind(instance.session_id.map(|id| id.to_string()))
    .bind(&instance.op)
    .bind(serde_json::to_string(&instance.args).expect("args serialize"))
    .bind(&instance.principal)
    .bind(instance.state.as_str())
    .bind(&instance.result_location)
    .bind(&instance.result_data)
    .bind(&instance.result_mime)
    .bind(
        instance
            .error
            .as_ref()
            .map(|e| serde_json::to_string(e).expect("error serialize")),
    )
    .bind(instance.created_at)
    .bind(instance.updated_at)
    .bind(instance.expires_at)
    .bind(instance.last_polled_at)
    .execute(pool)
    .await?;

    Ok(done.rows_affected() == 1)
}

pub async fn fetch(
    pool: &SqlitePool,
    request_id: Uuid,
) -> sqlx::Result<Option<OperationInstance>> {
    let row = sqlx::query(
        r#"SELECT request_id, session_id, op, args, principal, state,
            result_location, result_data, result_mime, error,
            created_at, updated_at, expires_at, last_polled_at
        FROM operation_instances
        WHERE request_id = ?1"#,
    )
    .bind(request_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        let request_id: String = row.try_get("request_id")?;
        let session_id: Option<String> = row.try_get("session_id")?;
        let state: String = row.try_get("state")?;
        let args: String = row.try_get("args")?;
        let error: Option<String> = row.try_get("error")?;

        Ok(OperationInstance {
            request_id: parse_uuid("request_id", &request_id)?,
            session_id: session_id
                .as_deref()
                .map(|id| parse_uuid("session_id", id))
                .transpose()?,
            op: row.try_get("op")?,
            args: crate::decode_json("args", &args)?,
            principal: row.try_get("principal")?,
            state: state.parse::<OpState>().map_err(|err| {
                sqlx::Error::ColumnDecode {
                    index: "state".to_string(),
                    source: err.into(),
                }
            })?,
            result_location: row.try_get("result_location")?,
            result_data: row.try_get("result_data")?,
            result_mime: row.try_get("result_mime")?,
            error: error
                .as_deref()
                .map(|e| crate::decode_json::<ErrorBody>("error", e))
                .transpose()?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            expires_at: row.try_get("expires_at")?,
            last_polled_at: row.try_get("last_polled_at")?,
        })
    })
    .transpose()
}

/// Transition `accepted → pending`. Returns false without side effects when
/// the instance is absent or no longer in `accepted`.
pub async fn try_start(pool: &SqlitePool, request_id: Uuid, updated_at: i64) -> sqlx::Result<bool> {
    let done = sqlx::query(
        r#"UPDATE operation_instances
        SET state = 'pending', updated_at = ?2
        WHERE request_id = ?1 AND state = 'accepted'"#,
    )
    .bind(request_id.to_string())
    .bind(updated_at)
    .execute(pool)
    .await?;
    Ok(done.rows_affected() == 1)
}

/// Transition `pending → complete`, persisting the result in the same
/// atomic write. Returns false when the instance is not in `pending`.
pub async fn try_complete(
    pool: &SqlitePool,
    request_id: Uuid,
    result_location: &str,
    result_data: &str,
    result_mime: &str,
    updated_at: i64,
) -> sqlx::Result<bool> {
    let done = sqlx::query(
        r#"UPDATE operation_instances
        SET state = 'complete', result_location = ?2, result_data = ?3,
            result_mime = ?4, updated_at = ?5
        WHERE request_id = ?1 AND state = 'pending'"#,
    )
    .bind(request_id.to_string())
    .bind(result_location)
    .bind(result_data)
    .bind(result_mime)
    .bind(updated_at)
    .execute(pool)
    .await?;
    Ok(done.rows_affected() == 1)
}

/// Transition `accepted|pending → error`. Returns false when the instance
/// is absent or already terminal.
pub async fn try_fail(
    pool: &SqlitePool,
    request_id: Uuid,
    error: &ErrorBody,
    updated_at: i64,
) -> sqlx::Result<bool> {
    let done = sqlx::query(
        r#"UPDATE operation_instances
        SET state = 'error', error = ?2, updated_at = ?3
        WHERE request_id = ?1 AND state IN ('accepted', 'pending')"#,
    )
    .bind(request_id.to_string())
    .bind(serde_json::to_string(error).expect("error serialize"))
    .bind(updated_at)
    .execute(pool)
    .await?;
    Ok(done.rows_affected() == 1)
}

#[derive(Debug, PartialEq)]
pub enum PollGate {
    /// The poll was recorded; serve it.
    Allowed,
    /// Rejected, and `last_polled_at` untouched.
    Limited { elapsed_ms: i64 },
    /// No such instance row.
    Missing,
}

/// The per-instance poll rate limit: record this poll iff at least
/// `window_ms` elapsed since the last accepted one. Check and record are a
/// single conditional UPDATE, so concurrent polls of one instance admit
/// exactly one winner per window.
pub async fn poll_gate(
    pool: &SqlitePool,
    request_id: Uuid,
    now_ms: i64,
    window_ms: i64,
) -> sqlx::Result<PollGate> {
    let done = sqlx::query(
        r#"UPDATE operation_instances
        SET last_polled_at = ?2
        WHERE request_id = ?1
            AND (last_polled_at IS NULL OR ?2 - last_polled_at >= ?3)"#,
    )
    .bind(request_id.to_string())
    .bind(now_ms)
    .bind(window_ms)
    .execute(pool)
    .await?;

    if done.rows_affected() == 1 {
        return Ok(PollGate::Allowed);
    }

    let last: Option<Option<i64>> =
        sqlx::query_scalar("SELECT last_polled_at FROM operation_instances WHERE request_id = ?1")
            .bind(request_id.to_string())
            .fetch_optional(pool)
            .await?;

    Ok(match last {
        None => PollGate::Missing,
        Some(last) => PollGate::Limited {
            elapsed_ms: now_ms - last.unwrap_or(now_ms),
        },
    })
}

/// Drop instances past their expiry. Expired rows are already invisible to
/// poll and chunk reads; this reclaims the storage.
pub async fn delete_expired(pool: &SqlitePool, now_unix: i64) -> sqlx::Result<u64> {
    let done = sqlx::query("DELETE FROM operation_instances WHERE expires_at <= ?1")
        .bind(now_unix)
        .execute(pool)
        .await?;
    Ok(done.rows_affected())
}

fn parse_uuid(column: &'static str, raw: &str) -> sqlx::Result<Uuid> {
    raw.parse::<Uuid>().map_err(|err| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(err),
    })
}
