use models::{TokenClass, TokenRecord};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

/// Resolve an opaque bearer string to its stored record. Expiry is the
/// caller's judgement; an expired row is still returned.
pub async fn fetch_token(pool: &SqlitePool, token: &str) -> sqlx::Result<Option<TokenRecord>> {
    let row = sqlx::query(
        r#"SELECT token, class, principal, scopes, expires_at, created_at, analytics_ref
        FROM tokens
        WHERE token = ?1"#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        let class: String = row.try_get("class")?;
        let class = class
            .parse::<TokenClass>()
            .map_err(|err| sqlx::Error::ColumnDecode {
                index: "class".to_string(),
                source: err.into(),
            })?;
        let scopes: String = row.try_get("scopes")?;
        Ok(TokenRecord {
            token: row.try_get("token")?,
            class,
            principal: row.try_get("principal")?,
            scopes: crate::decode_json("scopes", &scopes)?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
            analytics_ref: row.try_get("analytics_ref")?,
        })
    })
    .transpose()
}

/// Insert or replace a token row. The gateway itself never calls this on
/// the request path; token issuance belongs to the external auth layer.
pub async fn upsert_token(pool: &SqlitePool, record: &TokenRecord) -> sqlx::Result<()> {
    sqlx::query(
        r#"INSERT OR REPLACE INTO tokens
            (token, class, principal, scopes, expires_at, created_at, analytics_ref)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
    )
    .bind(&record.token)
    .bind(record.class.as_str())
    .bind(&record.principal)
    .bind(serde_json::to_string(&record.scopes).expect("scopes serialize"))
    .bind(record.expires_at)
    .bind(record.created_at)
    .bind(&record.analytics_ref)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn record() -> TokenRecord {
        TokenRecord {
            token: "agt_4fe2a1".to_string(),
            class: TokenClass::AgentIssued,
            principal: "agent:indexer".to_string(),
            scopes: vec!["items:browse".to_string(), "reports:run".to_string()],
            expires_at: 1_900_000_000,
            created_at: 1_800_000_000,
            analytics_ref: Some("an-772".to_string()),
        }
    }

    #[tokio::test]
    async fn round_trips_a_token_row() {
        let pool = crate::open_in_memory().await.unwrap();
        upsert_token(&pool, &record()).await.unwrap();

        let fetched = fetch_token(&pool, "agt_4fe2a1").await.unwrap().unwrap();
        assert_eq!(fetched, record());
    }

    #[tokio::test]
    async fn unknown_tokens_read_as_none() {
        let pool = crate::open_in_memory().await.unwrap();
        assert!(fetch_token(&pool, "agt_nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn replacing_a_token_keeps_one_row() {
        let pool = crate::open_in_memory().await.unwrap();
        upsert_token(&pool, &record()).await.unwrap();

        let mut renewed = record();
        renewed.expires_at += 3_600;
        upsert_token(&pool, &renewed).await.unwrap();

        let fetched = fetch_token(&pool, "agt_4fe2a1").await.unwrap().unwrap();
        assert_eq!(fetched.expires_at, renewed.expires_at);
    }
}
