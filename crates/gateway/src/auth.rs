use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use models::TokenRecord;
use sqlx::sqlite::SqlitePool;

use crate::api::ApiError;

/// Extract the opaque credential from an `Authorization` header value:
/// case-insensitive `Bearer` scheme, exactly one space, non-empty token.
pub fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    if token.is_empty() || token.starts_with(' ') {
        return None;
    }
    Some(token)
}

/// Resolve the request's bearer against the token store. Every failure
/// mode collapses to AUTH_REQUIRED: a caller learns nothing about whether
/// a credential exists, is malformed, or has lapsed.
pub async fn authenticate(
    pool: &SqlitePool,
    headers: &HeaderMap,
    now_unix: i64,
) -> Result<TokenRecord, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::auth_required("missing authorization header"))?;
    let header = header
        .to_str()
        .map_err(|_| ApiError::auth_required("malformed authorization header"))?;
    let bearer = parse_bearer(header)
        .ok_or_else(|| ApiError::auth_required("malformed authorization header"))?;

    let record = gateway_sql::tokens::fetch_token(pool, bearer).await?;
    match record {
        Some(record) if !record.is_expired(now_unix) => Ok(record),
        Some(_) | None => Err(ApiError::auth_required(
            "bearer token is unknown or expired",
        )),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(parse_bearer("Bearer tok_abc"), Some("tok_abc"));
        assert_eq!(parse_bearer("bearer tok_abc"), Some("tok_abc"));
        assert_eq!(parse_bearer("BEARER tok_abc"), Some("tok_abc"));
    }

    #[test]
    fn malformed_headers_are_refused() {
        for header in [
            "Bearer",        // no separator
            "Bearer ",       // empty token
            "Bearer  tok",   // double space
            "Basic tok_abc", // wrong scheme
            "tok_abc",       // bare token
            "",
        ] {
            assert_eq!(parse_bearer(header), None, "{header:?}");
        }
    }
}
