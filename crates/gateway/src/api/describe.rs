use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;

use crate::api::App;

/// `GET /.well-known/ops`: serve the registry's self-description. The body
/// bytes and ETag were computed once at boot; conditional fetches
/// short-circuit to 304.
pub async fn handle_describe(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
) -> axum::response::Response {
    let etag = app.registry.etag();

    let matched = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|validator| validator.to_str().ok())
        .map(|validators| {
            validators
                .split(',')
                .map(str::trim)
                .any(|candidate| candidate == etag || candidate == "*")
        })
        .unwrap_or(false);

    let mut response = if matched {
        StatusCode::NOT_MODIFIED.into_response()
    } else {
        let mut response = (StatusCode::OK, app.description.clone()).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            "application/json; charset=utf-8".parse().unwrap(),
        );
        response
    };

    let headers = response.headers_mut();
    headers.insert(header::ETAG, etag.parse().expect("etag is a valid header"));
    headers.insert(
        header::CACHE_CONTROL,
        "public, max-age=3600".parse().unwrap(),
    );
    response
}
