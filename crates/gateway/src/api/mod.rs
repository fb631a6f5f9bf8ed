//! The gateway's HTTP surface: one write endpoint, the self-description,
//! and the two read endpoints of the async lifecycle.

use std::sync::Arc;

use anyhow::Context;
use axum::routing::{get, post};
use models::{ErrorCode, OperationInstance};
use registry::Registry;
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

mod call;
mod chunks;
mod describe;
mod error;
mod poll;

pub use error::ApiError;

use crate::handler::Handler;
use crate::lifecycle::Lifecycle;

/// Process-wide singletons, initialized once at startup and handed to
/// every request as shared read state.
pub struct App {
    pub pool: SqlitePool,
    pub registry: Arc<Registry<Handler>>,
    pub lifecycle: Lifecycle,
    /// The registry's serialized self-description, shared without copying.
    pub description: bytes::Bytes,
}

impl App {
    pub fn new(pool: SqlitePool, registry: Registry<Handler>) -> Arc<App> {
        let description = bytes::Bytes::copy_from_slice(registry.description_bytes());
        Arc::new(App {
            lifecycle: Lifecycle::new(pool.clone()),
            pool,
            registry: Arc::new(registry),
            description,
        })
    }
}

/// Build the gateway's router.
pub fn build_router(app: Arc<App>, allow_origin: &[String]) -> anyhow::Result<axum::Router<()>> {
    let allow_origin = allow_origin
        .iter()
        .map(|origin| origin.parse())
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse allowed origins")?;

    let allow_headers = [
        "Cache-Control",
        "Content-Language",
        "Content-Length",
        "Content-Type",
        "Expires",
        "If-None-Match",
        "Authorization",
    ]
    .into_iter()
    .map(|h| h.parse().unwrap())
    .collect::<Vec<_>>();

    let cors = tower_http::cors::CorsLayer::new()
        .allow_methods(tower_http::cors::AllowMethods::mirror_request())
        .allow_origin(tower_http::cors::AllowOrigin::list(allow_origin))
        .allow_headers(allow_headers);

    let router = axum::Router::new()
        .route(
            "/call",
            post(call::handle_call).fallback(call::method_not_allowed),
        )
        .route("/.well-known/ops", get(describe::handle_describe))
        .route("/ops/:request_id", get(poll::handle_poll))
        .route("/ops/:request_id/chunks", get(chunks::handle_chunks))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app);

    Ok(router)
}

/// Fetch an instance for the read endpoints. Absent and expired rows are
/// indistinguishable, and a stored state no longer in the grammar reads as
/// UNKNOWN_STATE rather than a decode failure.
pub(crate) async fn fetch_live(
    pool: &SqlitePool,
    request_id: Uuid,
    now_unix: i64,
) -> Result<OperationInstance, ApiError> {
    let instance = gateway_sql::instances::fetch(pool, request_id)
        .await
        .map_err(|err| match err {
            sqlx::Error::ColumnDecode { ref index, .. } if index == "state" => {
                ApiError::new(ErrorCode::UnknownState, "instance is in an unknown state")
                    .with_correlation(request_id, None)
            }
            err => ApiError::from(err),
        })?;

    match instance {
        Some(instance) if !instance.is_expired(now_unix) => Ok(instance),
        Some(_) | None => Err(ApiError::operation_not_found(request_id)),
    }
}
