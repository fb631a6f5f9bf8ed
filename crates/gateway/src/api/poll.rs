use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use gateway_sql::instances::PollGate;
use models::{
    CallResponse, ErrorBody, ErrorCode, Location, OpState, OperationInstance, POLL_WINDOW_MS,
    RETRY_AFTER_MS,
};

use crate::api::{fetch_live, ApiError, App};

/// `GET /ops/{requestId}`: report the persisted state of an async
/// instance, at most once per second per instance.
pub async fn handle_poll(
    State(app): State<Arc<App>>,
    Path(raw_id): Path<String>,
) -> Result<axum::response::Response, ApiError> {
    let Ok(request_id) = raw_id.parse::<uuid::Uuid>() else {
        return Err(ApiError::new(
            ErrorCode::OperationNotFound,
            format!("no operation instance {raw_id}"),
        ));
    };
    let now = Utc::now();
    let instance = fetch_live(&app.pool, request_id, now.timestamp()).await?;

    // The gate records this poll only if it is admitted; a rejected poll
    // must not push the next caller's window out.
    match gateway_sql::instances::poll_gate(
        &app.pool,
        request_id,
        now.timestamp_millis(),
        POLL_WINDOW_MS,
    )
    .await?
    {
        PollGate::Allowed => Ok(state_response(instance)),
        PollGate::Limited { elapsed_ms } => {
            let retry_after_ms = (POLL_WINDOW_MS - elapsed_ms).clamp(0, POLL_WINDOW_MS) as u64;
            Err(ApiError::rate_limited(request_id, retry_after_ms))
        }
        // The sweeper won the race between our fetch and the gate.
        PollGate::Missing => Err(ApiError::operation_not_found(request_id)),
    }
}

fn state_response(instance: OperationInstance) -> axum::response::Response {
    let OperationInstance {
        request_id,
        session_id,
        state,
        result_location,
        error,
        expires_at,
        ..
    } = instance;

    let (status, envelope) = match state {
        OpState::Accepted => (
            StatusCode::ACCEPTED,
            CallResponse::accepted(
                request_id,
                session_id,
                Location::new(format!("/ops/{request_id}")),
                RETRY_AFTER_MS,
                expires_at,
            ),
        ),
        OpState::Pending => (
            StatusCode::ACCEPTED,
            CallResponse::pending(request_id, session_id, RETRY_AFTER_MS)
                .with_expires_at(expires_at),
        ),
        OpState::Complete => {
            let location = result_location
                .unwrap_or_else(|| format!("/ops/{request_id}/chunks"));
            (
                StatusCode::OK,
                CallResponse::complete_at(request_id, session_id, Location::new(location)),
            )
        }
        OpState::Error => {
            let error = error.unwrap_or_else(|| {
                ErrorBody::protocol(
                    ErrorCode::InternalError,
                    "instance failed without a recorded error",
                )
            });
            (
                StatusCode::OK,
                CallResponse::error(request_id, session_id, error),
            )
        }
    };
    (status, axum::Json(envelope)).into_response()
}
