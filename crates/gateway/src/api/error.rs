//! Protocol-error type for every API handler. An `ApiError` is a fault of
//! the request itself; it renders as the canonical response envelope with
//! `state=error` and the HTTP status its code dictates. Domain errors never
//! pass through here; the dispatcher folds those into a 200 envelope.

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use models::{CallResponse, ErrorBody, ErrorCode};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub cause: Option<Value>,
    /// Correlation, attached once the pipeline has derived it. A minted id
    /// is used at render time when the failure precedes correlation.
    pub request_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub retry_after_ms: Option<u64>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> ApiError {
        ApiError {
            code,
            message: message.into(),
            cause: None,
            request_id: None,
            session_id: None,
            retry_after_ms: None,
        }
    }

    pub fn with_cause(mut self, cause: Value) -> ApiError {
        self.cause = Some(cause);
        self
    }

    /// Attach correlation ids so the error envelope still echoes them.
    pub fn with_correlation(mut self, request_id: Uuid, session_id: Option<Uuid>) -> ApiError {
        self.request_id = Some(request_id);
        self.session_id = session_id;
        self
    }

    pub fn invalid_envelope(issues: &[String]) -> ApiError {
        ApiError::new(
            ErrorCode::InvalidEnvelope,
            format!("invalid envelope: {}", issues.join("; ")),
        )
    }

    pub fn unknown_operation(op: &str) -> ApiError {
        ApiError::new(ErrorCode::UnknownOperation, format!("Unknown operation: {op}"))
    }

    pub fn auth_required(message: &str) -> ApiError {
        ApiError::new(ErrorCode::AuthRequired, message)
    }

    pub fn insufficient_scopes(missing: Vec<String>) -> ApiError {
        ApiError::new(
            ErrorCode::InsufficientScopes,
            format!("missing required scopes: {}", missing.join(", ")),
        )
        .with_cause(json!({ "missing": missing }))
    }

    pub fn schema_validation_failed(issues: &[models::ValidationIssue]) -> ApiError {
        ApiError::new(
            ErrorCode::SchemaValidationFailed,
            "arguments do not match the operation schema",
        )
        .with_cause(json!({ "issues": issues }))
    }

    pub fn op_removed(op: &str, sunset: chrono::NaiveDate, replacement: Option<&str>) -> ApiError {
        ApiError::new(
            ErrorCode::OpRemoved,
            format!("operation {op} was removed on {sunset}"),
        )
        .with_cause(json!({
            "removedOp": op,
            "sunset": sunset,
            "replacement": replacement,
        }))
    }

    pub fn operation_not_found(request_id: Uuid) -> ApiError {
        ApiError::new(
            ErrorCode::OperationNotFound,
            format!("no operation instance {request_id}"),
        )
        .with_correlation(request_id, None)
    }

    pub fn rate_limited(request_id: Uuid, retry_after_ms: u64) -> ApiError {
        let mut err = ApiError::new(
            ErrorCode::RateLimited,
            "instance is being polled faster than once per second",
        )
        .with_correlation(request_id, None);
        err.retry_after_ms = Some(retry_after_ms);
        err
    }

    pub fn internal(message: &str) -> ApiError {
        ApiError::new(ErrorCode::InternalError, message)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(error: sqlx::Error) -> ApiError {
        tracing::error!(?error, "API responding with database error");
        ApiError::internal("storage error, please retry the request")
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> ApiError {
        tracing::error!(error = format!("{error:#}"), "API responding with internal error");
        ApiError::internal("internal error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.code.http_status())
            .expect("protocol error codes map to valid statuses");

        let request_id = self.request_id.unwrap_or_else(Uuid::new_v4);
        let mut body = CallResponse::error(
            request_id,
            self.session_id,
            ErrorBody {
                code: self.code.as_str().to_string(),
                message: self.message,
                cause: self.cause,
            },
        );
        body.retry_after_ms = self.retry_after_ms;

        let mut response = (status, axum::Json(body)).into_response();
        if self.code == ErrorCode::MethodNotAllowed {
            response
                .headers_mut()
                .insert(header::ALLOW, "POST".parse().expect("static header"));
        }
        response
    }
}
