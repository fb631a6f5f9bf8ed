use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol error codes: faults of the request itself, mirrored by a
/// dedicated HTTP status. Domain errors are not enumerated here; handlers
/// own those codes and the gateway transports them verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidEnvelope,
    UnknownOperation,
    SchemaValidationFailed,
    AuthRequired,
    InsufficientScopes,
    OperationNotFound,
    OperationNotComplete,
    DataNotFound,
    MethodNotAllowed,
    OpRemoved,
    InvalidCursor,
    RateLimited,
    InternalError,
    UnknownState,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidEnvelope => "INVALID_ENVELOPE",
            ErrorCode::UnknownOperation => "UNKNOWN_OPERATION",
            ErrorCode::SchemaValidationFailed => "SCHEMA_VALIDATION_FAILED",
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::InsufficientScopes => "INSUFFICIENT_SCOPES",
            ErrorCode::OperationNotFound => "OPERATION_NOT_FOUND",
            ErrorCode::OperationNotComplete => "OPERATION_NOT_COMPLETE",
            ErrorCode::DataNotFound => "DATA_NOT_FOUND",
            ErrorCode::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ErrorCode::OpRemoved => "OP_REMOVED",
            ErrorCode::InvalidCursor => "INVALID_CURSOR",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::UnknownState => "UNKNOWN_STATE",
        }
    }

    /// The HTTP status that carries this code on the wire.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::InvalidEnvelope
            | ErrorCode::UnknownOperation
            | ErrorCode::SchemaValidationFailed
            | ErrorCode::InvalidCursor => 400,
            ErrorCode::AuthRequired => 401,
            ErrorCode::InsufficientScopes => 403,
            ErrorCode::OperationNotFound
            | ErrorCode::OperationNotComplete
            | ErrorCode::DataNotFound => 404,
            ErrorCode::MethodNotAllowed => 405,
            ErrorCode::OpRemoved => 410,
            ErrorCode::RateLimited => 429,
            ErrorCode::InternalError | ErrorCode::UnknownState => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `error` block of a response envelope. Carried for both protocol and
/// domain errors; the two are distinguished by HTTP status, never by shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Value>,
}

impl ErrorBody {
    pub fn protocol(code: ErrorCode, message: impl Into<String>) -> ErrorBody {
        ErrorBody {
            code: code.as_str().to_string(),
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: Value) -> ErrorBody {
        self.cause = Some(cause);
        self
    }
}

impl From<DomainError> for ErrorBody {
    fn from(err: DomainError) -> ErrorBody {
        ErrorBody {
            code: err.code,
            message: err.message,
            cause: err.cause,
        }
    }
}

/// A business failure raised by a handler. Travels as HTTP 200 with
/// `state=error`; the gateway never inspects the code.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct DomainError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Value>,
}

impl DomainError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> DomainError {
        DomainError {
            code: code.into(),
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: Value) -> DomainError {
        self.cause = Some(cause);
        self
    }
}

/// One argument-validation failure, reported under `cause.issues`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}
