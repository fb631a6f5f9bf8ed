mod envelope;
mod error;
mod instance;
mod operation;
mod state;
mod token;

pub use envelope::{CallContext, CallRequest, CallResponse, Location, MediaRef};
pub use error::{DomainError, ErrorBody, ErrorCode, ValidationIssue};
pub use instance::OperationInstance;
pub use operation::{
    CachingPolicy, DescribedOperation, ExecutionModel, OperationMeta, SelfDescription, OP_NAME_RE,
};
pub use state::OpState;
pub use token::{TokenClass, TokenRecord};

/// Poll rate-limit window, in milliseconds. One poll per instance per window.
pub const POLL_WINDOW_MS: i64 = 1_000;

/// Suggested client poll interval, surfaced as `retryAfterMs` on
/// `accepted` and `pending` responses.
pub const RETRY_AFTER_MS: u64 = 1_000;
