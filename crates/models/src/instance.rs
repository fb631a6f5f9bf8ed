use serde_json::Value;
use uuid::Uuid;

use crate::{ErrorBody, OpState};

/// One persisted invocation of an async operation. The stored row *is* the
/// state: no in-memory actor survives a restart, and polling observes
/// exactly what was last written.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationInstance {
    pub request_id: Uuid,
    pub session_id: Option<Uuid>,
    pub op: String,
    /// Frozen copy of the validated request args.
    pub args: Value,
    pub principal: String,
    pub state: OpState,
    /// Set iff `state` is `complete`.
    pub result_location: Option<String>,
    pub result_data: Option<String>,
    pub result_mime: Option<String>,
    /// Set iff `state` is `error`.
    pub error: Option<ErrorBody>,
    /// Unix seconds.
    pub created_at: i64,
    pub updated_at: i64,
    pub expires_at: i64,
    /// Unix milliseconds; the per-instance poll rate-limit clock.
    pub last_polled_at: Option<i64>,
}

impl OperationInstance {
    pub fn is_expired(&self, now_unix: i64) -> bool {
        self.expires_at <= now_unix
    }
}
