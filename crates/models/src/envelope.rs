use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{ErrorBody, OpState};

/// CallContext is the optional `ctx` block of a request envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallContext {
    /// Client-supplied correlation id. The gateway mints one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    /// Opaque grouping id, echoed unchanged on every response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    /// Reserved for side-effecting operations. Opaque to the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// An out-of-band media reference carried alongside a request.
/// The gateway validates shape only and never dereferences these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub name: String,
    pub mime_type: String,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub ref_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<u64>,
}

/// The single request envelope shared by every operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Versioned operation name, shape `v<major>:<namespace>.<verb>`.
    pub op: String,
    /// Operation-specific arguments. The schema is owned by the operation.
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub ctx: CallContext,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaRef>,
}

impl CallRequest {
    /// Shape-check a parsed JSON body against the envelope schema, returning
    /// either the typed request or the list of offending paths.
    ///
    /// Only envelope shape is judged here. The operation name grammar is a
    /// registry concern (a well-shaped string naming no registered operation
    /// is UNKNOWN_OPERATION, not INVALID_ENVELOPE), and `args` content is
    /// judged by the operation's own schema.
    pub fn from_body(body: &Value) -> Result<CallRequest, Vec<String>> {
        let mut issues = Vec::new();

        let Some(obj) = body.as_object() else {
            return Err(vec!["envelope: expected a JSON object".to_string()]);
        };

        let op = match obj.get("op") {
            Some(Value::String(op)) if !op.is_empty() => op.clone(),
            Some(Value::String(_)) => {
                issues.push("op: must be a non-empty string".to_string());
                String::new()
            }
            Some(_) => {
                issues.push("op: expected a string".to_string());
                String::new()
            }
            None => {
                issues.push("op: required".to_string());
                String::new()
            }
        };

        let args = match obj.get("args") {
            None => Value::Object(Default::default()),
            Some(args @ Value::Object(_)) => args.clone(),
            Some(_) => {
                issues.push("args: expected an object".to_string());
                Value::Object(Default::default())
            }
        };

        let ctx = match obj.get("ctx") {
            None => CallContext::default(),
            Some(Value::Object(ctx)) => {
                let mut parsed = CallContext::default();
                parsed.request_id = parse_uuid(ctx.get("requestId"), "ctx.requestId", &mut issues);
                parsed.session_id = parse_uuid(ctx.get("sessionId"), "ctx.sessionId", &mut issues);
                parsed.idempotency_key = match ctx.get("idempotencyKey") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(key)) => Some(key.clone()),
                    Some(_) => {
                        issues.push("ctx.idempotencyKey: expected a string".to_string());
                        None
                    }
                };
                parsed
            }
            Some(_) => {
                issues.push("ctx: expected an object".to_string());
                CallContext::default()
            }
        };

        let media = match obj.get("media") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .filter_map(|(index, item)| parse_media(item, index, &mut issues))
                .collect(),
            Some(_) => {
                issues.push("media: expected an array".to_string());
                Vec::new()
            }
        };

        if !issues.is_empty() {
            return Err(issues);
        }
        Ok(CallRequest {
            op,
            args,
            ctx,
            media,
        })
    }
}

fn parse_uuid(value: Option<&Value>, path: &str, issues: &mut Vec<String>) -> Option<Uuid> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => match raw.parse::<Uuid>() {
            Ok(id) => Some(id),
            Err(_) => {
                issues.push(format!("{path}: expected a UUID"));
                None
            }
        },
        Some(_) => {
            issues.push(format!("{path}: expected a UUID string"));
            None
        }
    }
}

fn parse_media(item: &Value, index: usize, issues: &mut Vec<String>) -> Option<MediaRef> {
    let Some(obj) = item.as_object() else {
        issues.push(format!("media[{index}]: expected an object"));
        return None;
    };
    let before = issues.len();

    let name = match obj.get("name") {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        _ => {
            issues.push(format!("media[{index}].name: required string"));
            String::new()
        }
    };
    let mime_type = match obj.get("mimeType") {
        Some(Value::String(mime)) if !mime.is_empty() => mime.clone(),
        _ => {
            issues.push(format!("media[{index}].mimeType: required string"));
            String::new()
        }
    };
    let ref_ = match obj.get("ref") {
        None | Some(Value::Null) => None,
        Some(Value::String(r)) => Some(r.clone()),
        Some(_) => {
            issues.push(format!("media[{index}].ref: expected a string"));
            None
        }
    };
    let part = match obj.get("part") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) if n.as_u64().is_some() => n.as_u64(),
        Some(_) => {
            issues.push(format!("media[{index}].part: expected a non-negative integer"));
            None
        }
    };

    if issues.len() != before {
        return None;
    }
    Some(MediaRef {
        name,
        mime_type,
        ref_,
        part,
    })
}

/// A result location, either an async instance URI or a 303 redirect target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
}

impl Location {
    pub fn new(uri: impl Into<String>) -> Location {
        Location {
            uri: uri.into(),
            auth: None,
        }
    }
}

/// The single response envelope shared by every outcome.
///
/// `result`, `error`, and a body-less `location` are mutually exclusive:
/// the constructors below are the only way the gateway assembles one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    pub request_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    pub state: OpState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl CallResponse {
    pub fn complete(request_id: Uuid, session_id: Option<Uuid>, result: Value) -> CallResponse {
        CallResponse {
            request_id,
            session_id,
            state: OpState::Complete,
            result: Some(result),
            error: None,
            location: None,
            retry_after_ms: None,
            expires_at: None,
        }
    }

    /// A completed response that points at its result instead of carrying
    /// one: a 303 redirect from dispatch, or a 200 from polling.
    pub fn complete_at(request_id: Uuid, session_id: Option<Uuid>, location: Location) -> CallResponse {
        CallResponse {
            request_id,
            session_id,
            state: OpState::Complete,
            result: None,
            error: None,
            location: Some(location),
            retry_after_ms: None,
            expires_at: None,
        }
    }

    pub fn accepted(
        request_id: Uuid,
        session_id: Option<Uuid>,
        location: Location,
        retry_after_ms: u64,
        expires_at: i64,
    ) -> CallResponse {
        CallResponse {
            request_id,
            session_id,
            state: OpState::Accepted,
            result: None,
            error: None,
            location: Some(location),
            retry_after_ms: Some(retry_after_ms),
            expires_at: Some(expires_at),
        }
    }

    pub fn pending(request_id: Uuid, session_id: Option<Uuid>, retry_after_ms: u64) -> CallResponse {
        CallResponse {
            request_id,
            session_id,
            state: OpState::Pending,
            result: None,
            error: None,
            location: None,
            retry_after_ms: Some(retry_after_ms),
            expires_at: None,
        }
    }

    pub fn error(request_id: Uuid, session_id: Option<Uuid>, error: ErrorBody) -> CallResponse {
        CallResponse {
            request_id,
            session_id,
            state: OpState::Error,
            result: None,
            error: Some(error),
            location: None,
            retry_after_ms: None,
            expires_at: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after_ms: u64) -> CallResponse {
        self.retry_after_ms = Some(retry_after_ms);
        self
    }

    pub fn with_location(mut self, location: Location) -> CallResponse {
        self.location = Some(location);
        self
    }

    pub fn with_expires_at(mut self, expires_at: i64) -> CallResponse {
        self.expires_at = Some(expires_at);
        self
    }
}
