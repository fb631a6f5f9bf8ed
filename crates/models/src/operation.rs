use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

lazy_static! {
    /// Grammar of an operation name: `v<major>:<namespace>.<verb>`, where
    /// the namespace may itself be dotted (`v1:catalog.search.byAuthor`).
    pub static ref OP_NAME_RE: Regex =
        Regex::new(r"^v[0-9]+:[A-Za-z][A-Za-z0-9]*(\.[A-Za-z][A-Za-z0-9]*)+$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionModel {
    Sync,
    Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachingPolicy {
    None,
    Server,
    Location,
}

/// Declarative metadata of one operation, fixed at registry build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationMeta {
    pub op: String,
    /// Scopes the bearer must hold, all of them. Declaration order is
    /// preserved and is the order of `cause.missing` on a 403.
    pub required_scopes: Vec<String>,
    pub side_effecting: bool,
    pub idempotency_required: bool,
    pub execution_model: ExecutionModel,
    pub caching_policy: CachingPolicy,
    /// Lifetime of an async instance, from acceptance to expiry.
    pub ttl_seconds: u32,
    /// Caller guidance only. The gateway does not enforce cancellation.
    pub max_sync_ms: u32,
    /// Date after which calls are refused with OP_REMOVED.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sunset: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

impl OperationMeta {
    /// A sync operation with no scopes and conventional limits.
    /// Builder-style setters refine it.
    pub fn new(op: impl Into<String>) -> OperationMeta {
        OperationMeta {
            op: op.into(),
            required_scopes: Vec::new(),
            side_effecting: false,
            idempotency_required: false,
            execution_model: ExecutionModel::Sync,
            caching_policy: CachingPolicy::None,
            ttl_seconds: 900,
            max_sync_ms: 5_000,
            sunset: None,
            replacement: None,
        }
    }

    pub fn with_scopes<S: Into<String>>(mut self, scopes: impl IntoIterator<Item = S>) -> Self {
        self.required_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn side_effecting(mut self) -> Self {
        self.side_effecting = true;
        self
    }

    pub fn idempotency_required(mut self) -> Self {
        self.idempotency_required = true;
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.execution_model = ExecutionModel::Async;
        self.caching_policy = CachingPolicy::Location;
        self
    }

    pub fn with_ttl_seconds(mut self, ttl_seconds: u32) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn with_max_sync_ms(mut self, max_sync_ms: u32) -> Self {
        self.max_sync_ms = max_sync_ms;
        self
    }

    pub fn sunset(mut self, sunset: NaiveDate, replacement: impl Into<String>) -> Self {
        self.sunset = Some(sunset);
        self.replacement = Some(replacement.into());
        self
    }
}

/// One entry of the self-description document served at `/.well-known/ops`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribedOperation {
    pub op: String,
    pub args_schema: Value,
    pub result_schema: Value,
    pub side_effecting: bool,
    pub idempotency_required: bool,
    pub execution_model: ExecutionModel,
    pub max_sync_ms: u32,
    pub ttl_seconds: u32,
    pub auth_scopes: Vec<String>,
    pub caching_policy: CachingPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sunset: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfDescription {
    pub call_version: String,
    pub operations: Vec<DescribedOperation>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn op_name_grammar() {
        for ok in [
            "v1:catalog.list",
            "v1:catalog.listLegacy",
            "v12:item.reserve",
            "v1:catalog.search.byAuthor",
        ] {
            assert!(OP_NAME_RE.is_match(ok), "{ok}");
        }
        for bad in [
            "v9:nope",
            "catalog.list",
            "v1:catalog.",
            "v1:.list",
            "V1:catalog.list",
            "v1:catalog list",
            "v:catalog.list",
            "",
        ] {
            assert!(!OP_NAME_RE.is_match(bad), "{bad}");
        }
    }

    #[test]
    fn described_operation_serializes_the_wire_shape() {
        let described = DescribedOperation {
            op: "v1:catalog.listLegacy".to_string(),
            args_schema: serde_json::json!({"type": "object"}),
            result_schema: serde_json::json!({"type": "object"}),
            side_effecting: false,
            idempotency_required: false,
            execution_model: ExecutionModel::Sync,
            max_sync_ms: 5_000,
            ttl_seconds: 900,
            auth_scopes: vec!["items:browse".to_string()],
            caching_policy: CachingPolicy::Server,
            deprecated: Some(true),
            sunset: Some(NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()),
            replacement: Some("v1:catalog.list".to_string()),
        };
        let value = serde_json::to_value(&described).unwrap();
        assert_eq!(value["authScopes"], serde_json::json!(["items:browse"]));
        assert_eq!(value["executionModel"], serde_json::json!("sync"));
        assert_eq!(value["cachingPolicy"], serde_json::json!("server"));
        assert_eq!(value["sunset"], serde_json::json!("2026-06-01"));
        assert_eq!(value["deprecated"], serde_json::json!(true));
    }

    #[test]
    fn meta_defaults_and_builders() {
        let meta = OperationMeta::new("v1:item.reserve")
            .with_scopes(["items:browse", "items:write"])
            .side_effecting()
            .idempotency_required();
        assert_eq!(meta.execution_model, ExecutionModel::Sync);
        assert_eq!(meta.required_scopes, vec!["items:browse", "items:write"]);
        assert!(meta.side_effecting && meta.idempotency_required);
        assert!(meta.sunset.is_none() && meta.replacement.is_none());

        let meta = OperationMeta::new("v1:report.generate").asynchronous();
        assert_eq!(meta.execution_model, ExecutionModel::Async);
        assert_eq!(meta.caching_policy, CachingPolicy::Location);
    }
}
