//! The self-describing operation catalogue. Built once at process start
//! from declarative operation declarations, immutable afterward: lookups,
//! the serialized self-description, its ETag, and the scope maps are all
//! computed at build time and shared read-only across requests.

use std::collections::{BTreeMap, BTreeSet};

use models::{DescribedOperation, OperationMeta, SelfDescription, ValidationIssue, OP_NAME_RE};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Protocol revision serialized as `callVersion` in the self-description.
pub const CALL_VERSION: &str = "2026-03-01";

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("operation name {0:?} does not match v<major>:<namespace>.<verb>")]
    InvalidName(String),
    #[error("operation {0:?} is declared twice")]
    Duplicate(String),
    #[error("operation {op:?} declares an unusable args schema")]
    InvalidSchema {
        op: String,
        #[source]
        source: Box<jsonschema::ValidationError<'static>>,
    },
    #[error("operation {op:?} declares a sunset but no replacement")]
    SunsetWithoutReplacement { op: String },
    #[error("failed to serialize the self-description")]
    Serialize(#[from] serde_json::Error),
}

/// One operation as declared by the embedding application: metadata,
/// JSON-Schema-shaped args/result schemas, and an opaque handler. How the
/// schemas were produced (schemars derive, hand-written literal, external
/// manifest) is the declarer's business.
pub struct OperationDecl<H> {
    pub meta: OperationMeta,
    pub args_schema: Value,
    pub result_schema: Value,
    pub handler: H,
}

/// A registered operation: the declaration plus its compiled args validator.
pub struct OperationRecord<H> {
    pub meta: OperationMeta,
    pub args_schema: Value,
    pub result_schema: Value,
    validator: jsonschema::Validator,
    pub handler: H,
}

impl<H> OperationRecord<H> {
    /// Validate raw args against this operation's schema, reporting every
    /// violation as a `{path, message}` pair in evaluation order.
    pub fn validate_args(&self, args: &Value) -> Result<(), Vec<ValidationIssue>> {
        let issues: Vec<ValidationIssue> = self
            .validator
            .iter_errors(args)
            .map(|err| ValidationIssue {
                path: err.instance_path.to_string(),
                message: err.to_string(),
            })
            .collect();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

pub struct Registry<H> {
    ops: BTreeMap<String, OperationRecord<H>>,
    scope_to_ops: BTreeMap<String, BTreeSet<String>>,
    description_bytes: Vec<u8>,
    etag: String,
}

impl<H> Registry<H> {
    /// Assemble the registry. Names are checked against the operation
    /// grammar, schemas are compiled, and the self-description document and
    /// its ETag are serialized exactly once.
    pub fn build(decls: Vec<OperationDecl<H>>) -> Result<Registry<H>, BuildError> {
        let mut ops = BTreeMap::new();

        for decl in decls {
            let OperationDecl {
                meta,
                args_schema,
                result_schema,
                handler,
            } = decl;

            if !OP_NAME_RE.is_match(&meta.op) {
                return Err(BuildError::InvalidName(meta.op));
            }
            if meta.sunset.is_some() && meta.replacement.is_none() {
                return Err(BuildError::SunsetWithoutReplacement { op: meta.op });
            }
            let validator =
                jsonschema::validator_for(&args_schema).map_err(|err| BuildError::InvalidSchema {
                    op: meta.op.clone(),
                    source: Box::new(err),
                })?;

            let record = OperationRecord {
                meta,
                args_schema,
                result_schema,
                validator,
                handler,
            };
            let op = record.meta.op.clone();
            if ops.insert(op.clone(), record).is_some() {
                return Err(BuildError::Duplicate(op));
            }
        }

        let mut scope_to_ops: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for record in ops.values() {
            for scope in &record.meta.required_scopes {
                scope_to_ops
                    .entry(scope.clone())
                    .or_default()
                    .insert(record.meta.op.clone());
            }
        }

        let description = SelfDescription {
            call_version: CALL_VERSION.to_string(),
            operations: ops.values().map(describe).collect(),
        };
        let description_bytes = serde_json::to_vec(&description)?;
        let etag = format!("\"{}\"", hex::encode(Sha256::digest(&description_bytes)));

        Ok(Registry {
            ops,
            scope_to_ops,
            description_bytes,
            etag,
        })
    }

    pub fn lookup(&self, op: &str) -> Option<&OperationRecord<H>> {
        self.ops.get(op)
    }

    pub fn operations(&self) -> impl Iterator<Item = &OperationRecord<H>> {
        self.ops.values()
    }

    /// Serialized self-description, computed once at build.
    pub fn description_bytes(&self) -> &[u8] {
        &self.description_bytes
    }

    /// Strong validator of the self-description, quotes included.
    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// Scopes required by `op`, in declared order. Consulted per request.
    pub fn scopes_for_op(&self, op: &str) -> Option<&[String]> {
        self.ops.get(op).map(|r| r.meta.required_scopes.as_slice())
    }

    /// Operations requiring `scope`. Introspection only; never consulted
    /// on the request path.
    pub fn ops_for_scope(&self, scope: &str) -> Option<&BTreeSet<String>> {
        self.scope_to_ops.get(scope)
    }
}

fn describe<H>(record: &OperationRecord<H>) -> DescribedOperation {
    let meta = &record.meta;
    DescribedOperation {
        op: meta.op.clone(),
        args_schema: record.args_schema.clone(),
        result_schema: record.result_schema.clone(),
        side_effecting: meta.side_effecting,
        idempotency_required: meta.idempotency_required,
        execution_model: meta.execution_model,
        max_sync_ms: meta.max_sync_ms,
        ttl_seconds: meta.ttl_seconds,
        auth_scopes: meta.required_scopes.clone(),
        caching_policy: meta.caching_policy,
        deprecated: meta.sunset.map(|_| true),
        sunset: meta.sunset,
        replacement: meta.replacement.clone(),
    }
}

impl<H> std::fmt::Debug for Registry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("operations", &self.ops.keys().collect::<Vec<_>>())
            .field("etag", &self.etag)
            .finish()
    }
}
