//! Built-in operations of the gateway binary: a sync echo used as the
//! protocol smoke check, and an async export that exercises the lifecycle
//! and chunk machinery end to end. Domain operations are registered by the
//! embedding application through the same declarations.

use models::OperationMeta;
use registry::OperationDecl;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::json;

use crate::handler::{Handler, HandlerError, SyncReply, WorkProduct};

pub fn built_in() -> Vec<OperationDecl<Handler>> {
    vec![echo(), export()]
}

/// Args of `v1:core.echo`. Extra members are allowed and echoed back.
#[derive(Debug, Deserialize, JsonSchema)]
struct EchoArgs {
    /// Optional message to mirror.
    #[serde(default)]
    #[allow(dead_code)]
    message: Option<String>,
}

/// `v1:core.echo` completes synchronously with a pure projection of its
/// args, so a caller can verify dispatch, auth, and correlation in one
/// request.
fn echo() -> OperationDecl<Handler> {
    OperationDecl {
        meta: OperationMeta::new("v1:core.echo")
            .with_scopes(["core:call"])
            .with_max_sync_ms(1_000),
        args_schema: serde_json::to_value(schema_for!(EchoArgs)).unwrap(),
        result_schema: json!({
            "type": "object",
            "required": ["echo"],
            "properties": {"echo": {"type": "object"}},
        }),
        handler: Handler::sync(|args, _ctx, _persistence| async move {
            Ok(SyncReply::result(json!({ "echo": args })))
        }),
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ExportArgs {
    /// Number of rows to synthesize.
    #[serde(default = "default_rows")]
    #[schemars(range(min = 1, max = 100_000))]
    rows: u32,
}

fn default_rows() -> u32 {
    1_000
}

/// `v1:core.export` runs under the lifecycle manager and produces a CSV
/// blob for chunked retrieval.
fn export() -> OperationDecl<Handler> {
    OperationDecl {
        meta: OperationMeta::new("v1:core.export")
            .with_scopes(["core:export"])
            .asynchronous()
            .with_ttl_seconds(900),
        args_schema: serde_json::to_value(schema_for!(ExportArgs)).unwrap(),
        result_schema: json!({
            "type": "string",
            "contentMediaType": "text/csv",
        }),
        handler: Handler::work(|args, ctx, _persistence| async move {
            let args: ExportArgs =
                serde_json::from_value(args).map_err(|err| HandlerError::Internal(err.into()))?;

            let mut data = String::from("row,principal\n");
            for row in 0..args.rows {
                data.push_str(&format!("{row},{}\n", ctx.principal));
            }
            Ok(WorkProduct {
                data,
                mime_type: "text/csv".to_string(),
            })
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use registry::Registry;

    #[test]
    fn built_ins_assemble_into_a_registry() {
        let registry = Registry::build(built_in()).unwrap();
        assert!(registry.lookup("v1:core.echo").is_some());
        assert!(registry.lookup("v1:core.export").is_some());
        assert_eq!(
            registry.scopes_for_op("v1:core.export").unwrap(),
            &["core:export".to_string()],
        );
    }

    #[test]
    fn export_args_are_bounded_by_schema() {
        let registry = Registry::build(built_in()).unwrap();
        let export = registry.lookup("v1:core.export").unwrap();

        assert!(export.validate_args(&json!({})).is_ok());
        assert!(export.validate_args(&json!({"rows": 10})).is_ok());
        assert!(export.validate_args(&json!({"rows": 0})).is_err());
        assert!(export.validate_args(&json!({"rows": "many"})).is_err());
    }
}
