//! The seam between the gateway and the operations it hosts. Handlers are
//! plain async functions registered at boot; the dispatcher hands them
//! validated args, the derived request context, and an explicit persistence
//! handle, and branches on an explicit outcome sum instead of catching
//! thrown values.

use std::sync::Arc;

use futures::future::BoxFuture;
use models::{DomainError, Location, TokenClass};
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

/// Context derived by the dispatch pipeline, attributed to every handler
/// invocation and returned alongside the response so the surrounding layer
/// can account for side effects.
#[derive(Debug, Clone)]
pub struct DerivedContext {
    pub request_id: Uuid,
    pub session_id: Option<Uuid>,
    pub principal: String,
    pub scopes: Vec<String>,
    pub token_class: TokenClass,
    pub analytics_ref: Option<String>,
}

/// Read/write access to the gateway's stores, passed to handlers as an
/// explicit handle rather than ambient global state.
#[derive(Debug, Clone)]
pub struct Persistence {
    pub pool: SqlitePool,
}

/// How a handler invocation failed. Domain failures are business outcomes
/// and travel as HTTP 200 `state=error`; anything else is coerced to
/// `INTERNAL_ERROR`.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// The reply of a synchronous handler: a completed result, a redirect to
/// where the result lives, or both a result and an advisory location.
#[derive(Debug, Clone)]
pub struct SyncReply {
    pub result: Option<Value>,
    pub location: Option<Location>,
    pub retry_after_ms: Option<u64>,
    pub expires_at: Option<i64>,
}

impl SyncReply {
    pub fn result(result: Value) -> SyncReply {
        SyncReply {
            result: Some(result),
            location: None,
            retry_after_ms: None,
            expires_at: None,
        }
    }

    /// A body-less completion: the caller is redirected (303) to the
    /// location instead of receiving the result inline.
    pub fn redirect(location: Location) -> SyncReply {
        SyncReply {
            result: None,
            location: Some(location),
            retry_after_ms: None,
            expires_at: None,
        }
    }
}

/// What an asynchronous work function produces on success. The lifecycle
/// manager persists it and records the mime type for chunked retrieval.
#[derive(Debug, Clone)]
pub struct WorkProduct {
    pub data: String,
    pub mime_type: String,
}

pub type SyncFn = Arc<
    dyn Fn(Value, DerivedContext, Persistence) -> BoxFuture<'static, Result<SyncReply, HandlerError>>
        + Send
        + Sync,
>;

pub type WorkFn = Arc<
    dyn Fn(
            Value,
            DerivedContext,
            Persistence,
        ) -> BoxFuture<'static, Result<WorkProduct, HandlerError>>
        + Send
        + Sync,
>;

/// A registered handler. Sync handlers answer within the request; async
/// work functions run under the lifecycle manager after acceptance.
#[derive(Clone)]
pub enum Handler {
    Sync(SyncFn),
    Async(WorkFn),
}

impl Handler {
    pub fn sync<F, Fut>(f: F) -> Handler
    where
        F: Fn(Value, DerivedContext, Persistence) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<SyncReply, HandlerError>> + Send + 'static,
    {
        Handler::Sync(Arc::new(move |args, ctx, persistence| {
            Box::pin(f(args, ctx, persistence))
        }))
    }

    pub fn work<F, Fut>(f: F) -> Handler
    where
        F: Fn(Value, DerivedContext, Persistence) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<WorkProduct, HandlerError>> + Send + 'static,
    {
        Handler::Async(Arc::new(move |args, ctx, persistence| {
            Box::pin(f(args, ctx, persistence))
        }))
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync"),
            Handler::Async(_) => f.write_str("Handler::Async"),
        }
    }
}
