//! The single write endpoint. One strict pipeline turns a raw POST body
//! into a response envelope: parse, shape-check, correlate, authenticate,
//! look up, authorize, validate args, gate deprecation, invoke. A failure
//! at any step short-circuits with the protocol error that step owns.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use chrono::Utc;
use models::{
    CallRequest, CallResponse, ErrorCode, Location, OpState, OperationInstance, RETRY_AFTER_MS,
};
use serde_json::Value;
use uuid::Uuid;

use crate::api::{ApiError, App};
use crate::auth;
use crate::handler::{DerivedContext, Handler, HandlerError, Persistence, SyncReply, WorkFn};

#[axum::debug_handler]
pub async fn handle_call(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    match dispatch(&app, &headers, &body).await {
        Ok(response) => response,
        Err(error) => error.into_response(),
    }
}

/// Any non-POST method on `/call`.
pub async fn method_not_allowed() -> ApiError {
    ApiError::new(ErrorCode::MethodNotAllowed, "/call only accepts POST")
}

async fn dispatch(
    app: &App,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<axum::response::Response, ApiError> {
    // 1. Body parse.
    let body: Value = serde_json::from_slice(body)
        .map_err(|_| ApiError::new(ErrorCode::InvalidEnvelope, "request body is not valid JSON"))?;

    // 2. Envelope shape.
    let request = CallRequest::from_body(&body).map_err(|issues| ApiError::invalid_envelope(&issues))?;

    // 3. Correlation: everything from here echoes these ids.
    let request_id = request.ctx.request_id.unwrap_or_else(Uuid::new_v4);
    let session_id = request.ctx.session_id;
    let now = Utc::now();

    // 4. Authentication. Runs before operation lookup, so an
    // unauthenticated probe of an unknown name still reads AUTH_REQUIRED.
    let token = auth::authenticate(&app.pool, headers, now.timestamp())
        .await
        .map_err(|err| err.with_correlation(request_id, session_id))?;

    // 5. Operation lookup.
    let record = app
        .registry
        .lookup(&request.op)
        .ok_or_else(|| {
            ApiError::unknown_operation(&request.op).with_correlation(request_id, session_id)
        })?;

    // 6. Authorization: the bearer must hold every declared scope.
    let missing = token.missing_scopes(&record.meta.required_scopes);
    if !missing.is_empty() {
        tracing::warn!(op = %request.op, principal = %token.principal, ?missing, "request lacks scopes");
        return Err(
            ApiError::insufficient_scopes(missing).with_correlation(request_id, session_id)
        );
    }

    // 7. Argument validation against the operation's schema.
    record.validate_args(&request.args).map_err(|issues| {
        ApiError::schema_validation_failed(&issues).with_correlation(request_id, session_id)
    })?;

    // 8. Deprecation gate.
    if let Some(sunset) = record.meta.sunset {
        if now.date_naive() > sunset {
            return Err(ApiError::op_removed(
                &request.op,
                sunset,
                record.meta.replacement.as_deref(),
            )
            .with_correlation(request_id, session_id));
        }
    }

    // 9 and 10. Invoke and select the HTTP status from the envelope.
    let ctx = DerivedContext {
        request_id,
        session_id,
        principal: token.principal.clone(),
        scopes: token.scopes.clone(),
        token_class: token.class,
        analytics_ref: token.analytics_ref.clone(),
    };
    let persistence = Persistence {
        pool: app.pool.clone(),
    };

    match &record.handler {
        Handler::Sync(handler) => {
            let handler = handler.clone();
            match handler(request.args.clone(), ctx.clone(), persistence).await {
                Ok(reply) => sync_response(request_id, session_id, reply, ctx),
                Err(HandlerError::Domain(domain)) => {
                    // A business failure is a successful protocol exchange.
                    let envelope = CallResponse::error(request_id, session_id, domain.into());
                    Ok(respond(StatusCode::OK, envelope, Some(ctx)))
                }
                Err(HandlerError::Internal(error)) => {
                    tracing::error!(op = %request.op, error = format!("{error:#}"), "handler failed");
                    Err(ApiError::internal("internal error")
                        .with_correlation(request_id, session_id))
                }
            }
        }
        Handler::Async(work) => {
            accept_async(
                app,
                &request,
                record.meta.ttl_seconds,
                work.clone(),
                ctx,
                now.timestamp(),
            )
            .await
        }
    }
}

fn sync_response(
    request_id: Uuid,
    session_id: Option<Uuid>,
    reply: SyncReply,
    ctx: DerivedContext,
) -> Result<axum::response::Response, ApiError> {
    let SyncReply {
        result,
        location,
        retry_after_ms,
        expires_at,
    } = reply;

    let (status, mut envelope, redirect) = match (result, location) {
        (Some(result), location) => {
            let mut envelope = CallResponse::complete(request_id, session_id, result);
            envelope.location = location;
            (StatusCode::OK, envelope, None)
        }
        (None, Some(location)) => {
            let redirect = location.uri.clone();
            let envelope = CallResponse::complete_at(request_id, session_id, location);
            (StatusCode::SEE_OTHER, envelope, Some(redirect))
        }
        (None, None) => {
            tracing::error!("sync handler replied with neither result nor location");
            return Err(
                ApiError::internal("internal error").with_correlation(request_id, session_id)
            );
        }
    };
    envelope.retry_after_ms = retry_after_ms;
    envelope.expires_at = expires_at;

    let mut response = respond(status, envelope, Some(ctx));
    if let Some(uri) = redirect {
        let uri = uri
            .parse()
            .map_err(|_| ApiError::internal("handler location is not a valid header value"))?;
        response.headers_mut().insert(header::LOCATION, uri);
    }
    Ok(response)
}

async fn accept_async(
    app: &App,
    request: &CallRequest,
    ttl_seconds: u32,
    work: WorkFn,
    ctx: DerivedContext,
    now_unix: i64,
) -> Result<axum::response::Response, ApiError> {
    let request_id = ctx.request_id;
    let session_id = ctx.session_id;
    let expires_at = now_unix + i64::from(ttl_seconds);

    let instance = OperationInstance {
        request_id,
        session_id,
        op: request.op.clone(),
        args: request.args.clone(),
        principal: ctx.principal.clone(),
        state: OpState::Accepted,
        result_location: None,
        result_data: None,
        result_mime: None,
        error: None,
        created_at: now_unix,
        updated_at: now_unix,
        expires_at,
        last_polled_at: None,
    };

    let inserted = app
        .lifecycle
        .accept(&instance)
        .await
        .map_err(|err| ApiError::from(err).with_correlation(request_id, session_id))?;
    if !inserted {
        tracing::warn!(%request_id, "requestId already names an instance");
        return Err(ApiError::internal("requestId is already in use")
            .with_correlation(request_id, session_id));
    }

    app.lifecycle.spawn(
        request_id,
        request.op.clone(),
        work,
        request.args.clone(),
        ctx.clone(),
        Persistence {
            pool: app.pool.clone(),
        },
    );

    let envelope = CallResponse::accepted(
        request_id,
        session_id,
        Location::new(format!("/ops/{request_id}")),
        RETRY_AFTER_MS,
        expires_at,
    );
    Ok(respond(StatusCode::ACCEPTED, envelope, Some(ctx)))
}

/// Assemble the HTTP response and expose the derived context to the
/// surrounding layer through response extensions.
fn respond(
    status: StatusCode,
    envelope: CallResponse,
    ctx: Option<DerivedContext>,
) -> axum::response::Response {
    let mut response = (status, axum::Json(envelope)).into_response();
    if let Some(ctx) = ctx {
        response.extensions_mut().insert(ctx);
    }
    response
}
