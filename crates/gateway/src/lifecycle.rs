//! The async-operation state machine. Transitions flow through a validated
//! event grammar and land as single conditional UPDATEs keyed on the prior
//! state, so concurrent drivers of one instance serialize through the
//! database and an observer can only ever see forward progress.

use std::time::Duration;

use chrono::Utc;
use models::{ErrorBody, ErrorCode, OpState, OperationInstance};
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use crate::handler::{DerivedContext, HandlerError, Persistence, WorkFn};

/// Events of the instance state machine.
///
/// | from     | event    | to       |
/// |----------|----------|----------|
/// | accepted | START    | pending  |
/// | accepted | FAIL     | error    |
/// | pending  | COMPLETE | complete |
/// | pending  | FAIL     | error    |
#[derive(Debug)]
pub enum Event {
    Start,
    Complete {
        location: String,
        data: String,
        mime_type: String,
    },
    Fail {
        error: ErrorBody,
    },
}

#[derive(Debug, PartialEq)]
pub enum Outcome {
    Applied,
    /// The event found the machine already past it. Only START tolerates
    /// this; a duplicate COMPLETE or FAIL is `Rejected`.
    NoOp,
    Rejected,
}

#[derive(Clone)]
pub struct Lifecycle {
    pool: SqlitePool,
}

impl Lifecycle {
    pub fn new(pool: SqlitePool) -> Lifecycle {
        Lifecycle { pool }
    }

    /// Persist a fresh instance in `accepted`, before the acceptance
    /// envelope is returned to the caller. False when the `request_id`
    /// already names an instance.
    pub async fn accept(&self, instance: &OperationInstance) -> sqlx::Result<bool> {
        gateway_sql::instances::insert(&self.pool, instance).await
    }

    /// Apply one event. Rejected events do not change the stored state.
    pub async fn apply(&self, request_id: Uuid, event: Event) -> sqlx::Result<Outcome> {
        let now = Utc::now().timestamp();
        match event {
            Event::Start => {
                if gateway_sql::instances::try_start(&self.pool, request_id, now).await? {
                    return Ok(Outcome::Applied);
                }
                // Distinguish a benign replay from a missing instance.
                match gateway_sql::instances::fetch(&self.pool, request_id).await? {
                    Some(instance) if instance.state.rank() > OpState::Accepted.rank() => {
                        Ok(Outcome::NoOp)
                    }
                    _ => Ok(Outcome::Rejected),
                }
            }
            Event::Complete {
                location,
                data,
                mime_type,
            } => {
                let applied = gateway_sql::instances::try_complete(
                    &self.pool, request_id, &location, &data, &mime_type, now,
                )
                .await?;
                Ok(if applied { Outcome::Applied } else { Outcome::Rejected })
            }
            Event::Fail { error } => {
                let applied =
                    gateway_sql::instances::try_fail(&self.pool, request_id, &error, now).await?;
                Ok(if applied { Outcome::Applied } else { Outcome::Rejected })
            }
        }
    }

    /// Run an accepted operation's work function to a terminal state on its
    /// own task. The spawned driver owns START; the instance row must
    /// already exist in `accepted`.
    pub fn spawn(
        &self,
        request_id: Uuid,
        op: String,
        work: WorkFn,
        args: Value,
        ctx: DerivedContext,
        persistence: Persistence,
    ) {
        let lifecycle = self.clone();
        tokio::spawn(async move {
            lifecycle
                .drive(request_id, op, work, args, ctx, persistence)
                .await;
        });
    }

    #[tracing::instrument(level = "info", skip_all, fields(%request_id, %op))]
    async fn drive(
        &self,
        request_id: Uuid,
        op: String,
        work: WorkFn,
        args: Value,
        ctx: DerivedContext,
        persistence: Persistence,
    ) {
        match self.apply(request_id, Event::Start).await {
            Ok(Outcome::Applied) => (),
            Ok(outcome) => {
                tracing::warn!(?outcome, "instance was not in accepted; skipping work");
                return;
            }
            Err(error) => {
                tracing::error!(?error, "failed to start instance");
                return;
            }
        }

        let event = match (work)(args, ctx, persistence).await {
            Ok(product) => Event::Complete {
                location: format!("/ops/{request_id}/chunks"),
                data: product.data,
                mime_type: product.mime_type,
            },
            Err(HandlerError::Domain(domain)) => {
                tracing::info!(code = %domain.code, "operation failed with a domain error");
                Event::Fail {
                    error: ErrorBody::from(domain),
                }
            }
            Err(HandlerError::Internal(error)) => {
                tracing::error!(error = format!("{error:#}"), "operation failed internally");
                Event::Fail {
                    error: ErrorBody::protocol(
                        ErrorCode::InternalError,
                        "operation failed internally",
                    ),
                }
            }
        };

        match self.apply(request_id, event).await {
            Ok(Outcome::Applied) => (),
            Ok(outcome) => {
                tracing::warn!(?outcome, "terminal transition was not applied");
            }
            Err(error) => {
                tracing::error!(?error, "failed to persist terminal state");
            }
        }
    }
}

/// Periodically drop instance rows past their expiry. Expired rows are
/// already invisible to reads; this bounds table growth.
pub async fn sweep_expired(pool: SqlitePool, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match gateway_sql::instances::delete_expired(&pool, Utc::now().timestamp()).await {
            Ok(0) => (),
            Ok(swept) => tracing::info!(swept, "dropped expired operation instances"),
            Err(error) => tracing::error!(?error, "failed to sweep expired instances"),
        }
    }
}
