use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use models::{ErrorCode, OpState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{fetch_live, ApiError, App};

#[derive(Debug, Deserialize)]
pub struct ChunkQuery {
    pub cursor: Option<String>,
}

/// Wire shape of one chunk page. `checksumPrevious` and `cursor` serialize
/// as explicit nulls at the chain's edges; clients key off them to verify
/// and to resume.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPage {
    pub request_id: Uuid,
    /// `complete` on the final chunk, `pending` before it.
    pub state: OpState,
    pub checksum: String,
    pub checksum_previous: Option<String>,
    pub offset: u64,
    pub length: u64,
    pub mime_type: String,
    /// Byte count of the full result.
    pub total: u64,
    /// Index of the next chunk as a decimal string, or null on the last.
    pub cursor: Option<String>,
    pub data: String,
}

/// `GET /ops/{requestId}/chunks?cursor=`: derive one verifiable chunk of a
/// completed result.
pub async fn handle_chunks(
    State(app): State<Arc<App>>,
    Path(raw_id): Path<String>,
    Query(query): Query<ChunkQuery>,
) -> Result<Json<ChunkPage>, ApiError> {
    let Ok(request_id) = raw_id.parse::<Uuid>() else {
        return Err(ApiError::new(
            ErrorCode::OperationNotFound,
            format!("no operation instance {raw_id}"),
        ));
    };
    let instance = fetch_live(&app.pool, request_id, Utc::now().timestamp()).await?;

    if instance.state != OpState::Complete {
        return Err(ApiError::new(
            ErrorCode::OperationNotComplete,
            format!("instance {request_id} is {}", instance.state),
        )
        .with_correlation(request_id, instance.session_id));
    }
    let Some(data) = instance.result_data else {
        return Err(ApiError::new(
            ErrorCode::DataNotFound,
            format!("result data of {request_id} is not available"),
        )
        .with_correlation(request_id, instance.session_id));
    };

    let bytes = data.as_bytes();
    let total_chunks = chunks::total_chunks(bytes.len());
    let index = chunks::parse_cursor(query.cursor.as_deref(), total_chunks).map_err(|err| {
        ApiError::new(ErrorCode::InvalidCursor, err.to_string())
            .with_correlation(request_id, instance.session_id)
    })?;
    let chunk = chunks::slice(bytes, index)
        .ok_or_else(|| ApiError::internal("validated cursor fell out of range"))?;

    Ok(Json(ChunkPage {
        request_id,
        state: if chunk.is_last {
            OpState::Complete
        } else {
            OpState::Pending
        },
        cursor: chunk.cursor(),
        checksum_previous: chunk.checksum_previous.clone(),
        offset: chunk.offset as u64,
        length: chunk.length as u64,
        mime_type: instance
            .result_mime
            .unwrap_or_else(|| "application/json".to_string()),
        total: chunk.total as u64,
        data: String::from_utf8_lossy(chunk.data).into_owned(),
        checksum: chunk.checksum,
    }))
}
