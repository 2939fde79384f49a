use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use qmc_users::Role;

use crate::auth::authenticate;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/fwupload", post(upload_chunk))
}

#[derive(Deserialize)]
struct FwUploadQuery {
    offset: usize,
}

/// `POST /fwupload?offset=N` (spec §6, §8 scenario 4): one sector-aligned
/// chunk per call, body is the raw chunk bytes. Maintenance-only.
/// Returns the running `{bytes, sha256, sector_writes,
/// sector_retry_count}` summary so a client can confirm progress
/// without a separate status call.
async fn upload_chunk(State(state): State<AppState>, headers: HeaderMap, Query(q): Query<FwUploadQuery>, body: Bytes) -> ApiResult<impl IntoResponse> {
    let caller = authenticate(&state, &headers).await?;
    if caller.role != Role::Maintenance {
        return Err(ApiError::Forbidden);
    }
    state.config.write_fw_update_chunk(q.offset, &body).await?;
    let (bytes, sha256, sector_writes, sector_retry_count) = state.config.fw_update_summary().await;
    Ok(Json(json!({
        "bytes": bytes,
        "sha256": sha256,
        "sector_writes": sector_writes,
        "sector_retry_count": sector_retry_count,
    })))
}
