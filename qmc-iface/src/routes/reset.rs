use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use qmc_log::{LogCategoryId, LogEventCode, LogRecord, LogRecordData, LogSourceId, LogTimestamp, RecordHead};
use qmc_users::Role;

use crate::auth::authenticate;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/reset", post(request_reset))
}

/// `POST /reset` (spec §6): Maintenance-only. Logs the request and
/// returns; the actual hardware reset is out of scope per spec.md §1 —
/// the caller is expected to power-cycle once this returns, same as the
/// decommissioning path.
async fn request_reset(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    let caller = authenticate(&state, &headers).await?;
    if caller.role != Role::Maintenance {
        return Err(ApiError::Forbidden);
    }
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let record = LogRecord {
        head: RecordHead { checksum: 0, uuid: 0, timestamp: LogTimestamp::new(now.as_secs(), 0) },
        data: LogRecordData::Default {
            source: LogSourceId::Webservice,
            category: LogCategoryId::General,
            event_code: LogEventCode::ResetRequest,
            user: caller.uid as u16,
        },
    };
    state.log.queue_entry(record, false).await?;
    Ok(Json(json!({ "ok": true })))
}
