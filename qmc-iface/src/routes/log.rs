use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use crate::auth::authenticate;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/log", get(get_log))
}

#[derive(Deserialize, Default)]
struct LogQuery {
    pre: Option<u64>,
    last: Option<u64>,
}

/// `GET /log?pre=N&last=M` (spec §6): Maintenance-only paged retrieval
/// of encrypted log records, with the ring's UUID span exposed as a
/// weak ETag so a poller can tell "nothing new" from "ring wrapped
/// under me" without re-fetching every page.
async fn get_log(State(state): State<AppState>, headers: HeaderMap, Query(q): Query<LogQuery>) -> ApiResult<impl IntoResponse> {
    let caller = authenticate(&state, &headers).await?;
    if caller.role != qmc_users::Role::Maintenance {
        return Err(ApiError::Forbidden);
    }

    let last_id = state.log.last_id().await.ok_or(ApiError::NotFound)?;
    let count = q.pre.unwrap_or(1).max(1);
    let anchor = q.last.unwrap_or(last_id);
    let first_id = anchor.saturating_sub(count.saturating_sub(1));

    let mut records = Vec::new();
    let mut uuid = first_id;
    while uuid <= anchor {
        if let Some(rec) = state.log.get_record_encrypted(uuid).await? {
            records.push(json!({
                "uuid": uuid,
                "keyiv": base64::engine::general_purpose::STANDARD.encode(&rec.keyiv_enc),
                "record": base64::engine::general_purpose::STANDARD.encode(&rec.record_enc),
                "signature": base64::engine::general_purpose::STANDARD.encode(&rec.signature),
            }));
        }
        uuid += 1;
    }

    let etag = format!("W/\"LOG-{first_id}-{last_id}\"");
    let mut response = Json(json!({ "records": records, "firstId": first_id, "lastId": last_id })).into_response();
    response.headers_mut().insert(axum::http::header::ETAG, etag.parse().unwrap());
    Ok(response)
}
