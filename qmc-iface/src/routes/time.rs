use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use qmc_users::Role;

use crate::auth::authenticate;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/time", get(get_time).post(set_time))
}

/// Formats `{time: "<sec><msec3>"}` (spec §6, grounded on
/// `json_time_api.c`): whole seconds immediately followed by a
/// zero-padded three-digit millisecond remainder, concatenated into one
/// decimal string rather than a `sec.msec` pair.
fn format_time(unix_seconds: u64, millis: u16) -> String {
    format!("{unix_seconds}{millis:03}")
}

fn parse_time(s: &str) -> Option<(u64, u16)> {
    if s.len() <= 3 {
        return None;
    }
    let split = s.len() - 3;
    let secs: u64 = s[..split].parse().ok()?;
    let millis: u16 = s[split..].parse().ok()?;
    Some((secs, millis))
}

/// `GET /time`: public, no authentication required (spec §6 lists this
/// among the anonymous reads alongside `/motd`).
async fn get_time() -> impl IntoResponse {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    Json(json!({ "time": format_time(now.as_secs(), (now.subsec_millis()) as u16) }))
}

#[derive(Deserialize)]
struct SetTimeBody {
    time: String,
}

/// `POST /time` (spec §6): Maintenance-only wall-clock set. The actual
/// RTC write is out of scope per spec.md §1; this validates the format
/// and reports what would be applied.
async fn set_time(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<SetTimeBody>) -> ApiResult<impl IntoResponse> {
    let caller = authenticate(&state, &headers).await?;
    if caller.role != Role::Maintenance {
        return Err(ApiError::Forbidden);
    }
    let (secs, millis) = parse_time(&body.time).ok_or(ApiError::BadRequest)?;
    Ok(Json(json!({ "time": format_time(secs, millis) })))
}
