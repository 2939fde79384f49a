use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use qmc_config::ConfigKey;
use qmc_users::Role;

use crate::auth::authenticate;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/settings/:key", get(get_setting).put(put_setting))
}

/// `GET /settings/{key}` (spec §6, §4.6): hex-encoded cell value,
/// Maintenance-only since a cell can carry credentials (e.g.
/// `generic_pass`).
async fn get_setting(State(state): State<AppState>, headers: HeaderMap, Path(key): Path<String>) -> ApiResult<impl IntoResponse> {
    let caller = authenticate(&state, &headers).await?;
    if caller.role != Role::Maintenance {
        return Err(ApiError::Forbidden);
    }
    let key = ConfigKey::from_str_key(&key).ok_or(ApiError::NotFound)?;
    let value = state.config.get_bin(key).await?;
    Ok(Json(json!({ "key": key.as_str_key(), "value": hex::encode(value) })))
}

#[derive(Deserialize)]
struct PutSettingBody {
    value: String,
}

/// `PUT /settings/{key}`: hex-decodes `value` and stores it in the RAM
/// shadow; the caller must separately persist via the firmware's own
/// flash-commit cadence (spec §4.6: nothing hits flash until
/// `update_flash` runs), so this intentionally does not call it.
async fn put_setting(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Json(body): Json<PutSettingBody>,
) -> ApiResult<impl IntoResponse> {
    let caller = authenticate(&state, &headers).await?;
    if caller.role != Role::Maintenance {
        return Err(ApiError::Forbidden);
    }
    let key = ConfigKey::from_str_key(&key).ok_or(ApiError::NotFound)?;
    let bytes = hex::decode(&body.value).map_err(|_| ApiError::BadRequest)?;
    state.config.set_bin(key, &bytes).await?;
    state.lifecycle.status().set_config_changed();
    Ok(Json(json!({ "ok": true })))
}
