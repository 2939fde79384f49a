use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use qmc_lifecycle::LifecycleState;
use qmc_users::Role;

use crate::auth::authenticate;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/system", get(get_system).post(set_system))
}

/// `GET /system` (spec §6): `{deviceId, lifecycle, fwVersion}`.
async fn get_system(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    authenticate(&state, &headers).await?;
    Ok(Json(json!({
        "deviceId": state.device_id,
        "lifecycle": state.lifecycle.status().lifecycle().as_str(),
        "fwVersion": state.fw_version,
    })))
}

#[derive(Deserialize)]
struct SetSystemBody {
    lifecycle: String,
}

/// `POST /system` (spec §4.9, grounded on `json_system_api.c`): the only
/// caller-driven lifecycle transitions are `Error -> Maintenance` and
/// `Maintenance -> Operational`; everything else is rejected as a bad
/// request rather than silently ignored.
async fn set_system(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<SetSystemBody>) -> ApiResult<impl IntoResponse> {
    let caller = authenticate(&state, &headers).await?;
    if caller.role != Role::Maintenance {
        return Err(ApiError::Forbidden);
    }
    let target = LifecycleState::from_str_name(&body.lifecycle).ok_or(ApiError::BadRequest)?;
    let ok = match target {
        LifecycleState::Maintenance => state.lifecycle.error_to_maintenance(),
        LifecycleState::Operational => {
            state.lifecycle.maintenance_to_operational() || state.lifecycle.commissioning_to_operational()
        }
        _ => false,
    };
    if !ok {
        return Err(ApiError::BadRequest);
    }
    Ok(Json(json!({
        "deviceId": state.device_id,
        "lifecycle": state.lifecycle.status().lifecycle().as_str(),
        "fwVersion": state.fw_version,
    })))
}
