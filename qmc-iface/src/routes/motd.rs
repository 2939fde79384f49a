use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use qmc_config::ConfigKey;

use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/motd", get(get_motd))
}

/// `GET /motd` (spec §6): the only fully anonymous read — no
/// authentication, so a panel showing a welcome screen can fetch it
/// before a session exists.
async fn get_motd(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let motd = state.config.get_str(ConfigKey::Motd).await?;
    Ok(Json(json!({ "motd": motd })))
}
