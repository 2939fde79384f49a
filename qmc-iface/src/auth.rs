use axum::http::HeaderMap;

use qmc_users::UserSession;

use crate::error::{ApiError, ApiResult};
use crate::state::{now_secs, AppState};

/// Extracts and validates the bearer session token (spec §6: "all
/// mutating endpoints require a Maintenance role unless noted"). Every
/// handler that isn't explicitly anonymous (`/motd`, `GET /time`) calls
/// this first.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> ApiResult<UserSession> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;
    state.users.user_validate_session(token, now_secs()).await.map_err(|_| ApiError::Unauthorized)
}
