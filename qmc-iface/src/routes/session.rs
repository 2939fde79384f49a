use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::{Json, Router};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;

use qmc_users::Role;

use crate::auth::authenticate;
use crate::error::{ApiError, ApiResult};
use crate::state::{now_secs, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/session", post(create_session).get(list_sessions).delete(end_own_session))
        .route("/session/:sid", get(get_session).delete(end_session))
}

#[derive(Deserialize)]
struct CreateSessionBody {
    user: String,
    passphrase: String,
}

/// `POST /session` (spec §6): `{user, passphrase}` -> `{sid, token,
/// payload}`. Grounded on `json_session_api.c`'s `USRMGMT_CreateSession`
/// + immediate `USRMGMT_ValidateSession` round-trip.
async fn create_session(State(state): State<AppState>, Json(body): Json<CreateSessionBody>) -> ApiResult<impl IntoResponse> {
    let (token, session) = state
        .users
        .user_create_session(&body.user, &body.passphrase, now_secs(), state.session_duration_secs, &state.device_id)
        .await
        .map_err(|_| ApiError::Unauthorized)?;
    Ok(Json(json!({
        "sid": session.sid,
        "token": token,
        "payload": { "uid": session.uid, "role": session.role.as_jwt_str(), "exp": session.exp },
    })))
}

/// `GET /session[/sid]`: own payload for any role, any session's payload
/// for Maintenance.
async fn list_sessions(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    let caller = authenticate(&state, &headers).await?;
    let sessions = state.users.sessions(now_secs()).await;
    let visible: Vec<_> = sessions
        .iter()
        .filter(|s| caller.role == Role::Maintenance || s.sid == caller.sid)
        .map(|s| json!({ "sid": s.sid, "uid": s.uid, "role": s.role.as_jwt_str(), "exp": s.exp }))
        .collect();
    Ok(Json(visible))
}

async fn get_session(State(state): State<AppState>, headers: HeaderMap, Path(sid): Path<i32>) -> ApiResult<impl IntoResponse> {
    let caller = authenticate(&state, &headers).await?;
    if caller.role != Role::Maintenance && caller.sid != sid {
        return Err(ApiError::Forbidden);
    }
    let sessions = state.users.sessions(now_secs()).await;
    let session = sessions.iter().find(|s| s.sid == sid).ok_or(ApiError::NotFound)?;
    Ok(Json(json!({ "sid": session.sid, "uid": session.uid, "role": session.role.as_jwt_str(), "exp": session.exp })))
}

/// `DELETE /session`: end the caller's own session.
async fn end_own_session(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    let caller = authenticate(&state, &headers).await?;
    state.users.user_end_session(caller.sid, caller.sid).await?;
    Ok(())
}

/// `DELETE /session/sid`: end any session (Maintenance only).
async fn end_session(State(state): State<AppState>, headers: HeaderMap, Path(sid): Path<i32>) -> ApiResult<impl IntoResponse> {
    let caller = authenticate(&state, &headers).await?;
    if caller.role != Role::Maintenance {
        return Err(ApiError::Forbidden);
    }
    state.users.user_end_session(caller.sid, sid).await?;
    Ok(())
}
