use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use qmc_users::{Role, UserConfig};

use crate::auth::authenticate;
use crate::error::{ApiError, ApiResult};
use crate::state::{now_secs, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:name", get(get_user).post(create_user).put(update_user).delete(remove_user))
}

fn user_json(uid: u8, user: &UserConfig) -> serde_json::Value {
    json!({
        "username": user.name,
        "uid": uid,
        "locked_until": user.lockout_timestamp,
        "valid_until": user.validity_timestamp,
        "role": role_str(user.role),
    })
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::Maintenance => "maintenance",
        Role::Operator => "operator",
        Role::LocalSd => "local SD",
        Role::LocalButton => "local button",
        Role::LocalEmergency => "local emergency",
        Role::Empty => "empty",
        Role::None => "none",
    }
}

fn role_from_str(s: &str) -> Option<Role> {
    match s {
        "maintenance" => Some(Role::Maintenance),
        "operator" => Some(Role::Operator),
        _ => None,
    }
}

/// `GET /users` (spec §6): visible to Maintenance in full, to everyone
/// else restricted to their own account (`json_user_list_api.c`).
async fn list_users(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    let caller = authenticate(&state, &headers).await?;
    let users = state.users.users().await;
    let visible: Vec<_> = users
        .iter()
        .filter(|(uid, _)| caller.role == Role::Maintenance || *uid == caller.uid)
        .map(|(uid, u)| user_json(*uid, u))
        .collect();
    Ok(Json(visible))
}

async fn get_user(State(state): State<AppState>, headers: HeaderMap, Path(name): Path<String>) -> ApiResult<impl IntoResponse> {
    let caller = authenticate(&state, &headers).await?;
    let (uid, user) = find_user(&state, &name).await.ok_or(ApiError::NotFound)?;
    if caller.role != Role::Maintenance && caller.uid != uid {
        return Err(ApiError::Forbidden);
    }
    Ok(Json(user_json(uid, &user)))
}

async fn find_user(state: &AppState, name: &str) -> Option<(u8, UserConfig)> {
    state.users.users().await.into_iter().find(|(_, u)| u.name == name)
}

async fn caller_name(state: &AppState, uid: u8) -> ApiResult<String> {
    state
        .users
        .users()
        .await
        .into_iter()
        .find(|(id, _)| *id == uid)
        .map(|(_, u)| u.name)
        .ok_or(ApiError::Unauthorized)
}

#[derive(Deserialize)]
struct CreateUserBody {
    passphrase: String,
    new_passphrase: String,
    role: String,
}

/// `POST /users/{name}` (spec §6): Maintenance-only account creation.
/// The caller re-authenticates with their own current passphrase before
/// the new account is created, matching `json_user_api.c`'s "re-run
/// `USRMGMT_CreateSession` for the acting account" check.
async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<CreateUserBody>,
) -> ApiResult<impl IntoResponse> {
    let caller = authenticate(&state, &headers).await?;
    if caller.role != Role::Maintenance {
        return Err(ApiError::Forbidden);
    }
    if find_user(&state, &name).await.is_some() {
        return Err(ApiError::BadRequest);
    }
    let acting_name = caller_name(&state, caller.uid).await?;
    state.users.check_passphrase(&acting_name, &body.passphrase, now_secs()).await.map_err(|_| ApiError::Unauthorized)?;
    let role = role_from_str(&body.role).ok_or(ApiError::BadRequest)?;
    let uid = state.users.user_add(&name, &body.new_passphrase, role).await?;
    let (_, user) = find_user(&state, &name).await.ok_or(ApiError::NotFound)?;
    Ok(Json(user_json(uid, &user)))
}

#[derive(Deserialize)]
struct UpdateUserBody {
    passphrase: String,
    new_passphrase: String,
    role: Option<String>,
}

/// `PUT /users/{name}` (spec §6): self (passphrase rotation) or
/// Maintenance (passphrase + role update for any account).
async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<UpdateUserBody>,
) -> ApiResult<impl IntoResponse> {
    let caller = authenticate(&state, &headers).await?;
    let (uid, existing) = find_user(&state, &name).await.ok_or(ApiError::NotFound)?;
    if caller.role != Role::Maintenance && caller.uid != uid {
        return Err(ApiError::Forbidden);
    }
    let acting_name = caller_name(&state, caller.uid).await?;
    state.users.check_passphrase(&acting_name, &body.passphrase, now_secs()).await.map_err(|_| ApiError::Unauthorized)?;
    let role = match body.role.as_deref() {
        Some(s) if caller.role == Role::Maintenance => role_from_str(s).ok_or(ApiError::BadRequest)?,
        _ => existing.role,
    };
    state.users.user_update(uid, &body.new_passphrase, role).await?;
    let (_, user) = find_user(&state, &name).await.ok_or(ApiError::NotFound)?;
    Ok(Json(user_json(uid, &user)))
}

/// `DELETE /users/{name}` (spec §6): Maintenance-only.
async fn remove_user(State(state): State<AppState>, headers: HeaderMap, Path(name): Path<String>) -> ApiResult<impl IntoResponse> {
    let caller = authenticate(&state, &headers).await?;
    if caller.role != Role::Maintenance {
        return Err(ApiError::Forbidden);
    }
    find_user(&state, &name).await.ok_or(ApiError::NotFound)?;
    state.users.user_remove(&name).await?;
    Ok(())
}
