use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use qmc_datahub::{MotorCommand, MotorCommandKind, MotorControlMethod, MotorId, MotorState, MotorStatus, MAX_MOTORS};

use crate::auth::authenticate;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const SNAPSHOT_TIMEOUT: Duration = Duration::from_millis(200);

pub fn router() -> Router<AppState> {
    Router::new().route("/motors", get(list_motors)).route("/motors/:id", get(get_motor).post(issue_command).put(issue_command))
}

fn status_json(status: &MotorStatus) -> serde_json::Value {
    json!({
        "motor": status.motor_id.get(),
        "state": state_str(status.state),
        "fault_bitset": status.fault_bitset,
        "speed": status.speed,
        "position": { "turns": status.position.turns, "angle": status.position.angle },
        "v_bus": status.v_bus,
        "app_switch": status.app_switch,
    })
}

fn state_str(state: MotorState) -> &'static str {
    match state {
        MotorState::Fault => "fault",
        MotorState::Init => "init",
        MotorState::Stop => "stop",
        MotorState::Run => "run",
    }
}

/// Samples one DataHub tick's worth of status (up to `MAX_MOTORS`
/// samples, delivered atomically per spec §5's ordering guarantee) by
/// opening a short-lived prescaler-1 subscription.
async fn snapshot(state: &AppState) -> ApiResult<Vec<MotorStatus>> {
    let handle = state.datahub.get_new_status_queue(1).await?;
    let mut samples = Vec::with_capacity(MAX_MOTORS);
    for _ in 0..MAX_MOTORS {
        match state.datahub.dequeue_status(handle, SNAPSHOT_TIMEOUT).await {
            Ok(status) => samples.push(status),
            Err(_) => break,
        }
    }
    state.datahub.return_status_queue(handle).await?;
    Ok(samples)
}

/// `GET /motors` (spec §6): all four statuses.
async fn list_motors(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    authenticate(&state, &headers).await?;
    let samples = snapshot(&state).await?;
    Ok(Json(samples.iter().map(status_json).collect::<Vec<_>>()))
}

/// `GET /motors/id`.
async fn get_motor(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<u8>) -> ApiResult<impl IntoResponse> {
    authenticate(&state, &headers).await?;
    let motor_id = MotorId::new(id).ok_or(ApiError::BadRequest)?;
    let samples = snapshot(&state).await?;
    let status = samples.into_iter().find(|s| s.motor_id == motor_id).ok_or(ApiError::NotFound)?;
    Ok(Json(status_json(&status)))
}

#[derive(Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
enum MethodBody {
    Scalar { v_hz_gain: f32, frequency: f32 },
    FocSpeed { speed: f32 },
    FocPosition { num_turns: i16, rotor_angle: u16, #[serde(default)] is_random: bool },
}

impl From<MethodBody> for MotorControlMethod {
    fn from(body: MethodBody) -> Self {
        match body {
            MethodBody::Scalar { v_hz_gain, frequency } => MotorControlMethod::Scalar { v_hz_gain, frequency },
            MethodBody::FocSpeed { speed } => MotorControlMethod::FocSpeed { speed },
            MethodBody::FocPosition { num_turns, rotor_angle, is_random } => {
                MotorControlMethod::FocPosition { num_turns, rotor_angle, is_random }
            }
        }
    }
}

#[derive(Deserialize)]
struct CommandBody {
    command: String,
    #[serde(flatten)]
    method: MethodBody,
}

/// `POST/PUT /motors/id` (spec §6): issues a command. Maintenance or
/// Operator role may issue commands; the stop-policy/fault-dispatch
/// machinery (C3) is the thing that actually enforces safety, not this
/// handler.
async fn issue_command(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u8>,
    Json(body): Json<CommandBody>,
) -> ApiResult<impl IntoResponse> {
    authenticate(&state, &headers).await?;
    let motor_id = MotorId::new(id).ok_or(ApiError::BadRequest)?;
    let kind = match body.command.as_str() {
        "off" => MotorCommandKind::Off,
        "on" => MotorCommandKind::On,
        "freeze" => MotorCommandKind::Freeze,
        "freeze_and_stop" => MotorCommandKind::FreezeAndStop,
        _ => return Err(ApiError::BadRequest),
    };
    let cmd = MotorCommand { motor_id, kind, method: body.method.into() };
    state.datahub.queue_command(cmd).await?;
    Ok(Json(json!({ "ok": true })))
}
