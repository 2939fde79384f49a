use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use qmc_kernel::error::QmcError;

/// REST-layer errors (spec §6 "common error body"): an `anyhow`-wrapping
/// `Error`/`IntoResponse` pair that additionally maps `QmcError` and this
/// crate's own authentication/authorization failures to the right HTTP
/// status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request")]
    BadRequest,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Qmc(#[from] QmcError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest => (StatusCode::BAD_REQUEST, "bad request".to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::Qmc(e) => (status_for_qmc_error(e), e.to_string()),
            ApiError::Other(e) => {
                error!(error = %e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn status_for_qmc_error(e: &QmcError) -> StatusCode {
    match e {
        QmcError::ArgInvalid | QmcError::OutOfRange => StatusCode::BAD_REQUEST,
        QmcError::Busy => StatusCode::LOCKED,
        QmcError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        QmcError::NoMem | QmcError::NoBufs => StatusCode::INSUFFICIENT_STORAGE,
        QmcError::SignatureInvalid => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
