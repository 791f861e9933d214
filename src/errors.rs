use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error taxonomy. Validation and auth failures are resolved at
/// the boundary; storage unique violations are translated to `Conflict` by
/// the services before they can reach a response.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidDateOrTime(String),

    #[error("Idempotency-Key header is required")]
    MissingIdempotencyKey,

    #[error("Idempotency-Key conflict (payload differs)")]
    IdempotencyConflict,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Server misconfigured ({0})")]
    ServerMisconfigured(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Upstream(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidDateOrTime(_) | Self::MissingIdempotencyKey => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::IdempotencyConflict => StatusCode::CONFLICT,
            Self::ServerMisconfigured(_) | Self::Upstream(_) | Self::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        match &self {
            AppError::Validation(_)
            | AppError::InvalidDateOrTime(_)
            | AppError::MissingIdempotencyKey
            | AppError::NotFound(_) => {
                tracing::debug!(status = status.as_u16(), %message, "client error");
            }
            AppError::Unauthorized | AppError::Conflict(_) | AppError::IdempotencyConflict => {
                tracing::info!(status = status.as_u16(), %message, "rejected request");
            }
            _ => {
                tracing::error!(status = status.as_u16(), %message, error = ?self, "server error");
            }
        }

        (status, Json(json!({ "ok": false, "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            AppError::Validation("phone must be defined".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Conflict("public_token already exists".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::IdempotencyConflict.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::ServerMisconfigured("missing owner action token".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_errors_are_server_errors() {
        let err = AppError::from(StoreError::Database("connection reset".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
