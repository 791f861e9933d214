//! Content-store style create endpoints.

use crate::errors::AppError;
use crate::services::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state.intake.create(&body).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn idempotent_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let reply = state.intake.idempotent_create(key, &body).await?;
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::OK);

    let mut response = (status, Json(reply.body)).into_response();
    if let Some(replayed) = reply.replayed {
        response.headers_mut().insert(
            "x-idempotency-replayed",
            HeaderValue::from_static(if replayed { "true" } else { "false" }),
        );
    }
    Ok(response)
}
