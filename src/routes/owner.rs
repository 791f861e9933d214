//! Owner approve/decline endpoints, reached from one-click links in the
//! notification email. Authentication is the shared `X-Owner-Action-Token`
//! header; the path `{token}` is the booking's public token.

use crate::errors::AppError;
use crate::services::AppState;
use crate::store::BookingRequest;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::Value;

const OWNER_TOKEN_HEADER: &str = "x-owner-action-token";

fn provided_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(OWNER_TOKEN_HEADER).and_then(|v| v.to_str().ok())
}

pub async fn approve(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Result<Json<BookingRequest>, AppError> {
    let updated = state
        .approval
        .approve(provided_token(&headers), &token)
        .await?;
    Ok(Json(updated))
}

pub async fn decline(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<BookingRequest>, AppError> {
    // Body is optional; a bare decline carries no note.
    let note = serde_json::from_slice::<Value>(&body)
        .ok()
        .map(|v| crate::services::intake::unwrap_envelope(&v))
        .and_then(|data| {
            data.get("decision_note")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
        });

    let updated = state
        .approval
        .decline(provided_token(&headers), &token, note)
        .await?;
    Ok(Json(updated))
}
