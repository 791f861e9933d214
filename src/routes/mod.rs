pub mod booking;
pub mod health;
pub mod owner;
pub mod request;

use crate::services::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::time::Duration;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Maximum concurrent requests (backpressure control).
const MAX_CONCURRENT_REQUESTS: usize = 100;

/// Request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/request", post(request::submit_request))
        .route("/request/{token}/approve", post(owner::approve))
        .route("/request/{token}/decline", post(owner::decline))
        .route("/booking-requests", post(booking::create))
        .route("/booking-requests-idempotent", post(booking::idempotent_create))
        .route("/health", get(health::health_check))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
                .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
                .layer(CorsLayer::permissive()),
        )
}
