use crate::config::Config;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use std::sync::Arc;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub mod images;
pub mod responses;

pub fn router(state: Arc<Config>) -> Router {
    Router::new()
        .route("/health", get(images::health))
        .route("/fill/{width}/{height}/{*url}", get(images::fill_image))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.request_timeout,
        ))
        .with_state(state)
}
