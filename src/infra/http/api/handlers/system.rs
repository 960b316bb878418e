//! Welcome and health handlers

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use vitrine_api_types::{HealthResponse, MessageResponse};

use crate::infra::http::api::state::ApiState;
use crate::infra::http::db_health_response;

pub async fn welcome() -> impl IntoResponse {
    Json(MessageResponse {
        message: "Welcome to the vitrine product API".to_string(),
    })
}

pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

pub async fn health_db(State(state): State<ApiState>) -> Response {
    db_health_response(state.db.health_check().await)
}
