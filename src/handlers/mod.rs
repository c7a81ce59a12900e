pub mod orders;
pub mod sessions;
pub mod transactions;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;

use crate::health::check_health;
use crate::AppState;

/// Tab selector shared by the list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    pub view: Option<String>,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.sessions.len().await;
    let response = check_health(&state.health_checkers, sessions, state.start_time).await;

    // Degraded still serves traffic
    let status_code = if response.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(response))
}
