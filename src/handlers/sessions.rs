use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::domain::StatusCounts;
use crate::error::AppError;
use crate::store::LoadOutcome;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub store_id: String,
    pub orders: LoadOutcome,
    pub transactions: LoadOutcome,
    pub counts: StatusCounts,
}

pub async fn refresh(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let engine = state.sessions.open(&store_id).await?;
    let (orders, transactions) = engine.reload().await?;

    Ok(Json(RefreshResponse {
        counts: engine.count_by_status(),
        store_id,
        orders,
        transactions,
    }))
}

pub async fn close_session(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if state.sessions.close(&store_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("No open session for store {}", store_id)))
    }
}
