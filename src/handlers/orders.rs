use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::Serialize;

use super::ViewQuery;
use crate::domain::{Order, OrderPatch, OrderStatus, OrderView, StatusCounts, Transaction};
use crate::error::AppError;
use crate::services::OrderRow;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRowResponse {
    pub order: Order,
    pub total: BigDecimal,
    pub transaction: Option<Transaction>,
    pub next_statuses: Vec<OrderStatus>,
}

impl From<OrderRow> for OrderRowResponse {
    fn from(row: OrderRow) -> Self {
        Self {
            order: row.order,
            total: row.total,
            transaction: row.transaction,
            next_statuses: row.next_statuses,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListResponse {
    pub store_id: String,
    pub view: String,
    pub counts: StatusCounts,
    pub orders: Vec<OrderRowResponse>,
}

pub async fn list_orders(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
    Query(query): Query<ViewQuery>,
) -> Result<impl IntoResponse, AppError> {
    let engine = state.sessions.open(&store_id).await?;
    let view = query
        .view
        .unwrap_or_else(|| OrderView::All.as_str().to_string());

    let orders = match view.parse::<OrderView>() {
        Ok(parsed) => engine
            .orders_with_transactions(parsed)
            .into_iter()
            .map(OrderRowResponse::from)
            .collect(),
        Err(e) => {
            tracing::debug!(store_id = %store_id, "{}", e);
            Vec::new()
        }
    };

    Ok(Json(OrderListResponse {
        store_id,
        view,
        counts: engine.count_by_status(),
        orders,
    }))
}

pub async fn order_counts(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let engine = state.sessions.open(&store_id).await?;
    Ok(Json(engine.count_by_status()))
}

pub async fn update_order(
    State(state): State<AppState>,
    Path((store_id, order_id)): Path<(String, String)>,
    payload: Result<Json<OrderPatch>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(patch) = payload?;
    let engine = state.sessions.open(&store_id).await?;
    let update = engine.update_order(&order_id, patch).await?;
    Ok(Json(update))
}
