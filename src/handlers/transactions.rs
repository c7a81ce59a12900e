use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ViewQuery;
use crate::domain::{ConfirmationState, Decision, Order, SlipSummary, Transaction, TransactionView};
use crate::error::AppError;
use crate::services::{StagedDecision, TransactionRow};
use crate::AppState;

/// A transaction with its order, or the reason the order could not be resolved.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRowResponse {
    pub transaction: Transaction,
    pub confirmation: ConfirmationState,
    pub slips: SlipSummary,
    pub order: Option<Order>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_error: Option<String>,
}

impl From<TransactionRow> for TransactionRowResponse {
    fn from(row: TransactionRow) -> Self {
        let (order, reference_error) = match row.order {
            Ok(order) => (Some(order), None),
            Err(missing) => (None, Some(missing.to_string())),
        };
        Self {
            transaction: row.transaction,
            confirmation: row.confirmation,
            slips: row.slips,
            order,
            reference_error,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionListResponse {
    pub store_id: String,
    pub view: String,
    pub duplicate_order_ids: Vec<String>,
    pub transactions: Vec<TransactionRowResponse>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: Decision,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommitRequest {
    #[serde(default, alias = "stageId")]
    pub stage_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct StagedResponse {
    pub staged: Option<StagedDecision>,
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
    Query(query): Query<ViewQuery>,
) -> Result<impl IntoResponse, AppError> {
    let engine = state.sessions.open(&store_id).await?;
    let view = query
        .view
        .unwrap_or_else(|| TransactionView::NotVerified.as_str().to_string());

    let transactions = match view.parse::<TransactionView>() {
        Ok(parsed) => engine
            .transactions_with_orders(parsed)
            .into_iter()
            .map(TransactionRowResponse::from)
            .collect(),
        Err(e) => {
            tracing::debug!(store_id = %store_id, "{}", e);
            Vec::new()
        }
    };

    Ok(Json(TransactionListResponse {
        store_id,
        view,
        duplicate_order_ids: engine.transactions().duplicate_order_ids(),
        transactions,
    }))
}

pub async fn stage_decision(
    State(state): State<AppState>,
    Path((store_id, transaction_id)): Path<(String, String)>,
    payload: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let engine = state.sessions.open(&store_id).await?;
    let staged = engine
        .request_decision_for(&transaction_id, request.decision)
        .await?;
    Ok(Json(staged))
}

pub async fn staged_decision(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let engine = state.sessions.open(&store_id).await?;
    Ok(Json(StagedResponse {
        staged: engine.staged().await,
    }))
}

pub async fn cancel_decision(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let engine = state.sessions.open(&store_id).await?;
    Ok(Json(StagedResponse {
        staged: engine.cancel_staged().await,
    }))
}

/// Commits the staged decision. Without a stage id, or without a body at all, whatever
/// is staged is sent.
pub async fn commit_decision(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
    payload: Result<Json<CommitRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => CommitRequest::default(),
        Err(rejection) => return Err(rejection.into()),
    };
    let engine = state.sessions.open(&store_id).await?;

    let committed = match request.stage_id {
        Some(stage_id) => engine.commit_staged(stage_id).await?,
        None => engine.commit_transaction_decision().await?,
    };
    Ok(Json(committed))
}
