use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::ConfirmationState;
use crate::validation::ValidationError;

/// Failures of the reconciliation workflow. None of them is fatal; the worst case is a
/// stale view that the next load repairs.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Failed to load {entity}: {reason}")]
    Fetch { entity: &'static str, reason: String },

    #[error("Failed to update {entity}: {reason}")]
    Update { entity: &'static str, reason: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Order {0} is not in the current snapshot")]
    UnknownOrder(String),

    #[error("Transaction {0} is not in the current snapshot")]
    UnknownTransaction(String),

    #[error("Transaction {0} has no order reference")]
    MissingOrderReference(String),

    #[error("Transaction {transaction_id} is already {state:?}")]
    AlreadyDecided {
        transaction_id: String,
        state: ConfirmationState,
    },

    #[error("No decision is staged")]
    NothingStaged,

    #[error("Staged decision {expected} was replaced by {actual}")]
    StageMismatch { expected: Uuid, actual: Uuid },
}

impl ReconcileError {
    pub fn fetch(entity: &'static str, err: impl fmt::Display) -> Self {
        ReconcileError::Fetch {
            entity,
            reason: err.to_string(),
        }
    }

    pub fn update(entity: &'static str, err: impl fmt::Display) -> Self {
        ReconcileError::Update {
            entity,
            reason: err.to_string(),
        }
    }
}

/// A transaction whose order is not part of the current order snapshot.
/// Rendered with a placeholder instead of being dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "transaction {transaction_id} references unknown order {}",
    .order_id.as_deref().unwrap_or("<none>")
)]
pub struct InconsistentReference {
    pub transaction_id: String,
    pub order_id: Option<String>,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        let message = err.to_string();
        match err {
            ReconcileError::Fetch { .. } | ReconcileError::Update { .. } => {
                AppError::Upstream(message)
            }
            ReconcileError::Validation(_) => AppError::Validation(message),
            ReconcileError::UnknownOrder(_) | ReconcileError::UnknownTransaction(_) => {
                AppError::NotFound(message)
            }
            ReconcileError::MissingOrderReference(_) => AppError::Validation(message),
            ReconcileError::AlreadyDecided { .. }
            | ReconcileError::NothingStaged
            | ReconcileError::StageMismatch { .. } => AppError::Conflict(message),
        }
    }
}

/// Request bodies that are well-formed JSON but do not fit the expected shape are 422s,
/// anything else wrong with the body is a 400.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => AppError::Validation(e.body_text()),
            other => AppError::BadRequest(other.body_text()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
