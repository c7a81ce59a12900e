//! Order and transaction reconciliation for one store.
//!
//! Payment decisions go through two steps: `request_transaction_decision` stages a
//! decision, `commit_transaction_decision` sends it. The slot holds a single decision and
//! staging again replaces it. After a committed decision both snapshots are re-fetched
//! rather than patched locally.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    ConfirmationState, Decision, Order, OrderPatch, OrderStatus, OrderView, SlipSummary,
    StatusCounts, Transaction, TransactionStatusUpdate, TransactionView, TransitionPolicy,
};
use crate::error::{InconsistentReference, ReconcileError};
use crate::gateway::{with_timeout, Gateway};
use crate::store::{LoadOutcome, OrderStore, TransactionStore};
use crate::validation::{validate_order_patch, ValidationError};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub call_timeout: Duration,
    pub transition_policy: TransitionPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            transition_policy: TransitionPolicy::Permissive,
        }
    }
}

/// An accept/reject choice waiting for explicit confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedDecision {
    pub stage_id: Uuid,
    pub transaction_id: String,
    pub order_id: String,
    pub decision: Decision,
    pub staged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedDecision {
    pub stage_id: Uuid,
    pub transaction_id: String,
    pub order_id: String,
    pub status: TransactionStatusUpdate,
    /// False when the decision went through but the follow-up reload did not.
    pub refreshed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    pub order: Order,
    pub counts: StatusCounts,
}

/// A transaction joined with its order.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRow {
    pub transaction: Transaction,
    pub confirmation: ConfirmationState,
    pub slips: SlipSummary,
    pub order: Result<Order, InconsistentReference>,
}

/// An order joined with its transaction and the statuses it may move to.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRow {
    pub order: Order,
    pub total: bigdecimal::BigDecimal,
    pub transaction: Option<Transaction>,
    pub next_statuses: Vec<OrderStatus>,
}

pub struct ReconciliationEngine {
    store_id: String,
    gateway: Arc<dyn Gateway>,
    settings: EngineSettings,
    orders: OrderStore,
    transactions: TransactionStore,
    staged: Mutex<Option<StagedDecision>>,
}

impl ReconciliationEngine {
    pub fn new(store_id: impl Into<String>, gateway: Arc<dyn Gateway>, settings: EngineSettings) -> Self {
        Self {
            store_id: store_id.into(),
            orders: OrderStore::new(gateway.clone(), settings.call_timeout),
            transactions: TransactionStore::new(gateway.clone(), settings.call_timeout),
            gateway,
            settings,
            staged: Mutex::new(None),
        }
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    pub fn orders(&self) -> &OrderStore {
        &self.orders
    }

    pub fn transactions(&self) -> &TransactionStore {
        &self.transactions
    }

    /// Loads both snapshots concurrently. Either failure is reported; the other
    /// snapshot may still have been refreshed.
    pub async fn reload(&self) -> Result<(LoadOutcome, LoadOutcome), ReconcileError> {
        let (orders, transactions) = tokio::join!(
            self.orders.load(&self.store_id),
            self.transactions.load(&self.store_id)
        );
        Ok((orders?, transactions?))
    }

    pub fn count_by_status(&self) -> StatusCounts {
        self.orders.count_by_status()
    }

    /// Statuses an order may be moved to under the configured policy.
    pub fn valid_transitions(&self, order: &Order) -> Vec<OrderStatus> {
        OrderStatus::ALL
            .into_iter()
            .filter(|next| *next != order.status)
            .filter(|next| self.settings.transition_policy.allows(order.status, *next))
            .collect()
    }

    pub fn orders_with_transactions(&self, view: OrderView) -> Vec<OrderRow> {
        let index = self.transactions.index_by_order_id();
        self.orders
            .filter(view)
            .into_iter()
            .map(|order| self.order_row(order, &index))
            .collect()
    }

    pub fn transactions_with_orders(&self, view: TransactionView) -> Vec<TransactionRow> {
        let orders: HashMap<String, Order> = self
            .orders
            .snapshot()
            .into_iter()
            .map(|o| (o.id.clone(), o))
            .collect();

        self.transactions
            .filter(view)
            .into_iter()
            .map(|transaction| {
                let order = transaction
                    .order_id
                    .as_ref()
                    .and_then(|id| orders.get(id).cloned())
                    .ok_or_else(|| InconsistentReference {
                        transaction_id: transaction.id.clone(),
                        order_id: transaction.order_id.clone(),
                    });
                if let Err(missing) = &order {
                    tracing::warn!(store_id = %self.store_id, "{}", missing);
                }
                TransactionRow {
                    confirmation: transaction.confirmation_state(),
                    slips: transaction.slip_summary(),
                    transaction,
                    order,
                }
            })
            .collect()
    }

    fn order_row(&self, order: Order, index: &HashMap<String, Transaction>) -> OrderRow {
        OrderRow {
            total: order.total(),
            transaction: index.get(&order.id).cloned(),
            next_statuses: self.valid_transitions(&order),
            order,
        }
    }

    /// Stages a decision for `transaction`, replacing any staged one.
    pub async fn request_transaction_decision(
        &self,
        transaction: &Transaction,
        decision: Decision,
    ) -> Result<StagedDecision, ReconcileError> {
        let state = transaction.confirmation_state();
        if state.is_terminal() {
            return Err(ReconcileError::AlreadyDecided {
                transaction_id: transaction.id.clone(),
                state,
            });
        }
        let order_id = transaction
            .order_id
            .clone()
            .ok_or_else(|| ReconcileError::MissingOrderReference(transaction.id.clone()))?;
        if self.orders.get(&order_id).is_none() {
            tracing::warn!(
                store_id = %self.store_id,
                transaction_id = %transaction.id,
                order_id = %order_id,
                "Staging a decision for a transaction whose order is not loaded"
            );
        }

        let staged = StagedDecision {
            stage_id: Uuid::new_v4(),
            transaction_id: transaction.id.clone(),
            order_id,
            decision,
            staged_at: Utc::now(),
        };

        let mut slot = self.staged.lock().await;
        if let Some(replaced) = slot.replace(staged.clone()) {
            tracing::info!(
                store_id = %self.store_id,
                "Staged {} for transaction {} replaces {} for transaction {}",
                staged.decision,
                staged.transaction_id,
                replaced.decision,
                replaced.transaction_id
            );
        } else {
            tracing::info!(
                store_id = %self.store_id,
                "Staged {} for transaction {}",
                staged.decision,
                staged.transaction_id
            );
        }
        Ok(staged)
    }

    /// Looks the transaction up in the current snapshot, then stages the decision.
    pub async fn request_decision_for(
        &self,
        transaction_id: &str,
        decision: Decision,
    ) -> Result<StagedDecision, ReconcileError> {
        let transaction = self
            .transactions
            .get(transaction_id)
            .ok_or_else(|| ReconcileError::UnknownTransaction(transaction_id.to_string()))?;
        self.request_transaction_decision(&transaction, decision).await
    }

    pub async fn staged(&self) -> Option<StagedDecision> {
        self.staged.lock().await.clone()
    }

    pub async fn cancel_staged(&self) -> Option<StagedDecision> {
        let cancelled = self.staged.lock().await.take();
        if let Some(stage) = &cancelled {
            tracing::info!(
                store_id = %self.store_id,
                "Cancelled staged {} for transaction {}",
                stage.decision,
                stage.transaction_id
            );
        }
        cancelled
    }

    /// Sends whatever decision is staged.
    pub async fn commit_transaction_decision(&self) -> Result<CommittedDecision, ReconcileError> {
        self.commit(None).await
    }

    /// Sends the staged decision only if it is still the one identified by `stage_id`.
    pub async fn commit_staged(&self, stage_id: Uuid) -> Result<CommittedDecision, ReconcileError> {
        self.commit(Some(stage_id)).await
    }

    async fn commit(&self, expected: Option<Uuid>) -> Result<CommittedDecision, ReconcileError> {
        let staged = {
            let mut slot = self.staged.lock().await;
            match (slot.as_ref(), expected) {
                (None, _) => return Err(ReconcileError::NothingStaged),
                (Some(current), Some(expected)) if current.stage_id != expected => {
                    return Err(ReconcileError::StageMismatch {
                        expected,
                        actual: current.stage_id,
                    });
                }
                _ => {}
            }
            slot.take().ok_or(ReconcileError::NothingStaged)?
        };

        let status = staged.decision.status_update();
        let envelope = with_timeout(
            self.settings.call_timeout,
            self.gateway
                .update_transaction_by_order_id(&self.store_id, &staged.order_id, status),
        )
        .await
        .map_err(|e| ReconcileError::update("transaction", e))?;

        if !envelope.success {
            return Err(ReconcileError::Update {
                entity: "transaction",
                reason: envelope.failure_reason(),
            });
        }

        tracing::info!(
            store_id = %self.store_id,
            order_id = %staged.order_id,
            "Transaction {} marked {}",
            staged.transaction_id,
            status
        );

        let refreshed = match self.reload().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(store_id = %self.store_id, "Reload after decision failed: {}", e);
                false
            }
        };

        Ok(CommittedDecision {
            stage_id: staged.stage_id,
            transaction_id: staged.transaction_id,
            order_id: staged.order_id,
            status,
            refreshed,
        })
    }

    /// Validates and sends an order patch, then mirrors it into the local snapshot.
    pub async fn update_order(
        &self,
        order_id: &str,
        patch: OrderPatch,
    ) -> Result<OrderUpdate, ReconcileError> {
        let patch = validate_order_patch(&patch)?;
        let current = self
            .orders
            .get(order_id)
            .ok_or_else(|| ReconcileError::UnknownOrder(order_id.to_string()))?;

        if let Some(next) = patch.status {
            if !self.settings.transition_policy.allows(current.status, next) {
                return Err(ValidationError::new(
                    "status",
                    format!("cannot move order from {} to {}", current.status, next),
                )
                .into());
            }
        }

        let envelope = with_timeout(
            self.settings.call_timeout,
            self.gateway.update_store_order(&self.store_id, order_id, &patch),
        )
        .await
        .map_err(|e| ReconcileError::update("order", e))?;

        if !envelope.success {
            return Err(ReconcileError::Update {
                entity: "order",
                reason: envelope.failure_reason(),
            });
        }

        let order = self.orders.patch_local(order_id, &patch).unwrap_or_else(|| {
            let mut order = current;
            order.apply(&patch);
            order
        });

        tracing::info!(
            store_id = %self.store_id,
            order_id = %order_id,
            "Order updated, status {}",
            order.status
        );

        Ok(OrderUpdate {
            order,
            counts: self.orders.count_by_status(),
        })
    }
}
