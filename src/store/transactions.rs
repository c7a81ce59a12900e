use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use super::{LoadOutcome, SnapshotCell};
use crate::domain::{Transaction, TransactionView};
use crate::error::ReconcileError;
use crate::gateway::{with_timeout, Gateway};

/// Snapshot of a store's payment transactions. Null entries from upstream never make it in.
pub struct TransactionStore {
    gateway: Arc<dyn Gateway>,
    call_timeout: Duration,
    cell: SnapshotCell<Transaction>,
}

impl TransactionStore {
    pub fn new(gateway: Arc<dyn Gateway>, call_timeout: Duration) -> Self {
        Self {
            gateway,
            call_timeout,
            cell: SnapshotCell::new(),
        }
    }

    pub async fn load(&self, store_id: &str) -> Result<LoadOutcome, ReconcileError> {
        let token = self.cell.issue_token();

        let envelope =
            with_timeout(self.call_timeout, self.gateway.get_store_transactions(store_id))
                .await
                .map_err(|e| ReconcileError::fetch("transactions", e))?;
        let fetched = envelope
            .into_data()
            .map_err(|reason| ReconcileError::Fetch {
                entity: "transactions",
                reason,
            })?
            .transactions;

        let (transactions, dropped) = drop_missing(fetched);
        if dropped > 0 {
            tracing::warn!(
                store_id = %store_id,
                "Ignoring {} null transaction entr{}",
                dropped,
                if dropped == 1 { "y" } else { "ies" }
            );
        }
        for order_id in duplicate_order_ids(&transactions) {
            tracing::warn!(
                store_id = %store_id,
                order_id = %order_id,
                "Several transactions reference the same order; the last one is used"
            );
        }

        let count = transactions.len();
        if self.cell.install(token, store_id, transactions) {
            tracing::debug!(store_id = %store_id, token, "Loaded {} transaction(s)", count);
            Ok(LoadOutcome::Applied { token, count })
        } else {
            tracing::debug!(store_id = %store_id, token, "Discarded stale transaction response");
            Ok(LoadOutcome::Stale { token })
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.load().token > 0
    }

    pub fn snapshot(&self) -> Vec<Transaction> {
        self.cell.load().items.clone()
    }

    pub fn get(&self, transaction_id: &str) -> Option<Transaction> {
        self.cell
            .load()
            .items
            .iter()
            .find(|t| t.id == transaction_id)
            .cloned()
    }

    pub fn index_by_order_id(&self) -> HashMap<String, Transaction> {
        index_by_order_id(&self.cell.load().items)
    }

    pub fn duplicate_order_ids(&self) -> Vec<String> {
        duplicate_order_ids(&self.cell.load().items)
    }

    pub fn filter(&self, view: TransactionView) -> Vec<Transaction> {
        filter_transactions(&self.cell.load().items, view)
    }

    /// Unknown tab names select nothing.
    pub fn filter_named(&self, view: &str) -> Vec<Transaction> {
        match view.parse::<TransactionView>() {
            Ok(view) => self.filter(view),
            Err(e) => {
                tracing::debug!("{}", e);
                Vec::new()
            }
        }
    }
}

/// Drops null entries and reports how many there were.
pub fn drop_missing(fetched: Vec<Option<Transaction>>) -> (Vec<Transaction>, usize) {
    let total = fetched.len();
    let present: Vec<Transaction> = fetched.into_iter().flatten().collect();
    let dropped = total - present.len();
    (present, dropped)
}

/// Later transactions overwrite earlier ones for the same order.
pub fn index_by_order_id(transactions: &[Transaction]) -> HashMap<String, Transaction> {
    let mut index = HashMap::with_capacity(transactions.len());
    for transaction in transactions {
        if let Some(order_id) = &transaction.order_id {
            index.insert(order_id.clone(), transaction.clone());
        }
    }
    index
}

/// Order ids referenced by more than one transaction, in first-seen order.
pub fn duplicate_order_ids(transactions: &[Transaction]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for order_id in transactions.iter().filter_map(|t| t.order_id.as_ref()) {
        if !seen.insert(order_id) && !duplicates.contains(order_id) {
            duplicates.push(order_id.clone());
        }
    }
    duplicates
}

/// The not-verified tab lists most recent first, i.e. reversed fetch order.
pub fn filter_transactions(transactions: &[Transaction], view: TransactionView) -> Vec<Transaction> {
    let mut selected: Vec<Transaction> = transactions
        .iter()
        .filter(|t| view.matches(t))
        .cloned()
        .collect();
    if view == TransactionView::NotVerified {
        selected.reverse();
    }
    selected
}
