use std::sync::Arc;
use std::time::Duration;

use super::{LoadOutcome, SnapshotCell};
use crate::domain::{Order, OrderPatch, OrderView, StatusCounts};
use crate::error::ReconcileError;
use crate::gateway::{with_timeout, Gateway};

/// Snapshot of a store's orders as of the last successful load.
pub struct OrderStore {
    gateway: Arc<dyn Gateway>,
    call_timeout: Duration,
    cell: SnapshotCell<Order>,
}

impl OrderStore {
    pub fn new(gateway: Arc<dyn Gateway>, call_timeout: Duration) -> Self {
        Self {
            gateway,
            call_timeout,
            cell: SnapshotCell::new(),
        }
    }

    /// Replaces the snapshot with the store's current orders.
    /// On failure the previous snapshot stays in place.
    pub async fn load(&self, store_id: &str) -> Result<LoadOutcome, ReconcileError> {
        let token = self.cell.issue_token();

        let envelope = with_timeout(self.call_timeout, self.gateway.get_store_orders(store_id))
            .await
            .map_err(|e| ReconcileError::fetch("orders", e))?;
        let orders = envelope
            .into_data()
            .map_err(|reason| ReconcileError::Fetch {
                entity: "orders",
                reason,
            })?
            .orders;

        let without_products = orders.iter().filter(|o| !o.has_products()).count();
        if without_products > 0 {
            tracing::warn!(
                store_id = %store_id,
                "{} order(s) arrived without product lines",
                without_products
            );
        }

        let count = orders.len();
        if self.cell.install(token, store_id, orders) {
            tracing::debug!(store_id = %store_id, token, "Loaded {} order(s)", count);
            Ok(LoadOutcome::Applied { token, count })
        } else {
            tracing::debug!(store_id = %store_id, token, "Discarded stale order response");
            Ok(LoadOutcome::Stale { token })
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.load().token > 0
    }

    pub fn store_id(&self) -> Option<String> {
        self.cell.load().store_id.clone()
    }

    pub fn snapshot(&self) -> Vec<Order> {
        self.cell.load().items.clone()
    }

    pub fn get(&self, order_id: &str) -> Option<Order> {
        self.cell
            .load()
            .items
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
    }

    /// Recomputed from the snapshot on every call.
    pub fn count_by_status(&self) -> StatusCounts {
        StatusCounts::from_orders(&self.cell.load().items)
    }

    pub fn filter(&self, view: OrderView) -> Vec<Order> {
        filter_orders(&self.cell.load().items, view)
    }

    /// Like [`OrderStore::filter`] but for a raw tab name; unknown names select nothing.
    pub fn filter_named(&self, view: &str) -> Vec<Order> {
        match view.parse::<OrderView>() {
            Ok(view) => self.filter(view),
            Err(e) => {
                tracing::debug!("{}", e);
                Vec::new()
            }
        }
    }

    /// Applies an already persisted patch to the local entry.
    pub(crate) fn patch_local(&self, order_id: &str, patch: &OrderPatch) -> Option<Order> {
        self.cell.update(|orders| {
            if let Some(order) = orders.iter_mut().find(|o| o.id == order_id) {
                order.apply(patch);
            }
        });
        self.get(order_id)
    }
}

pub fn filter_orders(orders: &[Order], view: OrderView) -> Vec<Order> {
    orders.iter().filter(|o| view.matches(o)).cloned().collect()
}
