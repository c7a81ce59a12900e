//! In-memory snapshots of a store's orders and transactions.
//!
//! A snapshot is only ever replaced as a whole. Each load takes a request token from a
//! monotonic counter; when its response arrives it is installed only if no response of a
//! newer load has been installed already, otherwise it is discarded as stale. A local
//! patch takes a token of its own, so a load issued before it cannot overwrite it.

pub mod orders;
pub mod transactions;

use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub use orders::OrderStore;
pub use transactions::TransactionStore;

/// What happened to a load whose gateway call succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum LoadOutcome {
    Applied { token: u64, count: usize },
    /// A newer load or local patch landed first; this response was dropped.
    Stale { token: u64 },
}

impl LoadOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, LoadOutcome::Applied { .. })
    }
}

#[derive(Debug)]
pub(crate) struct Snapshot<T> {
    pub(crate) token: u64,
    pub(crate) store_id: Option<String>,
    pub(crate) items: Vec<T>,
}

pub(crate) struct SnapshotCell<T> {
    current: ArcSwap<Snapshot<T>>,
    issued: AtomicU64,
}

impl<T: Clone> SnapshotCell<T> {
    pub(crate) fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot {
                token: 0,
                store_id: None,
                items: Vec::new(),
            }),
            issued: AtomicU64::new(0),
        }
    }

    pub(crate) fn issue_token(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn load(&self) -> Arc<Snapshot<T>> {
        self.current.load_full()
    }

    /// Swaps in a freshly fetched snapshot unless a newer one is already installed.
    pub(crate) fn install(&self, token: u64, store_id: &str, items: Vec<T>) -> bool {
        let fresh = Arc::new(Snapshot {
            token,
            store_id: Some(store_id.to_string()),
            items,
        });
        let previous = self.current.rcu(|current| {
            if current.token > token {
                Arc::clone(current)
            } else {
                Arc::clone(&fresh)
            }
        });
        previous.token <= token
    }

    /// Rewrites the items of the current snapshot under a freshly issued token.
    pub(crate) fn update<F>(&self, f: F) -> u64
    where
        F: Fn(&mut Vec<T>),
    {
        let token = self.issue_token();
        let previous = self.current.rcu(|current| {
            let mut items = current.items.clone();
            f(&mut items);
            Snapshot {
                token: current.token.max(token),
                store_id: current.store_id.clone(),
                items,
            }
        });
        previous.token.max(token)
    }
}
