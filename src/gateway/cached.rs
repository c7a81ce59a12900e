//! Read-through cache in front of another gateway.
//! Fetches are cached per store; any mutation for a store drops that store's entries.
//! Cache failures never fail a call, they only cost a round trip.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::{Envelope, Gateway, GatewayResult, OrdersPayload, TransactionsPayload};
use crate::cache::KvCache;
use crate::domain::{Order, OrderPatch, TransactionStatusUpdate};

pub struct CachedGateway {
    inner: Arc<dyn Gateway>,
    cache: Arc<dyn KvCache>,
    ttl: Duration,
}

impl CachedGateway {
    pub fn new(inner: Arc<dyn Gateway>, cache: Arc<dyn KvCache>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    pub fn orders_key(store_id: &str) -> String {
        format!("{}:orders", store_id)
    }

    pub fn transactions_key(store_id: &str) -> String {
        format!("{}:transactions", store_id)
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<Envelope<T>> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(envelope) => {
                    tracing::debug!(key = %key, "Gateway cache hit");
                    Some(envelope)
                }
                Err(e) => {
                    tracing::warn!(key = %key, "Discarding undecodable cache entry: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key = %key, "Gateway cache read failed: {}", e);
                None
            }
        }
    }

    async fn remember<T: Serialize>(&self, key: &str, envelope: &Envelope<T>) {
        if !envelope.success {
            return;
        }
        let serialized = match serde_json::to_string(envelope) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(key = %key, "Failed to serialize gateway response for cache: {}", e);
                return;
            }
        };
        if let Err(e) = self.cache.set_ex(key, serialized, self.ttl.as_secs().max(1)).await {
            tracing::warn!(key = %key, "Gateway cache write failed: {}", e);
        }
    }

    async fn invalidate(&self, store_id: &str) {
        let keys = [Self::orders_key(store_id), Self::transactions_key(store_id)];
        if let Err(e) = self.cache.del(&keys).await {
            tracing::warn!(store_id = %store_id, "Gateway cache invalidation failed: {}", e);
        }
    }
}

#[async_trait]
impl Gateway for CachedGateway {
    async fn get_store_orders(&self, store_id: &str) -> GatewayResult<Envelope<OrdersPayload>> {
        let key = Self::orders_key(store_id);
        if let Some(hit) = self.cached(&key).await {
            return Ok(hit);
        }
        let envelope = self.inner.get_store_orders(store_id).await?;
        self.remember(&key, &envelope).await;
        Ok(envelope)
    }

    async fn update_store_order(
        &self,
        store_id: &str,
        order_id: &str,
        patch: &OrderPatch,
    ) -> GatewayResult<Envelope<Order>> {
        let result = self.inner.update_store_order(store_id, order_id, patch).await;
        self.invalidate(store_id).await;
        result
    }

    async fn get_store_transactions(
        &self,
        store_id: &str,
    ) -> GatewayResult<Envelope<TransactionsPayload>> {
        let key = Self::transactions_key(store_id);
        if let Some(hit) = self.cached(&key).await {
            return Ok(hit);
        }
        let envelope = self.inner.get_store_transactions(store_id).await?;
        self.remember(&key, &envelope).await;
        Ok(envelope)
    }

    async fn update_transaction_by_order_id(
        &self,
        store_id: &str,
        order_id: &str,
        status: TransactionStatusUpdate,
    ) -> GatewayResult<Envelope<serde_json::Value>> {
        let result = self
            .inner
            .update_transaction_by_order_id(store_id, order_id, status)
            .await;
        self.invalidate(store_id).await;
        result
    }
}
