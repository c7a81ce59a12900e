//! Gateway to the upstream storefront API.
//! Every response uses the `{success, data?, message?}` envelope; `success = false`
//! is the only domain failure signal, everything else is a [`GatewayError`].

pub mod cached;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{Order, OrderPatch, Transaction, TransactionStatusUpdate};

pub use cached::CachedGateway;
pub use http::HttpGateway;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Storefront API returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid response from storefront API: {0}")]
    InvalidResponse(String),
    #[error("Invalid gateway URL: {0}")]
    InvalidUrl(String),
    #[error("Gateway call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Uniform response envelope of the storefront API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }

    /// Reason to show the user when the upstream reported failure.
    pub fn failure_reason(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "storefront API reported failure".to_string())
    }

    /// Data of a successful envelope. A success without data counts as a failure.
    pub fn into_data(self) -> Result<T, String> {
        if !self.success {
            return Err(self.failure_reason());
        }
        self.data
            .ok_or_else(|| "storefront API returned no data".to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrdersPayload {
    #[serde(default)]
    pub orders: Vec<Order>,
}

/// Upstream may send `null` entries; they are kept here and dropped by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionsPayload {
    #[serde(default)]
    pub transactions: Vec<Option<Transaction>>,
}

/// Network operations the reconciliation workflow needs from the storefront.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn get_store_orders(&self, store_id: &str) -> GatewayResult<Envelope<OrdersPayload>>;

    async fn update_store_order(
        &self,
        store_id: &str,
        order_id: &str,
        patch: &OrderPatch,
    ) -> GatewayResult<Envelope<Order>>;

    async fn get_store_transactions(
        &self,
        store_id: &str,
    ) -> GatewayResult<Envelope<TransactionsPayload>>;

    async fn update_transaction_by_order_id(
        &self,
        store_id: &str,
        order_id: &str,
        status: TransactionStatusUpdate,
    ) -> GatewayResult<Envelope<serde_json::Value>>;
}

/// Bounds a gateway call; an expired call becomes [`GatewayError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> GatewayResult<T>
where
    F: Future<Output = GatewayResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(limit)),
    }
}
