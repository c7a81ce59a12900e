#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use storefront_core::cache::{CacheError, KvCache};
use storefront_core::domain::{
    Order, OrderPatch, OrderStatus, Transaction, TransactionStatusUpdate, REJECTED_PAYMENT_METHOD,
};
use storefront_core::gateway::{
    Envelope, Gateway, GatewayError, GatewayResult, OrdersPayload, TransactionsPayload,
};

pub const STORE: &str = "shop-1";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetOrders(String),
    UpdateOrder {
        store_id: String,
        order_id: String,
        patch: OrderPatch,
    },
    GetTransactions(String),
    UpdateTransaction {
        store_id: String,
        order_id: String,
        status: TransactionStatusUpdate,
    },
}

/// In-memory storefront. Successful updates change its data the way the real API would,
/// so a reload after a mutation observes the new state.
#[derive(Default)]
pub struct FakeGateway {
    orders: Mutex<Vec<Order>>,
    transactions: Mutex<Vec<Option<Transaction>>>,
    scripted_orders: Mutex<VecDeque<(Duration, Vec<Order>)>>,
    calls: Mutex<Vec<Call>>,
    delay: Mutex<Option<Duration>>,
    refuse_fetches: AtomicBool,
    refuse_updates: AtomicBool,
    break_transport: AtomicBool,
}

impl FakeGateway {
    pub fn new(orders: Vec<Order>, transactions: Vec<Option<Transaction>>) -> Self {
        let gateway = Self::default();
        *gateway.orders.lock().unwrap() = orders;
        *gateway.transactions.lock().unwrap() = transactions;
        gateway
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn update_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::UpdateOrder { .. } | Call::UpdateTransaction { .. }))
            .collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls().len() - self.update_calls().len()
    }

    pub fn set_orders(&self, orders: Vec<Order>) {
        *self.orders.lock().unwrap() = orders;
    }

    /// The next `get_store_orders` calls answer these, in order, after the given delay.
    pub fn script_orders(&self, delay: Duration, orders: Vec<Order>) {
        self.scripted_orders.lock().unwrap().push_back((delay, orders));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Fetches answer `success: false`.
    pub fn refuse_fetches(&self, refuse: bool) {
        self.refuse_fetches.store(refuse, Ordering::SeqCst);
    }

    /// Updates answer `success: false`.
    pub fn refuse_updates(&self, refuse: bool) {
        self.refuse_updates.store(refuse, Ordering::SeqCst);
    }

    /// Every call fails before reaching the storefront.
    pub fn break_transport(&self, broken: bool) {
        self.break_transport.store(broken, Ordering::SeqCst);
    }

    async fn enter(&self, call: Call) -> GatewayResult<()> {
        self.calls.lock().unwrap().push(call);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.break_transport.load(Ordering::SeqCst) {
            return Err(GatewayError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn get_store_orders(&self, store_id: &str) -> GatewayResult<Envelope<OrdersPayload>> {
        let scripted = self.scripted_orders.lock().unwrap().pop_front();
        self.enter(Call::GetOrders(store_id.to_string())).await?;
        if let Some((delay, orders)) = scripted {
            tokio::time::sleep(delay).await;
            return Ok(Envelope::ok(OrdersPayload { orders }));
        }
        if self.refuse_fetches.load(Ordering::SeqCst) {
            return Ok(Envelope::failure("orders unavailable"));
        }
        let orders = self.orders.lock().unwrap().clone();
        Ok(Envelope::ok(OrdersPayload { orders }))
    }

    async fn update_store_order(
        &self,
        store_id: &str,
        order_id: &str,
        patch: &OrderPatch,
    ) -> GatewayResult<Envelope<Order>> {
        self.enter(Call::UpdateOrder {
            store_id: store_id.to_string(),
            order_id: order_id.to_string(),
            patch: patch.clone(),
        })
        .await?;
        if self.refuse_updates.load(Ordering::SeqCst) {
            return Ok(Envelope::failure("order update refused"));
        }
        let mut orders = self.orders.lock().unwrap();
        match orders.iter_mut().find(|o| o.id == order_id) {
            Some(order) => {
                order.apply(patch);
                Ok(Envelope::ok(order.clone()))
            }
            None => Ok(Envelope::failure("order not found")),
        }
    }

    async fn get_store_transactions(
        &self,
        store_id: &str,
    ) -> GatewayResult<Envelope<TransactionsPayload>> {
        self.enter(Call::GetTransactions(store_id.to_string())).await?;
        if self.refuse_fetches.load(Ordering::SeqCst) {
            return Ok(Envelope::failure("transactions unavailable"));
        }
        let transactions = self.transactions.lock().unwrap().clone();
        Ok(Envelope::ok(TransactionsPayload { transactions }))
    }

    async fn update_transaction_by_order_id(
        &self,
        store_id: &str,
        order_id: &str,
        status: TransactionStatusUpdate,
    ) -> GatewayResult<Envelope<serde_json::Value>> {
        self.enter(Call::UpdateTransaction {
            store_id: store_id.to_string(),
            order_id: order_id.to_string(),
            status,
        })
        .await?;
        if self.refuse_updates.load(Ordering::SeqCst) {
            return Ok(Envelope::failure("transaction update refused"));
        }
        let mut transactions = self.transactions.lock().unwrap();
        for transaction in transactions.iter_mut().flatten() {
            if transaction.order_id.as_deref() == Some(order_id) {
                match status {
                    TransactionStatusUpdate::Confirmed => transaction.is_confirmed = true,
                    TransactionStatusUpdate::Rejected => {
                        transaction.payment_method = Some(REJECTED_PAYMENT_METHOD.to_string())
                    }
                }
            }
        }
        Ok(Envelope::ok(json!({ "orderId": order_id, "status": status })))
    }
}

/// HashMap-backed cache; expiry is not modelled.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
    broken: AtomicBool,
}

impl MemoryCache {
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.broken.load(Ordering::SeqCst) {
            Err(CacheError::Other("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KvCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check()?;
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set_ex(&self, key: &str, value: String, _ttl_secs: u64) -> Result<(), CacheError> {
        self.check()?;
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), CacheError> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

pub fn order(id: &str, status: OrderStatus) -> Order {
    serde_json::from_value(json!({
        "id": id,
        "customerName": format!("Customer {}", id),
        "customerAdds": "99 Market Street",
        "status": status.as_str(),
        "productInfo": [
            {"productId": "p1", "name": "Jasmine rice", "price": "45.50", "quantity": 2}
        ]
    }))
    .unwrap()
}

pub fn transaction(id: &str, order_id: Option<&str>, payment_method: Option<&str>, confirmed: bool) -> Transaction {
    serde_json::from_value(json!({
        "id": id,
        "orderId": order_id,
        "totalAmount": "91.00",
        "paymentMethod": payment_method,
        "isConfirmed": confirmed,
        "slip": [{
            "id": format!("slip-{}", id),
            "transDate": "2024-03-01",
            "transTime": "10:15",
            "amount": "91.00",
            "isConfirmed": false
        }]
    }))
    .unwrap()
}

pub fn pending_transfer(id: &str, order_id: &str) -> Transaction {
    transaction(id, Some(order_id), Some("TRANSFER"), false)
}
