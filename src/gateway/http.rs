use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use url::Url;

use super::{
    Envelope, Gateway, GatewayError, GatewayResult, OrdersPayload, TransactionsPayload,
};
use crate::domain::{Order, OrderPatch, TransactionStatusUpdate};

const MAX_ERROR_BODY_LEN: usize = 512;

/// HTTP client for the storefront REST API
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: Url,
    token: Option<String>,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl HttpGateway {
    /// Creates a gateway with the default circuit breaker (3 failures, 60s reset)
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> GatewayResult<Self> {
        Self::with_circuit_breaker(base_url, token, timeout, 3, 60)
    }

    /// Creates a gateway with custom circuit breaker configuration
    pub fn with_circuit_breaker(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> GatewayResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| GatewayError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Ok(HttpGateway {
            client,
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
            circuit_breaker,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    /// Reachability check used by health checks and startup validation.
    pub async fn ping(&self) -> GatewayResult<()> {
        let response = self.client.get(self.base_url.clone()).send().await?;
        if response.status().is_server_error() {
            return Err(GatewayError::Status {
                status: response.status().as_u16(),
                body: String::new(),
            });
        }
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> GatewayResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute<T>(&self, request: RequestBuilder) -> GatewayResult<Envelope<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let request = self.authorize(request);
        let result = self
            .circuit_breaker
            .call(async move {
                let response = request.send().await?;
                decode_envelope::<T>(response).await
            })
            .await;

        match result {
            Ok(envelope) => Ok(envelope),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen(
                "storefront API circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

async fn decode_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
) -> GatewayResult<Envelope<T>> {
    let status = response.status();
    let body = response.text().await?;

    if status.is_server_error() {
        return Err(GatewayError::Status {
            status: status.as_u16(),
            body: truncate(body),
        });
    }

    match serde_json::from_str::<Envelope<T>>(&body) {
        // Client errors that still carry an envelope surface the upstream message.
        Ok(envelope) if status.is_success() || !envelope.success => Ok(envelope),
        Ok(_) => Err(GatewayError::Status {
            status: status.as_u16(),
            body: truncate(body),
        }),
        Err(e) if status.is_success() => Err(GatewayError::InvalidResponse(e.to_string())),
        Err(_) => Err(GatewayError::Status {
            status: status.as_u16(),
            body: truncate(body),
        }),
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY_LEN {
        let mut cut = MAX_ERROR_BODY_LEN;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn get_store_orders(&self, store_id: &str) -> GatewayResult<Envelope<OrdersPayload>> {
        let url = self.endpoint(&["stores", store_id, "orders"])?;
        self.execute(self.client.get(url)).await
    }

    async fn update_store_order(
        &self,
        store_id: &str,
        order_id: &str,
        patch: &OrderPatch,
    ) -> GatewayResult<Envelope<Order>> {
        let url = self.endpoint(&["stores", store_id, "orders", order_id])?;
        self.execute(self.client.patch(url).json(patch)).await
    }

    async fn get_store_transactions(
        &self,
        store_id: &str,
    ) -> GatewayResult<Envelope<TransactionsPayload>> {
        let url = self.endpoint(&["stores", store_id, "transactions"])?;
        self.execute(self.client.get(url)).await
    }

    async fn update_transaction_by_order_id(
        &self,
        store_id: &str,
        order_id: &str,
        status: TransactionStatusUpdate,
    ) -> GatewayResult<Envelope<serde_json::Value>> {
        let url = self.endpoint(&["stores", store_id, "transactions", "orders", order_id])?;
        let body = json!({ "status": status });
        self.execute(self.client.patch(url).json(&body)).await
    }
}
