pub mod cache;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod services;
pub mod startup;
pub mod store;
pub mod validation;

use axum::{
    http::{HeaderValue, Method},
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use crate::health::DependencyChecker;
use crate::services::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
    pub health_checkers: Arc<Vec<Arc<dyn DependencyChecker>>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(sessions: SessionRegistry, health_checkers: Vec<Arc<dyn DependencyChecker>>) -> Self {
        Self {
            sessions,
            health_checkers: Arc::new(health_checkers),
            start_time: Instant::now(),
        }
    }
}

pub fn create_app(state: AppState, cors_allowed_origins: Option<&[String]>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/stores/:store_id/orders", get(handlers::orders::list_orders))
        .route("/stores/:store_id/orders/counts", get(handlers::orders::order_counts))
        .route("/stores/:store_id/orders/:order_id", patch(handlers::orders::update_order))
        .route(
            "/stores/:store_id/transactions",
            get(handlers::transactions::list_transactions),
        )
        .route(
            "/stores/:store_id/transactions/:transaction_id/decision",
            post(handlers::transactions::stage_decision),
        )
        .route(
            "/stores/:store_id/decision",
            get(handlers::transactions::staged_decision)
                .delete(handlers::transactions::cancel_decision),
        )
        .route(
            "/stores/:store_id/decision/commit",
            post(handlers::transactions::commit_decision),
        )
        .route("/stores/:store_id/refresh", post(handlers::sessions::refresh))
        .route(
            "/stores/:store_id/session",
            axum::routing::delete(handlers::sessions::close_session),
        )
        .layer(axum::middleware::from_fn(
            middleware::request_logger_middleware,
        ))
        .layer(cors_layer(cors_allowed_origins))
        .with_state(state)
}

fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    match allowed_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                        None
                    }
                })
                .collect();
            layer.allow_origin(origins)
        }
        None => layer.allow_origin(Any),
    }
}
