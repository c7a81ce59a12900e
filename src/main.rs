use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use storefront_core::cache::RedisCache;
use storefront_core::cli::{self, Cli, Commands, OrderCommands, TxCommands};
use storefront_core::config::{Config, LogFormat};
use storefront_core::domain::{Decision, OrderPatch};
use storefront_core::gateway::{CachedGateway, Gateway, HttpGateway};
use storefront_core::health::{DependencyChecker, GatewayChecker, RedisChecker};
use storefront_core::services::{ReconciliationEngine, SessionRegistry};
use storefront_core::startup;
use storefront_core::{create_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    init_tracing(config.log_format);

    match cli.command {
        None | Some(Commands::Serve) => serve(config).await,
        Some(Commands::Config) => {
            cli::handle_config_validate(&config)?;
            let report = startup::validate_environment(&config).await;
            report.print();
            if !report.is_valid() {
                anyhow::bail!("Configuration validation failed");
            }
            Ok(())
        }
        Some(Commands::Orders(command)) => {
            let (gateway, _) = build_gateway(&config)?;
            match command {
                OrderCommands::List { store, view } => {
                    let engine = open_engine(&config, gateway, &store.store_id).await?;
                    cli::handle_orders_list(&engine, &view)
                }
                OrderCommands::Counts { store } => {
                    let engine = open_engine(&config, gateway, &store.store_id).await?;
                    cli::handle_orders_counts(&engine)
                }
                OrderCommands::Update {
                    store,
                    order_id,
                    status,
                    customer_name,
                    customer_adds,
                } => {
                    let engine = open_engine(&config, gateway, &store.store_id).await?;
                    let patch = OrderPatch {
                        status,
                        customer_name,
                        customer_adds,
                    };
                    cli::handle_orders_update(&engine, &order_id, patch).await
                }
            }
        }
        Some(Commands::Tx(command)) => {
            let (gateway, _) = build_gateway(&config)?;
            match command {
                TxCommands::List { store, view } => {
                    let engine = open_engine(&config, gateway, &store.store_id).await?;
                    cli::handle_tx_list(&engine, &view)
                }
                TxCommands::Accept(args) => {
                    let engine = open_engine(&config, gateway, &args.store.store_id).await?;
                    cli::handle_tx_decision(&engine, &args.transaction_id, Decision::Accept, args.yes)
                        .await
                }
                TxCommands::Reject(args) => {
                    let engine = open_engine(&config, gateway, &args.store.store_id).await?;
                    cli::handle_tx_decision(&engine, &args.transaction_id, Decision::Reject, args.yes)
                        .await
                }
            }
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// The HTTP gateway, wrapped in the Redis read-through cache when `REDIS_URL` is set.
fn build_gateway(config: &Config) -> anyhow::Result<(Arc<dyn Gateway>, Vec<Arc<dyn DependencyChecker>>)> {
    let http = HttpGateway::with_circuit_breaker(
        &config.gateway_base_url,
        config.gateway_token.clone(),
        config.gateway_timeout(),
        config.circuit_breaker_threshold,
        config.circuit_breaker_reset_secs,
    )?;
    tracing::info!("Storefront gateway initialized with URL: {}", http.base_url());

    let mut checkers: Vec<Arc<dyn DependencyChecker>> =
        vec![Arc::new(GatewayChecker::new(http.clone()))];

    let gateway: Arc<dyn Gateway> = match &config.redis_url {
        Some(redis_url) => {
            let cache = RedisCache::new(redis_url)?;
            checkers.push(Arc::new(RedisChecker::new(cache.clone())));
            tracing::info!("Response cache enabled, ttl {}s", config.cache_ttl_secs);
            Arc::new(CachedGateway::new(
                Arc::new(http),
                Arc::new(cache),
                config.cache_ttl(),
            ))
        }
        None => Arc::new(http),
    };

    Ok((gateway, checkers))
}

async fn open_engine(
    config: &Config,
    gateway: Arc<dyn Gateway>,
    store_id: &str,
) -> anyhow::Result<ReconciliationEngine> {
    storefront_core::validation::validate_identifier("store", store_id)?;
    let engine = ReconciliationEngine::new(store_id, gateway, config.engine_settings());
    engine.reload().await?;
    Ok(engine)
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let (gateway, checkers) = build_gateway(&config)?;
    let sessions =
        SessionRegistry::with_capacity(gateway, config.engine_settings(), config.max_sessions);
    let state = AppState::new(sessions, checkers);

    let app = create_app(state, config.cors_allowed_origins.as_deref());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
