use clap::{Args, Parser, Subcommand};

use crate::config::Config;
use crate::domain::{Decision, OrderPatch, OrderStatus, OrderView, TransactionView};
use crate::services::ReconciliationEngine;

#[derive(Parser)]
#[command(name = "storefront-core")]
#[command(about = "Storefront Core - order and payment reconciliation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Order commands
    #[command(subcommand)]
    Orders(OrderCommands),

    /// Payment transaction commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Print and validate the configuration
    Config,
}

#[derive(Args, Clone)]
pub struct StoreArg {
    /// Store to operate on
    #[arg(long = "store", env = "STORE_ID")]
    pub store_id: String,
}

#[derive(Subcommand)]
pub enum OrderCommands {
    /// List orders of one tab
    List {
        #[command(flatten)]
        store: StoreArg,
        /// waiting-payment, waiting-delivery, in-delivery or all
        #[arg(long, default_value = "all")]
        view: String,
    },

    /// Show per-status order counts
    Counts {
        #[command(flatten)]
        store: StoreArg,
    },

    /// Update an order's status or customer details
    Update {
        #[command(flatten)]
        store: StoreArg,
        #[arg(value_name = "ORDER_ID")]
        order_id: String,
        #[arg(long)]
        status: Option<OrderStatus>,
        #[arg(long)]
        customer_name: Option<String>,
        #[arg(long)]
        customer_adds: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// List transactions of one tab
    List {
        #[command(flatten)]
        store: StoreArg,
        /// not-verified or all
        #[arg(long, default_value = "not-verified")]
        view: String,
    },

    /// Accept a payment
    Accept(DecisionArgs),

    /// Reject a payment
    Reject(DecisionArgs),
}

#[derive(Args)]
pub struct DecisionArgs {
    #[command(flatten)]
    pub store: StoreArg,
    #[arg(value_name = "TRANSACTION_ID")]
    pub transaction_id: String,
    /// Send the decision; without it the decision is only shown
    #[arg(long)]
    pub yes: bool,
}

pub fn handle_orders_list(engine: &ReconciliationEngine, view: &str) -> anyhow::Result<()> {
    let view: OrderView = view.parse().map_err(anyhow::Error::msg)?;
    let rows = engine.orders_with_transactions(view);

    if rows.is_empty() {
        println!("No orders in '{}'", view.as_str());
        return Ok(());
    }

    println!(
        "{:<26} {:<18} {:<24} {:>12} {:<12}",
        "Order", "Status", "Customer", "Total", "Payment"
    );
    println!("{}", "-".repeat(96));
    for row in rows {
        let payment = match &row.transaction {
            Some(tx) => format!("{:?}", tx.confirmation_state()).to_lowercase(),
            None => "-".to_string(),
        };
        println!(
            "{:<26} {:<18} {:<24} {:>12} {:<12}",
            row.order.id,
            row.order.status,
            truncate(&row.order.customer_name, 24),
            row.total.to_string(),
            payment
        );
    }
    Ok(())
}

pub fn handle_orders_counts(engine: &ReconciliationEngine) -> anyhow::Result<()> {
    let counts = engine.count_by_status();
    println!("Waiting payment:  {}", counts.pending);
    println!("Waiting delivery: {}", counts.waiting_delivery);
    println!("In delivery:      {}", counts.in_delivery);
    println!("Other:            {}", counts.remainder());
    println!("All:              {}", counts.all);
    Ok(())
}

pub async fn handle_orders_update(
    engine: &ReconciliationEngine,
    order_id: &str,
    patch: OrderPatch,
) -> anyhow::Result<()> {
    let update = engine.update_order(order_id, patch).await?;
    tracing::info!("Order {} updated", order_id);
    println!(
        "✓ Order {} is now {} ({} waiting payment, {} waiting delivery, {} in delivery)",
        update.order.id,
        update.order.status,
        update.counts.pending,
        update.counts.waiting_delivery,
        update.counts.in_delivery
    );
    Ok(())
}

pub fn handle_tx_list(engine: &ReconciliationEngine, view: &str) -> anyhow::Result<()> {
    let view: TransactionView = view.parse().map_err(anyhow::Error::msg)?;
    let rows = engine.transactions_with_orders(view);

    if rows.is_empty() {
        println!("No transactions in '{}'", view.as_str());
        return Ok(());
    }

    println!(
        "{:<26} {:<26} {:>12} {:<12} {:<10}",
        "Transaction", "Order", "Amount", "Method", "Slips"
    );
    println!("{}", "-".repeat(90));
    for row in rows {
        let order = match &row.order {
            Ok(order) => order.id.clone(),
            Err(_) => "unknown order".to_string(),
        };
        println!(
            "{:<26} {:<26} {:>12} {:<12} {}/{}",
            row.transaction.id,
            order,
            row.transaction.total_amount.to_string(),
            row.transaction.payment_method.as_deref().unwrap_or("-"),
            row.slips.confirmed,
            row.slips.total
        );
    }

    for order_id in engine.transactions().duplicate_order_ids() {
        println!("⚠ Several transactions reference order {}", order_id);
    }
    Ok(())
}

pub async fn handle_tx_decision(
    engine: &ReconciliationEngine,
    transaction_id: &str,
    decision: Decision,
    confirmed: bool,
) -> anyhow::Result<()> {
    let staged = engine.request_decision_for(transaction_id, decision).await?;
    println!(
        "Staged {} for transaction {} (order {})",
        staged.decision, staged.transaction_id, staged.order_id
    );

    if !confirmed {
        println!("Re-run with --yes to send it");
        engine.cancel_staged().await;
        return Ok(());
    }

    let committed = engine.commit_staged(staged.stage_id).await?;
    println!(
        "✓ Transaction {} marked {}",
        committed.transaction_id, committed.status
    );
    if !committed.refreshed {
        println!("⚠ The decision was sent but reloading the store failed");
    }
    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Gateway URL: {}", config.gateway_base_url);
    println!("  Gateway Token: {}", config.masked_token());
    println!("  Gateway Timeout: {}s", config.gateway_timeout_secs);
    println!(
        "  Circuit Breaker: {} failures, {}s reset",
        config.circuit_breaker_threshold, config.circuit_breaker_reset_secs
    );
    println!(
        "  Redis URL: {}",
        config
            .redis_url
            .as_deref()
            .map(mask_password)
            .unwrap_or_else(|| "(cache disabled)".to_string())
    );
    println!("  Cache TTL: {}s", config.cache_ttl_secs);
    println!("  Transition Policy: {:?}", config.transition_policy);
    println!("  Max Sessions: {}", config.max_sessions);

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let kept: String = value.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}
