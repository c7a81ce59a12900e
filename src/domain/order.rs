//! Order domain entity.
//! Framework-agnostic representation of a storefront order and its status lifecycle.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order lifecycle status as reported by the storefront API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    WaitingDelivery,
    InDelivery,
    Cancelled,
    Finished,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::WaitingDelivery,
        OrderStatus::InDelivery,
        OrderStatus::Cancelled,
        OrderStatus::Finished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::WaitingDelivery => "WAITING_DELIVERY",
            OrderStatus::InDelivery => "IN_DELIVERY",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Finished => "FINISHED",
        }
    }

    /// Terminal by convention. Only enforced under [`TransitionPolicy::ForwardOnly`].
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Finished)
    }

    // Position along the delivery path; cancellation sits outside it.
    fn progress_rank(&self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::WaitingDelivery => Some(1),
            OrderStatus::InDelivery => Some(2),
            OrderStatus::Finished => Some(3),
            OrderStatus::Cancelled => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| format!("unknown order status '{}'", s))
    }
}

/// One ordered product line. Prices are kept as decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductLine {
    pub product_id: String,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub name: String,
    pub price: BigDecimal,
    pub quantity: u32,
}

impl ProductLine {
    pub fn subtotal(&self) -> BigDecimal {
        self.price.clone() * BigDecimal::from(i64::from(self.quantity))
    }
}

/// Domain entity representing an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub customer_name: String,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub customer_adds: String,
    #[serde(default)]
    pub customer_line_id: Option<String>,
    pub status: OrderStatus,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub product_info: Vec<ProductLine>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Sum of price × quantity over all product lines. Never stored upstream.
    pub fn total(&self) -> BigDecimal {
        self.product_info
            .iter()
            .map(ProductLine::subtotal)
            .fold(BigDecimal::from(0), |acc, x| acc + x)
    }

    /// A valid order carries at least one product line.
    pub fn has_products(&self) -> bool {
        !self.product_info.is_empty()
    }

    pub fn apply(&mut self, patch: &OrderPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(name) = &patch.customer_name {
            self.customer_name = name.clone();
        }
        if let Some(adds) = &patch.customer_adds {
            self.customer_adds = adds.clone();
        }
    }
}

/// The only order fields the admin screens may change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OrderPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_adds: Option<String>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.customer_name.is_none() && self.customer_adds.is_none()
    }
}

/// Order tabs offered by the admin screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderView {
    WaitingPayment,
    WaitingDelivery,
    InDelivery,
    All,
}

impl OrderView {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderView::WaitingPayment => "waiting-payment",
            OrderView::WaitingDelivery => "waiting-delivery",
            OrderView::InDelivery => "in-delivery",
            OrderView::All => "all",
        }
    }

    /// Status selected by this view, `None` meaning no filter.
    pub fn status(&self) -> Option<OrderStatus> {
        match self {
            OrderView::WaitingPayment => Some(OrderStatus::Pending),
            OrderView::WaitingDelivery => Some(OrderStatus::WaitingDelivery),
            OrderView::InDelivery => Some(OrderStatus::InDelivery),
            OrderView::All => None,
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.status().map_or(true, |status| order.status == status)
    }
}

impl FromStr for OrderView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "waiting-payment" => Ok(OrderView::WaitingPayment),
            "waiting-delivery" => Ok(OrderView::WaitingDelivery),
            "in-delivery" => Ok(OrderView::InDelivery),
            "all" => Ok(OrderView::All),
            other => Err(format!("unknown order view '{}'", other)),
        }
    }
}

/// Per-status counts shown on the order tabs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: usize,
    pub waiting_delivery: usize,
    pub in_delivery: usize,
    pub all: usize,
}

impl StatusCounts {
    pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Self {
        let mut counts = StatusCounts::default();
        for order in orders {
            counts.all += 1;
            match order.status {
                OrderStatus::Pending => counts.pending += 1,
                OrderStatus::WaitingDelivery => counts.waiting_delivery += 1,
                OrderStatus::InDelivery => counts.in_delivery += 1,
                OrderStatus::Cancelled | OrderStatus::Finished => {}
            }
        }
        counts
    }

    /// Orders outside the three named buckets (cancelled and finished).
    pub fn remainder(&self) -> usize {
        self.all - self.pending - self.waiting_delivery - self.in_delivery
    }
}

/// Which status changes `update_order` accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransitionPolicy {
    /// Any status may be set to any other status.
    #[default]
    Permissive,
    /// Cancelled and finished orders are frozen and delivery progress never moves back.
    ForwardOnly,
}

impl TransitionPolicy {
    pub fn allows(&self, from: OrderStatus, to: OrderStatus) -> bool {
        match self {
            TransitionPolicy::Permissive => true,
            TransitionPolicy::ForwardOnly => {
                if from == to {
                    return true;
                }
                if from.is_terminal() {
                    return false;
                }
                match (from.progress_rank(), to.progress_rank()) {
                    (_, None) => true,
                    (Some(current), Some(next)) => next > current,
                    (None, Some(_)) => false,
                }
            }
        }
    }
}

impl FromStr for TransitionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(TransitionPolicy::Permissive),
            "forward-only" | "forward_only" => Ok(TransitionPolicy::ForwardOnly),
            other => Err(format!(
                "unknown transition policy '{}', expected 'permissive' or 'forward-only'",
                other
            )),
        }
    }
}
