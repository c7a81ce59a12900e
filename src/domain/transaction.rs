//! Payment transaction domain entity.
//! A transaction points at one order and embeds the bank-transfer slips sent for it.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Payment method value the storefront writes when a payment was rejected.
pub const REJECTED_PAYMENT_METHOD: &str = "REJECTED";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlipAccount {
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlipSender {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub account: Option<SlipAccount>,
    #[serde(default)]
    pub sending_bank: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlipReceiver {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub account: Option<SlipAccount>,
    #[serde(default)]
    pub receiving_bank: Option<String>,
}

/// A single bank-transfer receipt, confirmable independently of its transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slip {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub trans_date: Option<String>,
    #[serde(default)]
    pub trans_time: Option<String>,
    #[serde(default)]
    pub sender: Option<SlipSender>,
    #[serde(default)]
    pub receiver: Option<SlipReceiver>,
    #[serde(default)]
    pub amount: Option<BigDecimal>,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub is_confirmed: bool,
}

/// Domain entity representing a payment transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub total_amount: BigDecimal,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub is_confirmed: bool,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub slip: Vec<Slip>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Where a transaction sits in the verification workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationState {
    Pending,
    Confirmed,
    Rejected,
}

impl ConfirmationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConfirmationState::Pending)
    }
}

/// Slip-level confirmation progress of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlipSummary {
    pub confirmed: usize,
    pub total: usize,
}

impl Transaction {
    pub fn is_rejected(&self) -> bool {
        self.payment_method.as_deref() == Some(REJECTED_PAYMENT_METHOD)
    }

    pub fn confirmation_state(&self) -> ConfirmationState {
        if self.is_confirmed {
            ConfirmationState::Confirmed
        } else if self.is_rejected() {
            ConfirmationState::Rejected
        } else {
            ConfirmationState::Pending
        }
    }

    /// Unconfirmed, not rejected, and with a payment method actually set.
    pub fn awaits_verification(&self) -> bool {
        !self.is_confirmed && self.payment_method.is_some() && !self.is_rejected()
    }

    pub fn slip_summary(&self) -> SlipSummary {
        SlipSummary {
            confirmed: self.slip.iter().filter(|s| s.is_confirmed).count(),
            total: self.slip.len(),
        }
    }

    /// Transaction and slip confirmation disagree.
    pub fn is_partially_confirmed(&self) -> bool {
        let summary = self.slip_summary();
        if self.is_confirmed {
            summary.confirmed < summary.total
        } else {
            summary.confirmed > 0
        }
    }
}

/// Transaction tabs offered by the verification screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionView {
    NotVerified,
    All,
}

impl TransactionView {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionView::NotVerified => "not-verified",
            TransactionView::All => "all",
        }
    }

    pub fn matches(&self, transaction: &Transaction) -> bool {
        match self {
            TransactionView::NotVerified => transaction.awaits_verification(),
            TransactionView::All => true,
        }
    }
}

impl FromStr for TransactionView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "not-verified" => Ok(TransactionView::NotVerified),
            "all" => Ok(TransactionView::All),
            other => Err(format!("unknown transaction view '{}'", other)),
        }
    }
}

/// Store owner's verdict on a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub fn status_update(&self) -> TransactionStatusUpdate {
        match self {
            Decision::Accept => TransactionStatusUpdate::Confirmed,
            Decision::Reject => TransactionStatusUpdate::Rejected,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Accept => f.write_str("accept"),
            Decision::Reject => f.write_str("reject"),
        }
    }
}

/// Status string sent to the storefront when a decision is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatusUpdate {
    Confirmed,
    Rejected,
}

impl TransactionStatusUpdate {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatusUpdate::Confirmed => "confirmed",
            TransactionStatusUpdate::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TransactionStatusUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
