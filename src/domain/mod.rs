//! Storefront domain entities, shared by the stores, the engine and the admin API.

pub mod order;
pub mod transaction;

use serde::{Deserialize, Deserializer};

pub use order::{Order, OrderPatch, OrderStatus, OrderView, ProductLine, StatusCounts, TransitionPolicy};
pub use transaction::{
    ConfirmationState, Decision, Slip, SlipAccount, SlipReceiver, SlipSender, SlipSummary,
    Transaction, TransactionStatusUpdate, TransactionView, REJECTED_PAYMENT_METHOD,
};

/// Reads an explicit `null` as the field's default, same as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
