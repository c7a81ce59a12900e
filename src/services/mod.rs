pub mod reconciliation;
pub mod sessions;

pub use reconciliation::{
    CommittedDecision, EngineSettings, OrderRow, OrderUpdate, ReconciliationEngine,
    StagedDecision, TransactionRow,
};
pub use sessions::SessionRegistry;
