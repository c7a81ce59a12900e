mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{order, pending_transfer, transaction, Call, FakeGateway, STORE};
use storefront_core::domain::{
    ConfirmationState, Decision, OrderPatch, OrderStatus, OrderView, TransactionStatusUpdate,
    TransactionView, TransitionPolicy,
};
use storefront_core::error::ReconcileError;
use storefront_core::services::{EngineSettings, ReconciliationEngine, SessionRegistry};

async fn engine_with(gateway: Arc<FakeGateway>, settings: EngineSettings) -> ReconciliationEngine {
    let engine = ReconciliationEngine::new(STORE, gateway, settings);
    engine.reload().await.unwrap();
    engine
}

async fn engine(gateway: Arc<FakeGateway>) -> ReconciliationEngine {
    engine_with(gateway, EngineSettings::default()).await
}

fn transaction_ids(engine: &ReconciliationEngine, view: TransactionView) -> Vec<String> {
    engine
        .transactions()
        .filter(view)
        .into_iter()
        .map(|t| t.id)
        .collect()
}

#[tokio::test]
async fn test_accepting_a_transfer_confirms_it_and_reloads() {
    let gateway = Arc::new(FakeGateway::new(
        vec![order("o1", OrderStatus::Pending)],
        vec![Some(pending_transfer("t1", "o1"))],
    ));
    let engine = engine(gateway.clone()).await;
    assert_eq!(transaction_ids(&engine, TransactionView::NotVerified), vec!["t1"]);

    let staged = engine.request_decision_for("t1", Decision::Accept).await.unwrap();
    assert_eq!(staged.order_id, "o1");
    assert_eq!(gateway.fetch_count(), 2);

    let committed = engine.commit_transaction_decision().await.unwrap();
    assert_eq!(committed.status, TransactionStatusUpdate::Confirmed);
    assert!(committed.refreshed);

    assert_eq!(
        gateway.update_calls(),
        vec![Call::UpdateTransaction {
            store_id: STORE.to_string(),
            order_id: "o1".to_string(),
            status: TransactionStatusUpdate::Confirmed,
        }]
    );
    // Both stores fetched again after the decision
    assert_eq!(gateway.fetch_count(), 4);
    assert!(transaction_ids(&engine, TransactionView::NotVerified).is_empty());
    assert_eq!(
        engine.transactions().get("t1").unwrap().confirmation_state(),
        ConfirmationState::Confirmed
    );
    assert!(engine.staged().await.is_none());
}

#[tokio::test]
async fn test_finished_order_is_listed_under_all() {
    let gateway = Arc::new(FakeGateway::new(vec![order("o2", OrderStatus::Finished)], vec![]));
    let engine = engine(gateway).await;

    let all: Vec<String> = engine.orders().filter(OrderView::All).into_iter().map(|o| o.id).collect();
    assert_eq!(all, vec!["o2"]);
    assert!(engine.orders().filter(OrderView::WaitingPayment).is_empty());

    let counts = engine.count_by_status();
    assert_eq!(counts.all, 1);
    assert_eq!(counts.remainder(), 1);
}

#[tokio::test]
async fn test_null_transactions_never_reach_the_index() {
    let gateway = Arc::new(FakeGateway::new(
        vec![],
        vec![None, Some(pending_transfer("t2", "o3"))],
    ));
    let engine = engine(gateway).await;

    let index = engine.transactions().index_by_order_id();
    assert_eq!(index.len(), 1);
    assert_eq!(index["o3"].id, "t2");
    assert_eq!(engine.transactions().snapshot().len(), 1);
}

#[tokio::test]
async fn test_second_staged_decision_replaces_the_first() {
    let gateway = Arc::new(FakeGateway::new(
        vec![order("o1", OrderStatus::Pending), order("o2", OrderStatus::Pending)],
        vec![Some(pending_transfer("t1", "o1")), Some(pending_transfer("t2", "o2"))],
    ));
    let engine = engine(gateway.clone()).await;

    engine.request_decision_for("t1", Decision::Accept).await.unwrap();
    engine.request_decision_for("t2", Decision::Reject).await.unwrap();
    engine.commit_transaction_decision().await.unwrap();

    assert_eq!(
        gateway.update_calls(),
        vec![Call::UpdateTransaction {
            store_id: STORE.to_string(),
            order_id: "o2".to_string(),
            status: TransactionStatusUpdate::Rejected,
        }]
    );
    assert_eq!(
        engine.transactions().get("t2").unwrap().confirmation_state(),
        ConfirmationState::Rejected
    );
    assert_eq!(
        engine.transactions().get("t1").unwrap().confirmation_state(),
        ConfirmationState::Pending
    );
}

#[tokio::test]
async fn test_commit_with_replaced_stage_id_is_refused() {
    let gateway = Arc::new(FakeGateway::new(
        vec![order("o1", OrderStatus::Pending), order("o2", OrderStatus::Pending)],
        vec![Some(pending_transfer("t1", "o1")), Some(pending_transfer("t2", "o2"))],
    ));
    let engine = engine(gateway.clone()).await;

    let first = engine.request_decision_for("t1", Decision::Accept).await.unwrap();
    let second = engine.request_decision_for("t2", Decision::Accept).await.unwrap();

    let err = engine.commit_staged(first.stage_id).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::StageMismatch { expected, actual }
            if expected == first.stage_id && actual == second.stage_id
    ));
    assert!(gateway.update_calls().is_empty());
    assert_eq!(engine.staged().await, Some(second.clone()));

    engine.commit_staged(second.stage_id).await.unwrap();
    assert_eq!(gateway.update_calls().len(), 1);
}

#[tokio::test]
async fn test_commit_without_stage_fails() {
    let gateway = Arc::new(FakeGateway::new(vec![], vec![]));
    let engine = engine(gateway.clone()).await;

    let err = engine.commit_transaction_decision().await.unwrap_err();
    assert!(matches!(err, ReconcileError::NothingStaged));
    assert!(gateway.update_calls().is_empty());
}

#[tokio::test]
async fn test_cancelled_stage_is_not_committed() {
    let gateway = Arc::new(FakeGateway::new(
        vec![order("o1", OrderStatus::Pending)],
        vec![Some(pending_transfer("t1", "o1"))],
    ));
    let engine = engine(gateway.clone()).await;

    engine.request_decision_for("t1", Decision::Reject).await.unwrap();
    let cancelled = engine.cancel_staged().await.unwrap();
    assert_eq!(cancelled.transaction_id, "t1");

    assert!(matches!(
        engine.commit_transaction_decision().await,
        Err(ReconcileError::NothingStaged)
    ));
    assert!(gateway.update_calls().is_empty());
}

#[tokio::test]
async fn test_refused_decision_changes_nothing_locally() {
    let gateway = Arc::new(FakeGateway::new(
        vec![order("o1", OrderStatus::Pending)],
        vec![Some(pending_transfer("t1", "o1"))],
    ));
    let engine = engine(gateway.clone()).await;
    gateway.refuse_updates(true);

    engine.request_decision_for("t1", Decision::Accept).await.unwrap();
    let err = engine.commit_transaction_decision().await.unwrap_err();

    match err {
        ReconcileError::Update { entity, reason } => {
            assert_eq!(entity, "transaction");
            assert_eq!(reason, "transaction update refused");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    // No reload and the slot was cleared before the call
    assert_eq!(gateway.fetch_count(), 2);
    assert!(engine.staged().await.is_none());
    assert_eq!(transaction_ids(&engine, TransactionView::NotVerified), vec!["t1"]);
}

#[tokio::test]
async fn test_terminal_transactions_cannot_be_staged() {
    let gateway = Arc::new(FakeGateway::new(
        vec![order("o1", OrderStatus::Pending), order("o2", OrderStatus::Pending)],
        vec![
            Some(transaction("confirmed", Some("o1"), Some("TRANSFER"), true)),
            Some(transaction("rejected", Some("o2"), Some("REJECTED"), false)),
            Some(transaction("orphan", None, Some("TRANSFER"), false)),
        ],
    ));
    let engine = engine(gateway).await;

    assert!(matches!(
        engine.request_decision_for("confirmed", Decision::Reject).await,
        Err(ReconcileError::AlreadyDecided { state: ConfirmationState::Confirmed, .. })
    ));
    assert!(matches!(
        engine.request_decision_for("rejected", Decision::Accept).await,
        Err(ReconcileError::AlreadyDecided { state: ConfirmationState::Rejected, .. })
    ));
    assert!(matches!(
        engine.request_decision_for("orphan", Decision::Accept).await,
        Err(ReconcileError::MissingOrderReference(id)) if id == "orphan"
    ));
    assert!(matches!(
        engine.request_decision_for("missing", Decision::Accept).await,
        Err(ReconcileError::UnknownTransaction(_))
    ));
    assert!(engine.staged().await.is_none());
}

#[tokio::test]
async fn test_update_order_patches_snapshot_and_recounts() {
    let gateway = Arc::new(FakeGateway::new(
        vec![order("o1", OrderStatus::Pending), order("o2", OrderStatus::Pending)],
        vec![],
    ));
    let engine = engine(gateway.clone()).await;

    let update = engine
        .update_order("o1", OrderPatch::status(OrderStatus::WaitingDelivery))
        .await
        .unwrap();

    assert_eq!(update.order.status, OrderStatus::WaitingDelivery);
    assert_eq!(update.counts.pending, 1);
    assert_eq!(update.counts.waiting_delivery, 1);
    assert_eq!(engine.orders().get("o1").unwrap().status, OrderStatus::WaitingDelivery);
    // Patched locally, not re-fetched
    assert_eq!(gateway.fetch_count(), 2);
}

#[tokio::test]
async fn test_update_order_trims_customer_fields_before_sending() {
    let gateway = Arc::new(FakeGateway::new(vec![order("o1", OrderStatus::Pending)], vec![]));
    let engine = engine(gateway.clone()).await;

    let patch = OrderPatch {
        customer_name: Some("  Somchai  ".to_string()),
        ..OrderPatch::default()
    };
    let update = engine.update_order("o1", patch).await.unwrap();
    assert_eq!(update.order.customer_name, "Somchai");

    match &gateway.update_calls()[0] {
        Call::UpdateOrder { patch, .. } => {
            assert_eq!(patch.customer_name.as_deref(), Some("Somchai"));
            assert!(patch.status.is_none());
        }
        other => panic!("unexpected call: {:?}", other),
    }
}

#[tokio::test]
async fn test_multi_line_address_is_sent_space_separated() {
    let gateway = Arc::new(FakeGateway::new(vec![order("o1", OrderStatus::Pending)], vec![]));
    let engine = engine(gateway.clone()).await;

    let patch = OrderPatch {
        customer_adds: Some("12 Sukhumvit Rd\nBangkok 10110".to_string()),
        ..OrderPatch::default()
    };
    let update = engine.update_order("o1", patch).await.unwrap();
    assert_eq!(update.order.customer_adds, "12 Sukhumvit Rd Bangkok 10110");

    match &gateway.update_calls()[0] {
        Call::UpdateOrder { patch, .. } => {
            assert_eq!(patch.customer_adds.as_deref(), Some("12 Sukhumvit Rd Bangkok 10110"));
        }
        other => panic!("unexpected call: {:?}", other),
    }
}

#[tokio::test]
async fn test_load_started_before_update_does_not_undo_it() {
    let gateway = Arc::new(FakeGateway::new(vec![order("o1", OrderStatus::Pending)], vec![]));
    let engine = engine(gateway.clone()).await;

    // Pre-update data that only arrives after the update has been applied
    gateway.script_orders(Duration::from_millis(200), vec![order("o1", OrderStatus::Pending)]);
    let (load, update) = tokio::join!(engine.orders().load(STORE), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine
            .update_order("o1", OrderPatch::status(OrderStatus::WaitingDelivery))
            .await
    });

    assert!(!load.unwrap().is_applied());
    assert_eq!(update.unwrap().order.status, OrderStatus::WaitingDelivery);
    assert_eq!(engine.orders().get("o1").unwrap().status, OrderStatus::WaitingDelivery);
    let counts = engine.count_by_status();
    assert_eq!(counts.pending, 0);
    assert_eq!(counts.waiting_delivery, 1);
}

#[tokio::test]
async fn test_failed_update_order_leaves_snapshot_identical() {
    let gateway = Arc::new(FakeGateway::new(
        vec![order("o1", OrderStatus::Pending), order("o2", OrderStatus::InDelivery)],
        vec![],
    ));
    let engine = engine(gateway.clone()).await;
    let before = engine.orders().snapshot();

    gateway.refuse_updates(true);
    let refused = engine
        .update_order("o1", OrderPatch::status(OrderStatus::Cancelled))
        .await;
    assert!(matches!(refused, Err(ReconcileError::Update { entity: "order", .. })));
    assert_eq!(engine.orders().snapshot(), before);

    gateway.refuse_updates(false);
    gateway.break_transport(true);
    let broken = engine
        .update_order("o1", OrderPatch::status(OrderStatus::Cancelled))
        .await;
    assert!(matches!(broken, Err(ReconcileError::Update { .. })));
    assert_eq!(engine.orders().snapshot(), before);
}

#[tokio::test]
async fn test_invalid_patches_never_reach_the_gateway() {
    let gateway = Arc::new(FakeGateway::new(vec![order("o1", OrderStatus::Pending)], vec![]));
    let engine = engine(gateway.clone()).await;

    let empty = engine.update_order("o1", OrderPatch::default()).await;
    assert!(matches!(empty, Err(ReconcileError::Validation(_))));

    let blank = OrderPatch {
        customer_adds: Some("   ".to_string()),
        ..OrderPatch::default()
    };
    assert!(matches!(
        engine.update_order("o1", blank).await,
        Err(ReconcileError::Validation(_))
    ));

    assert!(matches!(
        engine
            .update_order("o404", OrderPatch::status(OrderStatus::Finished))
            .await,
        Err(ReconcileError::UnknownOrder(id)) if id == "o404"
    ));

    assert!(gateway.update_calls().is_empty());
}

#[tokio::test]
async fn test_forward_only_policy_refuses_backward_moves() {
    let gateway = Arc::new(FakeGateway::new(
        vec![order("o1", OrderStatus::InDelivery), order("o2", OrderStatus::Finished)],
        vec![],
    ));
    let settings = EngineSettings {
        transition_policy: TransitionPolicy::ForwardOnly,
        ..EngineSettings::default()
    };
    let engine = engine_with(gateway.clone(), settings).await;

    let backward = engine
        .update_order("o1", OrderPatch::status(OrderStatus::Pending))
        .await;
    assert!(matches!(backward, Err(ReconcileError::Validation(_))));

    let from_terminal = engine
        .update_order("o2", OrderPatch::status(OrderStatus::InDelivery))
        .await;
    assert!(matches!(from_terminal, Err(ReconcileError::Validation(_))));
    assert!(gateway.update_calls().is_empty());

    let finished = engine.orders().get("o2").unwrap();
    assert!(engine.valid_transitions(&finished).is_empty());

    let in_delivery = engine.orders().get("o1").unwrap();
    assert_eq!(
        engine.valid_transitions(&in_delivery),
        vec![OrderStatus::Cancelled, OrderStatus::Finished]
    );

    engine
        .update_order("o1", OrderPatch::status(OrderStatus::Finished))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_permissive_policy_allows_any_move() {
    let gateway = Arc::new(FakeGateway::new(vec![order("o1", OrderStatus::Finished)], vec![]));
    let engine = engine(gateway).await;

    let update = engine
        .update_order("o1", OrderPatch::status(OrderStatus::Pending))
        .await
        .unwrap();
    assert_eq!(update.order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_slow_gateway_times_out() {
    let gateway = Arc::new(FakeGateway::new(vec![order("o1", OrderStatus::Pending)], vec![]));
    let settings = EngineSettings {
        call_timeout: Duration::from_millis(50),
        ..EngineSettings::default()
    };
    let engine = engine_with(gateway.clone(), settings).await;

    gateway.set_delay(Duration::from_millis(500));
    let err = engine.reload().await.unwrap_err();
    assert!(matches!(err, ReconcileError::Fetch { .. }));
    assert!(err.to_string().contains("timed out"));

    let err = engine
        .update_order("o1", OrderPatch::status(OrderStatus::Cancelled))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Update { entity: "order", .. }));
    assert_eq!(engine.orders().get("o1").unwrap().status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_transactions_join_orders_defensively() {
    let gateway = Arc::new(FakeGateway::new(
        vec![order("o1", OrderStatus::Pending)],
        vec![
            Some(pending_transfer("t1", "o1")),
            Some(pending_transfer("t2", "o-gone")),
        ],
    ));
    let engine = engine(gateway).await;

    let rows = engine.transactions_with_orders(TransactionView::All);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].order.as_ref().unwrap().id, "o1");
    let missing = rows[1].order.as_ref().unwrap_err();
    assert_eq!(missing.order_id.as_deref(), Some("o-gone"));
    assert_eq!(rows[1].slips.total, 1);

    let orders = engine.orders_with_transactions(OrderView::All);
    assert_eq!(orders[0].transaction.as_ref().unwrap().id, "t1");
    assert_eq!(orders[0].total.to_string(), "91.00");
}

#[tokio::test]
async fn test_duplicate_order_references_use_the_last_transaction() {
    let gateway = Arc::new(FakeGateway::new(
        vec![order("o1", OrderStatus::Pending)],
        vec![
            Some(pending_transfer("first", "o1")),
            Some(pending_transfer("second", "o1")),
        ],
    ));
    let engine = engine(gateway).await;

    assert_eq!(engine.transactions().duplicate_order_ids(), vec!["o1".to_string()]);
    let rows = engine.orders_with_transactions(OrderView::WaitingPayment);
    assert_eq!(rows[0].transaction.as_ref().unwrap().id, "second");
}

#[tokio::test]
async fn test_session_registry_reuses_engines() {
    let gateway = Arc::new(FakeGateway::new(vec![order("o1", OrderStatus::Pending)], vec![]));
    let registry = SessionRegistry::new(gateway.clone(), EngineSettings::default());

    let first = registry.open(STORE).await.unwrap();
    let second = registry.open(STORE).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.len().await, 1);
    assert_eq!(gateway.fetch_count(), 2);

    assert!(registry.close(STORE).await);
    assert!(!registry.close(STORE).await);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_session_registry_evicts_least_recently_used_store() {
    let gateway = Arc::new(FakeGateway::new(vec![order("o1", OrderStatus::Pending)], vec![]));
    let registry = SessionRegistry::with_capacity(gateway.clone(), EngineSettings::default(), 2);

    let first = registry.open("shop-a").await.unwrap();
    registry.open("shop-b").await.unwrap();
    // shop-a is used again, so shop-b becomes the oldest
    let again = registry.open("shop-a").await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    registry.open("shop-c").await.unwrap();
    assert_eq!(registry.len().await, 2);
    assert!(registry.get("shop-a").await.is_some());
    assert!(registry.get("shop-b").await.is_none());
    assert!(registry.get("shop-c").await.is_some());
}

#[tokio::test]
async fn test_session_registry_does_not_keep_failed_stores() {
    let gateway = Arc::new(FakeGateway::new(vec![], vec![]));
    gateway.refuse_fetches(true);
    let registry = SessionRegistry::new(gateway, EngineSettings::default());

    assert!(matches!(
        registry.open(STORE).await,
        Err(ReconcileError::Fetch { .. })
    ));
    assert!(registry.get(STORE).await.is_none());

    assert!(matches!(
        registry.open("bad/store").await,
        Err(ReconcileError::Validation(_))
    ));
}
